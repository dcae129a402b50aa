use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{ChainError, TicketChain};
use crate::core::{CreateEventRequest, Event, Ticket};

/// The four demo listings served when no chain endpoint is reachable.
pub fn demo_events() -> Vec<Event> {
    let now = Utc::now().timestamp();
    let day = 86_400;
    vec![
        Event {
            id: 1,
            name: "Tech Conference 2024".into(),
            description: "Annual technology conference featuring the latest in AI, blockchain, \
                          and web development. Join industry leaders and innovators for \
                          networking and learning."
                .into(),
            organizer: "0x1234567890123456789012345678901234567890".into(),
            price: "0.1".into(),
            max_tickets: 100,
            sold_tickets: 25,
            event_date: now + 7 * day,
            location: "San Francisco Convention Center".into(),
            is_active: true,
        },
        Event {
            id: 2,
            name: "Summer Music Festival".into(),
            description: "Three-day outdoor music festival featuring top artists from around \
                          the world. Food trucks, art installations, and camping available."
                .into(),
            organizer: "0x2345678901234567890123456789012345678901".into(),
            price: "0.05".into(),
            max_tickets: 500,
            sold_tickets: 150,
            event_date: now + 14 * day,
            location: "Golden Gate Park, San Francisco".into(),
            is_active: true,
        },
        Event {
            id: 3,
            name: "Blockchain Workshop".into(),
            description: "Hands-on workshop covering smart contract development, DeFi \
                          protocols, and NFT creation. Perfect for developers and \
                          entrepreneurs."
                .into(),
            organizer: "0x3456789012345678901234567890123456789012".into(),
            price: "0.08".into(),
            max_tickets: 50,
            sold_tickets: 12,
            event_date: now + 21 * day,
            location: "Tech Hub Downtown".into(),
            is_active: true,
        },
        Event {
            id: 4,
            name: "Art Gallery Opening".into(),
            description: "Exclusive opening of contemporary digital art gallery featuring NFT \
                          artists and interactive installations. Wine and networking included."
                .into(),
            organizer: "0x4567890123456789012345678901234567890123".into(),
            price: "0.03".into(),
            max_tickets: 200,
            sold_tickets: 45,
            event_date: now + 10 * day,
            location: "Modern Art Museum".into(),
            is_active: true,
        },
    ]
}

struct DemoTicket {
    event_id: u64,
    owner: String,
    is_used: bool,
}

struct DemoState {
    events: Vec<Event>,
    tickets: BTreeMap<u64, DemoTicket>,
    next_event_id: u64,
    next_token_id: u64,
}

/// Fully working in-memory chain, seeded with the demo listings. Writes
/// mutate local state instead of failing for lack of a signer.
pub struct DemoChain {
    state: Mutex<DemoState>,
}

impl DemoChain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DemoState {
                events: demo_events(),
                tickets: BTreeMap::new(),
                next_event_id: 5,
                next_token_id: 1,
            }),
        }
    }

    #[cfg(test)]
    fn set_event_active(&self, event_id: u64, active: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(event) = state.events.iter_mut().find(|e| e.id == event_id) {
            event.is_active = active;
        }
    }
}

impl Default for DemoChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TicketChain for DemoChain {
    async fn get_event(&self, event_id: u64) -> Result<Event, ChainError> {
        let state = self.state.lock().unwrap();
        state
            .events
            .iter()
            .find(|e| e.id == event_id)
            .cloned()
            .ok_or(ChainError::EventNotFound(event_id))
    }

    async fn get_all_events(&self) -> Result<Vec<Event>, ChainError> {
        Ok(self.state.lock().unwrap().events.clone())
    }

    async fn get_user_tickets(&self, owner: &str) -> Result<Vec<Ticket>, ChainError> {
        let state = self.state.lock().unwrap();
        let tickets = state
            .tickets
            .iter()
            .filter(|(_, t)| t.owner.eq_ignore_ascii_case(owner))
            .map(|(token_id, t)| {
                let event = state.events.iter().find(|e| e.id == t.event_id);
                Ticket {
                    token_id: *token_id,
                    event_id: t.event_id,
                    owner: t.owner.clone(),
                    is_used: t.is_used,
                    event_name: event.map(|e| e.name.clone()).unwrap_or_default(),
                    event_date: event
                        .map(|e| e.event_date)
                        .unwrap_or_else(|| Utc::now().timestamp()),
                    location: event.map(|e| e.location.clone()).unwrap_or_default(),
                }
            })
            .collect();
        Ok(tickets)
    }

    async fn is_ticket_used(&self, token_id: u64) -> Result<bool, ChainError> {
        let state = self.state.lock().unwrap();
        state
            .tickets
            .get(&token_id)
            .map(|t| t.is_used)
            .ok_or(ChainError::TicketNotFound(token_id))
    }

    async fn owner_of(&self, token_id: u64) -> Result<String, ChainError> {
        let state = self.state.lock().unwrap();
        state
            .tickets
            .get(&token_id)
            .map(|t| t.owner.clone())
            .ok_or(ChainError::TicketNotFound(token_id))
    }

    async fn token_uri(&self, token_id: u64) -> Result<String, ChainError> {
        let state = self.state.lock().unwrap();
        if !state.tickets.contains_key(&token_id) {
            return Err(ChainError::TicketNotFound(token_id));
        }
        Ok(format!("/api/metadata/{token_id}"))
    }

    async fn create_event(
        &self,
        organizer: &str,
        request: &CreateEventRequest,
    ) -> Result<u64, ChainError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_event_id;
        state.next_event_id += 1;
        state.events.push(Event {
            id,
            name: request.name.clone(),
            description: request.description.clone(),
            organizer: organizer.to_string(),
            price: request.price.clone(),
            max_tickets: request.max_tickets,
            sold_tickets: 0,
            event_date: request.event_date,
            location: request.location.clone(),
            is_active: true,
        });
        Ok(id)
    }

    async fn buy_ticket(
        &self,
        buyer: &str,
        event_id: u64,
        _price_avax: &str,
    ) -> Result<u64, ChainError> {
        let mut state = self.state.lock().unwrap();
        let event = state
            .events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or(ChainError::EventNotFound(event_id))?;
        if !event.is_active {
            return Err(ChainError::EventInactive);
        }
        if event.sold_tickets >= event.max_tickets {
            return Err(ChainError::SoldOut);
        }
        event.sold_tickets += 1;

        let token_id = state.next_token_id;
        state.next_token_id += 1;
        state.tickets.insert(
            token_id,
            DemoTicket {
                event_id,
                owner: buyer.to_string(),
                is_used: false,
            },
        );
        Ok(token_id)
    }

    async fn use_ticket(&self, token_id: u64) -> Result<(), ChainError> {
        let mut state = self.state.lock().unwrap();
        let ticket = state
            .tickets
            .get_mut(&token_id)
            .ok_or(ChainError::TicketNotFound(token_id))?;
        if ticket.is_used {
            return Err(ChainError::TicketAlreadyUsed);
        }
        ticket.is_used = true;
        Ok(())
    }

    async fn transfer_from(&self, from: &str, to: &str, token_id: u64) -> Result<(), ChainError> {
        let mut state = self.state.lock().unwrap();
        let ticket = state
            .tickets
            .get_mut(&token_id)
            .ok_or(ChainError::TicketNotFound(token_id))?;
        if !ticket.owner.eq_ignore_ascii_case(from) {
            return Err(ChainError::NotTicketOwner);
        }
        ticket.owner = to.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn workshop_request() -> CreateEventRequest {
        CreateEventRequest {
            name: "Rust Meetup".into(),
            description: "Monthly systems programming meetup".into(),
            price: "0.02".into(),
            max_tickets: 1,
            event_date: Utc::now().timestamp() + 86_400,
            location: "Tech Hub Downtown".into(),
            image: None,
            organizer_email: None,
            organizer_phone: None,
        }
    }

    #[tokio::test]
    async fn seeds_four_demo_events() {
        let chain = DemoChain::new();
        let events = chain.get_all_events().await.unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].name, "Tech Conference 2024");
        assert_eq!(events[1].price, "0.05");
        assert_eq!(events[2].max_tickets, 50);
        assert_eq!(events[3].location, "Modern Art Museum");
        assert!(events.iter().all(|e| e.is_active));
    }

    #[tokio::test]
    async fn event_lookup() {
        let chain = DemoChain::new();
        let event = chain.get_event(2).await.unwrap();
        assert_eq!(event.name, "Summer Music Festival");
        assert_eq!(event.sold_tickets, 150);

        let err = chain.get_event(99).await.unwrap_err();
        assert!(matches!(err, ChainError::EventNotFound(99)));
    }

    #[tokio::test]
    async fn created_events_continue_after_the_seed() {
        let chain = DemoChain::new();
        let id = chain.create_event(ALICE, &workshop_request()).await.unwrap();
        assert_eq!(id, 5);
        let id = chain.create_event(ALICE, &workshop_request()).await.unwrap();
        assert_eq!(id, 6);

        let event = chain.get_event(5).await.unwrap();
        assert_eq!(event.organizer, ALICE);
        assert_eq!(event.sold_tickets, 0);
        assert!(event.is_active);
    }

    #[tokio::test]
    async fn buying_mints_sequential_tokens() {
        let chain = DemoChain::new();
        assert_eq!(chain.buy_ticket(ALICE, 1, "0.1").await.unwrap(), 1);
        assert_eq!(chain.buy_ticket(ALICE, 2, "0.05").await.unwrap(), 2);

        let event = chain.get_event(1).await.unwrap();
        assert_eq!(event.sold_tickets, 26);
    }

    #[tokio::test]
    async fn sold_out_event_rejects_purchase() {
        let chain = DemoChain::new();
        let id = chain.create_event(ALICE, &workshop_request()).await.unwrap();
        chain.buy_ticket(BOB, id, "0.02").await.unwrap();
        let err = chain.buy_ticket(BOB, id, "0.02").await.unwrap_err();
        assert!(matches!(err, ChainError::SoldOut));
    }

    #[tokio::test]
    async fn inactive_event_rejects_purchase() {
        let chain = DemoChain::new();
        chain.set_event_active(1, false);
        let err = chain.buy_ticket(ALICE, 1, "0.1").await.unwrap_err();
        assert!(matches!(err, ChainError::EventInactive));
    }

    #[tokio::test]
    async fn tickets_are_single_use() {
        let chain = DemoChain::new();
        let token = chain.buy_ticket(ALICE, 1, "0.1").await.unwrap();
        assert!(!chain.is_ticket_used(token).await.unwrap());

        chain.use_ticket(token).await.unwrap();
        assert!(chain.is_ticket_used(token).await.unwrap());

        let err = chain.use_ticket(token).await.unwrap_err();
        assert!(matches!(err, ChainError::TicketAlreadyUsed));
    }

    #[tokio::test]
    async fn transfer_requires_current_owner() {
        let chain = DemoChain::new();
        let token = chain.buy_ticket(ALICE, 1, "0.1").await.unwrap();

        let err = chain.transfer_from(BOB, ALICE, token).await.unwrap_err();
        assert!(matches!(err, ChainError::NotTicketOwner));

        // owner match is case-insensitive
        chain
            .transfer_from(&ALICE.to_uppercase().replace("0X", "0x"), BOB, token)
            .await
            .unwrap();
        assert_eq!(chain.owner_of(token).await.unwrap(), BOB);
    }

    #[tokio::test]
    async fn user_tickets_carry_event_context() {
        let chain = DemoChain::new();
        chain.buy_ticket(ALICE, 1, "0.1").await.unwrap();
        chain.buy_ticket(BOB, 2, "0.05").await.unwrap();
        chain.buy_ticket(ALICE, 3, "0.08").await.unwrap();

        let tickets = chain
            .get_user_tickets(&ALICE.to_uppercase().replace("0X", "0x"))
            .await
            .unwrap();
        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0].event_name, "Tech Conference 2024");
        assert_eq!(tickets[1].event_name, "Blockchain Workshop");
        assert_eq!(tickets[1].location, "Tech Hub Downtown");
        assert!(!tickets[0].is_used);
    }

    #[tokio::test]
    async fn unknown_token_lookups_fail() {
        let chain = DemoChain::new();
        assert!(matches!(
            chain.is_ticket_used(42).await.unwrap_err(),
            ChainError::TicketNotFound(42)
        ));
        assert!(matches!(
            chain.owner_of(42).await.unwrap_err(),
            ChainError::TicketNotFound(42)
        ));
        assert!(matches!(
            chain.token_uri(42).await.unwrap_err(),
            ChainError::TicketNotFound(42)
        ));
    }

    #[tokio::test]
    async fn token_uri_points_at_metadata_route() {
        let chain = DemoChain::new();
        let token = chain.buy_ticket(ALICE, 1, "0.1").await.unwrap();
        assert_eq!(chain.token_uri(token).await.unwrap(), "/api/metadata/1");
    }
}
