use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::warn;

use crate::chain::mock::demo_events;
use crate::config::StoreConfig;
use crate::core::{
    CreateEventRequest, Event, Notification, NotificationKind, Ticket, TransferAnalysis,
};
use crate::service::{CreatedEvent, ServiceError, TicketService};

struct StoreState {
    events: Vec<Event>,
    selected_event: Option<u64>,
    tickets: Vec<Ticket>,
    notifications: Vec<Notification>,
    next_notification_id: u64,
}

/// Client-facing application state: the event and ticket lists with
/// demo-data fallback, and a short-lived notification feed.
#[derive(Clone)]
pub struct AppStore {
    service: TicketService,
    state: Arc<Mutex<StoreState>>,
    max_notifications: usize,
    notification_ttl_seconds: i64,
}

impl AppStore {
    pub fn new(service: TicketService, config: &StoreConfig) -> Self {
        Self {
            service,
            state: Arc::new(Mutex::new(StoreState {
                events: Vec::new(),
                selected_event: None,
                tickets: Vec::new(),
                notifications: Vec::new(),
                next_notification_id: 1,
            })),
            max_notifications: config.max_notifications,
            notification_ttl_seconds: config.notification_ttl_seconds,
        }
    }

    pub fn service(&self) -> &TicketService {
        &self.service
    }

    fn notify(&self, kind: NotificationKind, title: &str, message: &str) {
        let mut state = self.state.lock().unwrap();
        let id = state.next_notification_id;
        state.next_notification_id += 1;
        state.notifications.push(Notification {
            id,
            kind,
            title: title.to_string(),
            message: message.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        });
        if state.notifications.len() > self.max_notifications {
            let excess = state.notifications.len() - self.max_notifications;
            state.notifications.drain(..excess);
        }
    }

    /// Current feed with expired entries pruned.
    pub fn notifications(&self) -> Vec<Notification> {
        let mut state = self.state.lock().unwrap();
        let cutoff = Utc::now().timestamp_millis() - self.notification_ttl_seconds * 1000;
        state.notifications.retain(|n| n.timestamp > cutoff);
        state.notifications.clone()
    }

    pub fn dismiss_notification(&self, id: u64) -> bool {
        let mut state = self.state.lock().unwrap();
        let before = state.notifications.len();
        state.notifications.retain(|n| n.id != id);
        state.notifications.len() < before
    }

    pub fn clear_notifications(&self) {
        self.state.lock().unwrap().notifications.clear();
    }

    /// Loads the event list, falling back to the demo listings when the
    /// chain is unreachable.
    pub async fn load_events(&self) -> Vec<Event> {
        match self.service.get_all_events().await {
            Ok(events) => {
                self.state.lock().unwrap().events = events.clone();
                events
            }
            Err(e) => {
                warn!("falling back to demo events: {e}");
                let events = demo_events();
                self.state.lock().unwrap().events = events.clone();
                self.notify(
                    NotificationKind::Warning,
                    "Using Mock Data",
                    "Could not load events from blockchain, using demo data",
                );
                events
            }
        }
    }

    pub async fn load_user_tickets(&self, owner: &str) -> Vec<Ticket> {
        match self.service.get_user_tickets(owner).await {
            Ok(tickets) => {
                self.state.lock().unwrap().tickets = tickets.clone();
                tickets
            }
            Err(e) => {
                warn!(owner, "could not load tickets: {e}");
                self.state.lock().unwrap().tickets = Vec::new();
                self.notify(
                    NotificationKind::Warning,
                    "Could Not Load Tickets",
                    "Unable to load tickets from blockchain",
                );
                Vec::new()
            }
        }
    }

    pub async fn create_event(
        &self,
        organizer: &str,
        request: &CreateEventRequest,
    ) -> Result<CreatedEvent, ServiceError> {
        match self.service.create_event(organizer, request).await {
            Ok(created) => {
                self.notify(
                    NotificationKind::Success,
                    "Event Created",
                    &format!(
                        "Event \"{}\" has been created successfully on the blockchain!",
                        request.name
                    ),
                );
                self.load_events().await;
                Ok(created)
            }
            Err(e) => {
                self.notify(
                    NotificationKind::Error,
                    "Failed to Create Event",
                    &e.to_string(),
                );
                Err(e)
            }
        }
    }

    pub async fn buy_ticket(&self, buyer: &str, event_id: u64) -> Result<u64, ServiceError> {
        match self.service.buy_ticket(buyer, event_id).await {
            Ok(token_id) => {
                self.notify(
                    NotificationKind::Success,
                    "Ticket Purchased",
                    "Your NFT ticket has been minted successfully on the blockchain!",
                );
                self.load_events().await;
                self.load_user_tickets(buyer).await;
                Ok(token_id)
            }
            Err(e) => {
                self.notify(
                    NotificationKind::Error,
                    "Failed to Purchase Ticket",
                    &e.to_string(),
                );
                Err(e)
            }
        }
    }

    pub async fn use_ticket(&self, token_id: u64) -> Result<(), ServiceError> {
        match self.service.use_ticket(token_id).await {
            Ok(()) => {
                let mut state = self.state.lock().unwrap();
                if let Some(ticket) = state.tickets.iter_mut().find(|t| t.token_id == token_id) {
                    ticket.is_used = true;
                }
                drop(state);
                self.notify(
                    NotificationKind::Success,
                    "Ticket Used",
                    "Ticket has been marked as used on the blockchain!",
                );
                Ok(())
            }
            Err(e) => {
                self.notify(
                    NotificationKind::Error,
                    "Failed to Use Ticket",
                    &e.to_string(),
                );
                Err(e)
            }
        }
    }

    pub async fn transfer_ticket(
        &self,
        from: &str,
        to: &str,
        token_id: u64,
        price: &str,
    ) -> Result<TransferAnalysis, ServiceError> {
        match self.service.transfer_ticket(from, to, token_id, price).await {
            Ok(analysis) => {
                self.notify(
                    NotificationKind::Success,
                    "Ticket Transferred",
                    "Ticket has been successfully transferred on the blockchain!",
                );
                self.load_user_tickets(from).await;
                Ok(analysis)
            }
            Err(e) => {
                self.notify(
                    NotificationKind::Error,
                    "Failed to Transfer Ticket",
                    &e.to_string(),
                );
                Err(e)
            }
        }
    }

    pub fn select_event(&self, event_id: u64) -> Option<Event> {
        let mut state = self.state.lock().unwrap();
        let event = state.events.iter().find(|e| e.id == event_id).cloned();
        state.selected_event = event.as_ref().map(|e| e.id);
        event
    }

    pub fn selected_event(&self) -> Option<Event> {
        let state = self.state.lock().unwrap();
        let id = state.selected_event?;
        state.events.iter().find(|e| e.id == id).cloned()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn event_by_id(&self, event_id: u64) -> Option<Event> {
        let state = self.state.lock().unwrap();
        state.events.iter().find(|e| e.id == event_id).cloned()
    }

    pub fn tickets(&self) -> Vec<Ticket> {
        self.state.lock().unwrap().tickets.clone()
    }

    pub fn tickets_by_event(&self, event_id: u64) -> Vec<Ticket> {
        let state = self.state.lock().unwrap();
        state
            .tickets
            .iter()
            .filter(|t| t.event_id == event_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;

    use crate::chain::{ChainError, DemoChain, TicketChain};
    use crate::config::Config;
    use crate::db::SharedDatabase;
    use crate::fraud::signals::SignalSource;
    use crate::fraud::{FraudEngine, SharedFraudEngine};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    struct QuietSignals;

    impl SignalSource for QuietSignals {
        fn wallet_age_secs(&self, _address: &str) -> u64 {
            10_000_000
        }
        fn transaction_count(&self, _address: &str) -> u64 {
            5
        }
        fn content_similarity(&self, _title: &str, _description: &str) -> f64 {
            0.1
        }
        fn image_flagged(&self, _image_url: &str) -> bool {
            false
        }
    }

    /// Chain that always fails, for exercising the fallback paths.
    struct DownChain;

    #[async_trait]
    impl TicketChain for DownChain {
        async fn get_event(&self, _event_id: u64) -> Result<Event, ChainError> {
            Err(ChainError::NoEndpoint(3))
        }
        async fn get_all_events(&self) -> Result<Vec<Event>, ChainError> {
            Err(ChainError::NoEndpoint(3))
        }
        async fn get_user_tickets(&self, _owner: &str) -> Result<Vec<Ticket>, ChainError> {
            Err(ChainError::NoEndpoint(3))
        }
        async fn is_ticket_used(&self, _token_id: u64) -> Result<bool, ChainError> {
            Err(ChainError::NoEndpoint(3))
        }
        async fn owner_of(&self, _token_id: u64) -> Result<String, ChainError> {
            Err(ChainError::NoEndpoint(3))
        }
        async fn token_uri(&self, _token_id: u64) -> Result<String, ChainError> {
            Err(ChainError::NoEndpoint(3))
        }
        async fn create_event(
            &self,
            _organizer: &str,
            _request: &CreateEventRequest,
        ) -> Result<u64, ChainError> {
            Err(ChainError::NoEndpoint(3))
        }
        async fn buy_ticket(
            &self,
            _buyer: &str,
            _event_id: u64,
            _price_avax: &str,
        ) -> Result<u64, ChainError> {
            Err(ChainError::NoEndpoint(3))
        }
        async fn use_ticket(&self, _token_id: u64) -> Result<(), ChainError> {
            Err(ChainError::NoEndpoint(3))
        }
        async fn transfer_from(
            &self,
            _from: &str,
            _to: &str,
            _token_id: u64,
        ) -> Result<(), ChainError> {
            Err(ChainError::NoEndpoint(3))
        }
    }

    fn temp_db_path() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("eventxx_store_{}_{id}.db", std::process::id()))
    }

    fn store_with(chain: Arc<dyn TicketChain>, config: Config) -> (AppStore, SharedFraudEngine) {
        let engine = SharedFraudEngine::new(FraudEngine::with_signals(
            &config.fraud,
            Box::new(QuietSignals),
        ));
        let db = SharedDatabase::open(&temp_db_path()).unwrap();
        let service = TicketService::new(chain, engine.clone(), db, &config);
        (AppStore::new(service, &config.store), engine)
    }

    fn demo_store() -> (AppStore, SharedFraudEngine) {
        store_with(Arc::new(DemoChain::new()), Config::default())
    }

    fn request() -> CreateEventRequest {
        CreateEventRequest {
            name: "Rust Meetup".into(),
            description: "Monthly systems programming meetup".into(),
            price: "0.02".into(),
            max_tickets: 80,
            event_date: 1_900_000_000,
            location: "Tech Hub Downtown".into(),
            image: None,
            organizer_email: None,
            organizer_phone: None,
        }
    }

    #[tokio::test]
    async fn loads_events_from_the_chain() {
        let (store, _) = demo_store();
        let events = store.load_events().await;
        assert_eq!(events.len(), 4);
        assert_eq!(store.events().len(), 4);
        assert!(store.notifications().is_empty());
    }

    #[tokio::test]
    async fn unreachable_chain_falls_back_to_demo_data() {
        let (store, _) = store_with(Arc::new(DownChain), Config::default());
        let events = store.load_events().await;
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].name, "Tech Conference 2024");

        let feed = store.notifications();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].kind, NotificationKind::Warning);
        assert_eq!(feed[0].title, "Using Mock Data");
        assert_eq!(
            feed[0].message,
            "Could not load events from blockchain, using demo data"
        );
    }

    #[tokio::test]
    async fn failed_ticket_load_leaves_empty_list() {
        let (store, _) = store_with(Arc::new(DownChain), Config::default());
        let tickets = store.load_user_tickets(ALICE).await;
        assert!(tickets.is_empty());

        let feed = store.notifications();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].title, "Could Not Load Tickets");
        assert_eq!(feed[0].message, "Unable to load tickets from blockchain");
    }

    #[tokio::test]
    async fn create_event_refreshes_and_notifies() {
        let (store, _) = demo_store();
        store.load_events().await;

        let created = store.create_event(ALICE, &request()).await.unwrap();
        assert_eq!(created.event_id, 5);
        assert_eq!(store.events().len(), 5);

        let feed = store.notifications();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].kind, NotificationKind::Success);
        assert_eq!(feed[0].title, "Event Created");
        assert_eq!(
            feed[0].message,
            "Event \"Rust Meetup\" has been created successfully on the blockchain!"
        );
    }

    #[tokio::test]
    async fn rejected_event_notifies_error() {
        let (store, engine) = demo_store();
        engine.add_to_blacklist(ALICE);

        assert!(store.create_event(ALICE, &request()).await.is_err());

        let feed = store.notifications();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].kind, NotificationKind::Error);
        assert_eq!(feed[0].title, "Failed to Create Event");
        assert!(feed[0].message.starts_with("Event validation failed:"));
    }

    #[tokio::test]
    async fn purchase_updates_tickets_and_events() {
        let (store, _) = demo_store();
        let token_id = store.buy_ticket(ALICE, 1).await.unwrap();
        assert_eq!(token_id, 1);

        assert_eq!(store.tickets().len(), 1);
        assert_eq!(store.event_by_id(1).unwrap().sold_tickets, 26);
        assert_eq!(store.tickets_by_event(1).len(), 1);
        assert!(store.tickets_by_event(2).is_empty());

        let titles: Vec<String> = store.notifications().iter().map(|n| n.title.clone()).collect();
        assert_eq!(titles, vec!["Ticket Purchased"]);
    }

    #[tokio::test]
    async fn using_a_ticket_marks_the_stored_copy() {
        let (store, _) = demo_store();
        let token_id = store.buy_ticket(ALICE, 1).await.unwrap();
        store.clear_notifications();

        store.use_ticket(token_id).await.unwrap();
        assert!(store.tickets()[0].is_used);

        let feed = store.notifications();
        assert_eq!(feed[0].title, "Ticket Used");
        assert_eq!(feed[0].message, "Ticket has been marked as used on the blockchain!");
    }

    #[tokio::test]
    async fn transfer_refreshes_the_sellers_tickets() {
        let (store, _) = demo_store();
        let token_id = store.buy_ticket(ALICE, 1).await.unwrap();
        store.clear_notifications();

        store.transfer_ticket(ALICE, BOB, token_id, "0.1").await.unwrap();

        // the seller no longer holds the ticket
        assert!(store.tickets().is_empty());
        assert_eq!(store.notifications()[0].title, "Ticket Transferred");
    }

    #[tokio::test]
    async fn blocked_transfer_notifies_error() {
        let (store, engine) = demo_store();
        let token_id = store.buy_ticket(ALICE, 1).await.unwrap();
        engine.add_to_blacklist(BOB);
        store.clear_notifications();

        assert!(store.transfer_ticket(ALICE, BOB, token_id, "0.1").await.is_err());

        let feed = store.notifications();
        assert_eq!(feed[0].title, "Failed to Transfer Ticket");
        assert!(feed[0].message.starts_with("Transfer blocked due to high fraud risk"));
    }

    #[tokio::test]
    async fn selection_tracks_known_events() {
        let (store, _) = demo_store();
        store.load_events().await;

        assert!(store.selected_event().is_none());
        let event = store.select_event(2).unwrap();
        assert_eq!(event.name, "Summer Music Festival");
        assert_eq!(store.selected_event().unwrap().id, 2);

        assert!(store.select_event(99).is_none());
        assert!(store.selected_event().is_none());
    }

    #[tokio::test]
    async fn feed_caps_at_configured_size() {
        let mut config = Config::default();
        config.store.max_notifications = 2;
        let (store, _) = store_with(Arc::new(DownChain), config);

        store.load_user_tickets(ALICE).await;
        store.load_user_tickets(ALICE).await;
        store.load_user_tickets(ALICE).await;

        let feed = store.notifications();
        assert_eq!(feed.len(), 2);
        // oldest entry dropped, ids keep climbing
        assert_eq!(feed[0].id, 2);
        assert_eq!(feed[1].id, 3);
    }

    #[tokio::test]
    async fn expired_notifications_are_pruned() {
        let mut config = Config::default();
        config.store.notification_ttl_seconds = 0;
        let (store, _) = store_with(Arc::new(DownChain), config);

        store.load_user_tickets(ALICE).await;
        assert!(store.notifications().is_empty());
    }

    #[tokio::test]
    async fn dismiss_removes_one_entry() {
        let (store, _) = store_with(Arc::new(DownChain), Config::default());
        store.load_user_tickets(ALICE).await;
        let id = store.notifications()[0].id;

        assert!(store.dismiss_notification(id));
        assert!(!store.dismiss_notification(id));
        assert!(store.notifications().is_empty());
    }
}
