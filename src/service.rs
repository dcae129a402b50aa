use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::chain::{ChainError, TicketChain};
use crate::config::Config;
use crate::core::{AlertKind, CreateEventRequest, Event, EventValidation, RiskLevel, Ticket, TransferAnalysis};
use crate::db::SharedDatabase;
use crate::fraud::{EventSubmission, SharedFraudEngine};
use crate::metadata::{self, NFTMetadata};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Event validation failed: {}", .flags.join(", "))]
    EventRejected { score: f64, flags: Vec<String> },

    #[error("Event has high fraud risk ({:.1}%). Please review and try again.", .score * 100.0)]
    EventHighRisk { score: f64, flags: Vec<String> },

    #[error("Transfer blocked due to high fraud risk ({:.1}%). Reasons: {}", .score * 100.0, .flags.join(", "))]
    TransferBlocked { score: f64, flags: Vec<String> },

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome of a gated event creation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEvent {
    pub event_id: u64,
    pub validation: EventValidation,
}

fn submission_from_request(request: &CreateEventRequest) -> EventSubmission {
    let date = DateTime::from_timestamp(request.event_date, 0).unwrap_or_default();
    EventSubmission {
        title: request.name.clone(),
        description: request.description.clone(),
        date: date.format("%Y-%m-%d").to_string(),
        time: date.format("%H:%M").to_string(),
        location: request.location.clone(),
        price: request.price.clone(),
        total_tickets: request.max_tickets,
        image: request.image.clone().unwrap_or_default(),
        organizer_email: request.organizer_email.clone().unwrap_or_default(),
        organizer_phone: request.organizer_phone.clone().unwrap_or_default(),
    }
}

/// Application operations over a chain backend, with every write scored by
/// the fraud engine first and scored analyses written to the audit log.
#[derive(Clone)]
pub struct TicketService {
    chain: Arc<dyn TicketChain>,
    engine: SharedFraudEngine,
    db: SharedDatabase,
    base_url: String,
    create_block_score: f64,
    transfer_block_score: f64,
    min_score_persist: f64,
}

impl TicketService {
    pub fn new(
        chain: Arc<dyn TicketChain>,
        engine: SharedFraudEngine,
        db: SharedDatabase,
        config: &Config,
    ) -> Self {
        Self {
            chain,
            engine,
            db,
            base_url: config.api.base_url.clone(),
            create_block_score: config.fraud.create_block_score,
            transfer_block_score: config.fraud.transfer_block_score,
            min_score_persist: config.fraud.min_score_persist,
        }
    }

    fn persist_alert(
        &self,
        subject_id: &str,
        kind: AlertKind,
        score: f64,
        level: RiskLevel,
        flags: &[String],
        blocked: bool,
    ) -> Result<(), ServiceError> {
        if blocked || score >= self.min_score_persist {
            self.db
                .store_alert(subject_id, kind.as_str(), score, level.as_str(), flags, blocked)?;
        }
        Ok(())
    }

    pub async fn create_event(
        &self,
        organizer: &str,
        request: &CreateEventRequest,
    ) -> Result<CreatedEvent, ServiceError> {
        let validation_id = format!("event_{}", Utc::now().timestamp_millis());
        let submission = submission_from_request(request);
        let validation = self
            .engine
            .validate_event(&validation_id, organizer, &submission);

        let critical = validation.risk_level == RiskLevel::Critical;
        let high_risk = validation.risk_score > self.create_block_score;
        self.persist_alert(
            &validation.event_id,
            AlertKind::Event,
            validation.risk_score,
            validation.risk_level,
            &validation.flags,
            critical || high_risk,
        )?;

        if critical {
            warn!(
                organizer,
                score = validation.risk_score,
                "event creation rejected"
            );
            return Err(ServiceError::EventRejected {
                score: validation.risk_score,
                flags: validation.flags,
            });
        }
        if high_risk {
            warn!(
                organizer,
                score = validation.risk_score,
                "event creation flagged as high risk"
            );
            return Err(ServiceError::EventHighRisk {
                score: validation.risk_score,
                flags: validation.flags,
            });
        }

        let event_id = self.chain.create_event(organizer, request).await?;
        info!(event_id, organizer, "event created");
        Ok(CreatedEvent {
            event_id,
            validation,
        })
    }

    /// Purchase at the event's listed price. The ticket's metadata document
    /// is written as part of the mint.
    pub async fn buy_ticket(&self, buyer: &str, event_id: u64) -> Result<u64, ServiceError> {
        let event = self.chain.get_event(event_id).await?;
        let token_id = self.chain.buy_ticket(buyer, event_id, &event.price).await?;
        info!(token_id, event_id, buyer, "ticket purchased");

        let ticket = Ticket {
            token_id,
            event_id,
            owner: buyer.to_string(),
            is_used: false,
            event_name: event.name.clone(),
            event_date: event.event_date,
            location: event.location.clone(),
        };
        if let Err(e) = self.publish_metadata(&event, &ticket) {
            warn!(token_id, "could not publish ticket metadata: {e}");
        }
        Ok(token_id)
    }

    pub async fn transfer_ticket(
        &self,
        from: &str,
        to: &str,
        token_id: u64,
        price: &str,
    ) -> Result<TransferAnalysis, ServiceError> {
        let transfer_id = format!("transfer_{token_id}_{}", Utc::now().timestamp_millis());
        let price_value = price.trim().parse::<f64>().unwrap_or(0.0);
        let analysis = self.engine.analyze_transfer(
            &transfer_id,
            from,
            to,
            &token_id.to_string(),
            price_value,
            Utc::now().timestamp(),
            None,
        );

        let blocked = analysis.risk_score > self.transfer_block_score;
        self.persist_alert(
            &analysis.transfer_id,
            AlertKind::Transfer,
            analysis.risk_score,
            analysis.risk_level,
            &analysis.flags,
            blocked,
        )?;

        if blocked {
            warn!(token_id, from, to, score = analysis.risk_score, "transfer blocked");
            return Err(ServiceError::TransferBlocked {
                score: analysis.risk_score,
                flags: analysis.flags,
            });
        }

        self.chain.transfer_from(from, to, token_id).await?;
        info!(token_id, from, to, "ticket transferred");
        Ok(analysis)
    }

    pub async fn use_ticket(&self, token_id: u64) -> Result<(), ServiceError> {
        self.chain.use_ticket(token_id).await?;
        info!(token_id, "ticket used");
        Ok(())
    }

    pub async fn get_event(&self, event_id: u64) -> Result<Event, ServiceError> {
        Ok(self.chain.get_event(event_id).await?)
    }

    pub async fn get_all_events(&self) -> Result<Vec<Event>, ServiceError> {
        Ok(self.chain.get_all_events().await?)
    }

    pub async fn get_user_tickets(&self, owner: &str) -> Result<Vec<Ticket>, ServiceError> {
        Ok(self.chain.get_user_tickets(owner).await?)
    }

    pub async fn is_ticket_used(&self, token_id: u64) -> Result<bool, ServiceError> {
        Ok(self.chain.is_ticket_used(token_id).await?)
    }

    /// The stored metadata document, or the generated placeholder. The flag
    /// is true when the document came from storage.
    pub fn ticket_metadata(&self, token_id: u64) -> Result<(NFTMetadata, bool), ServiceError> {
        if let Some(json) = self.db.get_metadata(token_id)? {
            match serde_json::from_str(&json) {
                Ok(doc) => return Ok((doc, true)),
                Err(e) => warn!(token_id, "stored metadata unreadable, serving default: {e}"),
            }
        }
        Ok((metadata::default_metadata(token_id, &self.base_url), false))
    }

    /// Build and persist the metadata document for a minted ticket.
    pub fn publish_metadata(
        &self,
        event: &Event,
        ticket: &Ticket,
    ) -> Result<NFTMetadata, ServiceError> {
        let doc = metadata::ticket_metadata(event, ticket, &self.base_url, None);
        let json = serde_json::to_string(&doc)?;
        self.db.put_metadata(ticket.token_id, &json)?;
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    use crate::chain::DemoChain;
    use crate::fraud::FraudEngine;
    use crate::fraud::signals::SignalSource;

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    /// Signals that trigger no rule.
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

    fn temp_db_path() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("eventxx_service_{}_{id}.db", std::process::id()))
    }

    fn service() -> (TicketService, SharedFraudEngine, SharedDatabase) {
        let config = Config::default();
        let engine = SharedFraudEngine::new(FraudEngine::with_signals(
            &config.fraud,
            Box::new(QuietSignals),
        ));
        let db = SharedDatabase::open(&temp_db_path()).unwrap();
        let service = TicketService::new(
            Arc::new(DemoChain::new()),
            engine.clone(),
            db.clone(),
            &config,
        );
        (service, engine, db)
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
            organizer_email: Some("organizer@example.com".into()),
            organizer_phone: None,
        }
    }

    #[tokio::test]
    async fn clean_event_is_created() {
        let (service, _, db) = service();
        let created = service.create_event(ALICE, &request()).await.unwrap();
        assert_eq!(created.event_id, 5);
        assert_eq!(created.validation.risk_level, RiskLevel::Low);
        assert!(created.validation.event_id.starts_with("event_"));

        let event = service.get_event(5).await.unwrap();
        assert_eq!(event.name, "Rust Meetup");
        assert_eq!(event.organizer, ALICE);

        // nothing scored, nothing persisted
        assert_eq!(db.alert_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn blacklisted_organizer_is_rejected_and_logged() {
        let (service, engine, db) = service();
        engine.add_to_blacklist(ALICE);

        let err = service.create_event(ALICE, &request()).await.unwrap_err();
        assert!(err.to_string().starts_with("Event validation failed:"));
        assert!(err.to_string().contains("Blacklisted organizer"));

        let alerts = db.recent_alerts(10).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, "event");
        assert!(alerts[0].blocked);
        assert_eq!(alerts[0].risk_level, "CRITICAL");

        // the chain never saw the event
        assert_eq!(service.get_all_events().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn incomplete_submission_scores_low_and_passes() {
        let (service, _, db) = service();
        let mut incomplete = request();
        incomplete.description = String::new();

        let created = service.create_event(ALICE, &incomplete).await.unwrap();
        assert_eq!(created.validation.risk_score, 0.2);
        assert!(created
            .validation
            .flags
            .contains(&"Incomplete event information".to_string()));

        // 0.2 sits under the persistence cutoff
        assert_eq!(db.alert_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn purchase_uses_listed_price_and_publishes_metadata() {
        let (service, _, _) = service();
        let token_id = service.buy_ticket(BOB, 1).await.unwrap();
        assert_eq!(token_id, 1);

        let tickets = service.get_user_tickets(BOB).await.unwrap();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].event_name, "Tech Conference 2024");

        let (doc, stored) = service.ticket_metadata(token_id).unwrap();
        assert!(stored);
        assert_eq!(doc.name, "Tech Conference 2024 - Ticket #1");
    }

    #[tokio::test]
    async fn purchase_of_missing_event_is_not_found() {
        let (service, _, _) = service();
        let err = service.buy_ticket(BOB, 99).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Chain(ChainError::EventNotFound(99))
        ));
    }

    #[tokio::test]
    async fn clean_transfer_goes_through() {
        let (service, _, db) = service();
        let token_id = service.buy_ticket(ALICE, 1).await.unwrap();

        let analysis = service
            .transfer_ticket(ALICE, BOB, token_id, "0.1")
            .await
            .unwrap();
        assert_eq!(analysis.risk_level, RiskLevel::Low);
        assert!(!analysis.is_blocked);
        assert!(analysis.transfer_id.starts_with("transfer_1_"));
        assert_eq!(db.alert_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn transfer_to_blacklisted_address_is_blocked() {
        let (service, engine, db) = service();
        engine.add_to_blacklist(BOB);
        let token_id = service.buy_ticket(ALICE, 1).await.unwrap();

        let err = service
            .transfer_ticket(ALICE, BOB, token_id, "0.1")
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Transfer blocked due to high fraud risk (90.0%)"));
        assert!(message.contains("Blacklisted address involved"));

        let alerts = db.recent_alerts(10).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, "transfer");
        assert!(alerts[0].blocked);
    }

    #[tokio::test]
    async fn used_ticket_state_round_trip() {
        let (service, _, _) = service();
        let token_id = service.buy_ticket(ALICE, 1).await.unwrap();
        assert!(!service.is_ticket_used(token_id).await.unwrap());
        service.use_ticket(token_id).await.unwrap();
        assert!(service.is_ticket_used(token_id).await.unwrap());
    }

    #[tokio::test]
    async fn metadata_publish_and_serve() {
        let (service, _, _) = service();
        let event = service.get_event(1).await.unwrap();
        let token_id = service.buy_ticket(ALICE, 1).await.unwrap();
        let ticket = Ticket {
            token_id,
            event_id: event.id,
            owner: ALICE.into(),
            is_used: false,
            event_name: event.name.clone(),
            event_date: event.event_date,
            location: event.location.clone(),
        };

        let published = service.publish_metadata(&event, &ticket).unwrap();
        assert_eq!(published.name, "Tech Conference 2024 - Ticket #1");

        let (doc, stored) = service.ticket_metadata(token_id).unwrap();
        assert!(stored);
        assert_eq!(doc, published);
    }

    #[tokio::test]
    async fn unknown_token_gets_placeholder_metadata() {
        let (service, _, _) = service();
        let (doc, stored) = service.ticket_metadata(404).unwrap();
        assert!(!stored);
        assert_eq!(doc.name, "EventXX Ticket #404");
    }
}
