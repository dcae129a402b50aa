pub mod heuristics;
pub mod rules;
pub mod signals;

use crate::config::FraudConfig;
use crate::core::{EventValidation, RiskLevel, TransferAnalysis};
use rules::{EventFeatures, EventRule, TransferFeatures, TransferRule};
use serde::Serialize;
use signals::{SignalSource, SyntheticSignals};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Transfers older than this no longer feed the rapid/bot checks.
const RECENT_WINDOW_SECS: i64 = 3600;

/// Known fraudulent addresses every engine starts with.
const SEED_BLACKLIST: &[&str] = &["0x0000000000000000000000000000000000000000"];

/// A listing as submitted for validation, including the contact details
/// that never reach the chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventSubmission {
    pub title: String,
    pub description: String,
    /// Display date, e.g. "2024-06-01".
    pub date: String,
    /// Display time, e.g. "19:30".
    pub time: String,
    pub location: String,
    /// Decimal AVAX string.
    pub price: String,
    pub total_tickets: u64,
    pub image: String,
    pub organizer_email: String,
    pub organizer_phone: String,
}

/// One remembered transfer, keyed under the lowercased sender.
#[derive(Debug, Clone)]
struct TransferRecord {
    to: String,
    price: f64,
    timestamp: i64,
    gas_price: Option<u64>,
    flags: Vec<String>,
}

/// Aggregate counters for the fraud dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudStatistics {
    pub total_transfers: usize,
    pub flagged_transfers: usize,
    pub flagged_percentage: f64,
    pub blacklisted_addresses: usize,
    pub whitelisted_addresses: usize,
}

/// The fraud engine applies the rule tables to transfers and listings,
/// tracks per-address transfer history, and manages the block/allow lists.
pub struct FraudEngine {
    transfer_rules: Vec<Box<dyn TransferRule + Send + Sync>>,
    event_rules: Vec<Box<dyn EventRule + Send + Sync>>,
    weights: HashMap<String, f64>,
    history: HashMap<String, Vec<TransferRecord>>,
    history_limit: usize,
    blacklist: HashSet<String>,
    whitelist: HashSet<String>,
    signals: Box<dyn SignalSource>,
}

impl FraudEngine {
    pub fn new(config: &FraudConfig) -> Self {
        Self::with_signals(config, Box::new(SyntheticSignals))
    }

    pub fn with_signals(config: &FraudConfig, signals: Box<dyn SignalSource>) -> Self {
        Self {
            transfer_rules: rules::transfer_rules(),
            event_rules: rules::event_rules(),
            weights: config.weights.clone(),
            history: HashMap::new(),
            history_limit: config.history_limit,
            blacklist: SEED_BLACKLIST.iter().map(|a| a.to_string()).collect(),
            whitelist: HashSet::new(),
            signals,
        }
    }

    /// Score a single ticket transfer and record it for future analyses.
    pub fn analyze_transfer(
        &mut self,
        transfer_id: &str,
        from: &str,
        to: &str,
        token_id: &str,
        price: f64,
        timestamp: i64,
        gas_price: Option<u64>,
    ) -> TransferAnalysis {
        let from_key = from.to_lowercase();
        let to_key = to.to_lowercase();

        let mut flags = Vec::new();
        let mut score = 0.0;

        if self.blacklist.contains(&from_key) || self.blacklist.contains(&to_key) {
            flags.push("Blacklisted address involved".to_string());
            score += 0.9;
        }

        let features = self.transfer_features(&from_key, &to_key, timestamp);
        for rule in &self.transfer_rules {
            if rule.triggers(&features) {
                flags.push(rule.flag().to_string());
                score += self.weight_for(rule.id(), rule.default_weight());
            }
        }

        let risk_score = score.min(1.0);
        let risk_level = RiskLevel::from_score(risk_score);
        let is_blocked = risk_level == RiskLevel::Critical || risk_score > 0.9;

        if !flags.is_empty() {
            tracing::debug!(
                transfer_id,
                risk_score,
                ?flags,
                "transfer flagged by fraud rules"
            );
        }

        self.record_transfer(
            &from_key,
            TransferRecord {
                to: to_key,
                price,
                timestamp,
                gas_price,
                flags: flags.clone(),
            },
        );

        TransferAnalysis {
            transfer_id: transfer_id.to_string(),
            from_address: from.to_string(),
            to_address: to.to_string(),
            token_id: token_id.to_string(),
            risk_score,
            risk_level,
            flags,
            is_blocked,
        }
    }

    /// Score an event listing before it is allowed on chain.
    pub fn validate_event(
        &self,
        event_id: &str,
        organizer: &str,
        submission: &EventSubmission,
    ) -> EventValidation {
        let organizer_key = organizer.to_lowercase();

        let mut flags = Vec::new();
        let mut recommendations = Vec::new();
        let mut score = 0.0;

        if self.blacklist.contains(&organizer_key) {
            flags.push("Blacklisted organizer".to_string());
            score += 0.9;
            recommendations.push("Block event creation".to_string());
        }

        let features = self.event_features(&organizer_key, submission);
        for rule in &self.event_rules {
            if rule.triggers(&features) {
                flags.push(rule.flag().to_string());
                score += self.weight_for(rule.id(), rule.default_weight());
            }
        }

        if heuristics::incomplete_information(&[
            &submission.title,
            &submission.description,
            &submission.date,
            &submission.time,
            &submission.location,
            &submission.price,
        ]) {
            flags.push("Incomplete event information".to_string());
            score += 0.2;
            recommendations.push("Request additional verification documents".to_string());
        }

        if heuristics::suspicious_contact(&submission.organizer_email, &submission.organizer_phone)
        {
            flags.push("Suspicious contact information".to_string());
            score += 0.3;
            recommendations.push("Verify organizer identity".to_string());
        }

        let risk_score = score.min(1.0);
        let risk_level = RiskLevel::from_score(risk_score);

        match risk_level {
            RiskLevel::High | RiskLevel::Critical => {
                recommendations.push("Require manual review before approval".to_string());
                recommendations.push("Request additional verification".to_string());
            }
            RiskLevel::Medium => {
                recommendations.push("Monitor event closely".to_string());
                recommendations.push("Enable enhanced fraud detection".to_string());
            }
            RiskLevel::Low => {}
        }

        EventValidation {
            event_id: event_id.to_string(),
            organizer_address: organizer.to_string(),
            risk_score,
            risk_level,
            flags,
            recommendations,
        }
    }

    pub fn add_to_blacklist(&mut self, address: &str) {
        self.blacklist.insert(address.to_lowercase());
    }

    pub fn remove_from_blacklist(&mut self, address: &str) {
        self.blacklist.remove(&address.to_lowercase());
    }

    pub fn is_blacklisted(&self, address: &str) -> bool {
        self.blacklist.contains(&address.to_lowercase())
    }

    pub fn add_to_whitelist(&mut self, address: &str) {
        self.whitelist.insert(address.to_lowercase());
    }

    pub fn remove_from_whitelist(&mut self, address: &str) {
        self.whitelist.remove(&address.to_lowercase());
    }

    pub fn is_whitelisted(&self, address: &str) -> bool {
        self.whitelist.contains(&address.to_lowercase())
    }

    pub fn statistics(&self) -> FraudStatistics {
        let total_transfers: usize = self.history.values().map(Vec::len).sum();
        let flagged_transfers = self
            .history
            .values()
            .flatten()
            .filter(|record| !record.flags.is_empty())
            .count();
        let flagged_percentage = if total_transfers > 0 {
            flagged_transfers as f64 / total_transfers as f64 * 100.0
        } else {
            0.0
        };
        FraudStatistics {
            total_transfers,
            flagged_transfers,
            flagged_percentage,
            blacklisted_addresses: self.blacklist.len(),
            whitelisted_addresses: self.whitelist.len(),
        }
    }

    fn weight_for(&self, rule_id: &str, default: f64) -> f64 {
        self.weights.get(rule_id).copied().unwrap_or(default)
    }

    fn transfer_features(&self, from: &str, to: &str, now: i64) -> TransferFeatures {
        let recent = self.recent_transfers(from, now);
        let prices: Vec<f64> = recent.iter().map(|r| r.price).collect();
        let timestamps: Vec<i64> = recent.iter().map(|r| r.timestamp).collect();
        let gas_prices: Vec<Option<u64>> = recent.iter().map(|r| r.gas_price).collect();

        TransferFeatures {
            transfer_count: recent.len(),
            time_span_secs: recent.first().map(|r| now - r.timestamp).unwrap_or(0),
            price_deviation: heuristics::price_deviation(&prices),
            wallet_age_secs: self.signals.wallet_age_secs(from),
            transaction_count: self.signals.transaction_count(from),
            has_circular_pattern: self
                .history
                .get(from)
                .is_some_and(|records| records.iter().any(|r| r.to == to)),
            uniform_timing: heuristics::uniform_timing(&timestamps),
            round_gas_prices: heuristics::round_gas_prices(&gas_prices),
        }
    }

    fn event_features(&self, organizer: &str, submission: &EventSubmission) -> EventFeatures {
        let price_avax: f64 = submission.price.trim().parse().unwrap_or(f64::NAN);
        EventFeatures {
            organizer_age_secs: self.signals.wallet_age_secs(organizer),
            content_similarity: self
                .signals
                .content_similarity(&submission.title, &submission.description),
            price_to_market_ratio: heuristics::price_to_market_ratio(price_avax),
            ticket_count: submission.total_tickets,
            venue_capacity: heuristics::venue_capacity(&submission.location),
            ticket_price_avax: price_avax,
            image_flagged: self.signals.image_flagged(&submission.image),
        }
    }

    fn recent_transfers(&self, address: &str, now: i64) -> Vec<&TransferRecord> {
        let cutoff = now - RECENT_WINDOW_SECS;
        self.history
            .get(address)
            .map(|records| records.iter().filter(|r| r.timestamp > cutoff).collect())
            .unwrap_or_default()
    }

    fn record_transfer(&mut self, from: &str, record: TransferRecord) {
        let records = self.history.entry(from.to_string()).or_default();
        records.push(record);
        if records.len() > self.history_limit {
            let excess = records.len() - self.history_limit;
            records.drain(..excess);
        }
    }
}

/// Thread-safe wrapper around FraudEngine.
#[derive(Clone)]
pub struct SharedFraudEngine {
    inner: Arc<Mutex<FraudEngine>>,
}

impl SharedFraudEngine {
    pub fn new(engine: FraudEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn analyze_transfer(
        &self,
        transfer_id: &str,
        from: &str,
        to: &str,
        token_id: &str,
        price: f64,
        timestamp: i64,
        gas_price: Option<u64>,
    ) -> TransferAnalysis {
        let mut engine = self.inner.lock().unwrap();
        engine.analyze_transfer(transfer_id, from, to, token_id, price, timestamp, gas_price)
    }

    pub fn validate_event(
        &self,
        event_id: &str,
        organizer: &str,
        submission: &EventSubmission,
    ) -> EventValidation {
        let engine = self.inner.lock().unwrap();
        engine.validate_event(event_id, organizer, submission)
    }

    pub fn add_to_blacklist(&self, address: &str) {
        let mut engine = self.inner.lock().unwrap();
        engine.add_to_blacklist(address);
    }

    pub fn remove_from_blacklist(&self, address: &str) {
        let mut engine = self.inner.lock().unwrap();
        engine.remove_from_blacklist(address);
    }

    pub fn is_blacklisted(&self, address: &str) -> bool {
        let engine = self.inner.lock().unwrap();
        engine.is_blacklisted(address)
    }

    pub fn add_to_whitelist(&self, address: &str) {
        let mut engine = self.inner.lock().unwrap();
        engine.add_to_whitelist(address);
    }

    pub fn remove_from_whitelist(&self, address: &str) {
        let mut engine = self.inner.lock().unwrap();
        engine.remove_from_whitelist(address);
    }

    pub fn is_whitelisted(&self, address: &str) -> bool {
        let engine = self.inner.lock().unwrap();
        engine.is_whitelisted(address)
    }

    pub fn statistics(&self) -> FraudStatistics {
        let engine = self.inner.lock().unwrap();
        engine.statistics()
    }
}
