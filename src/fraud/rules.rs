use super::heuristics::CAPACITY_SLACK_FACTOR;

/// Inputs for the transfer rule table, derived from the sender's recent
/// history window and the signal source.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferFeatures {
    /// Transfers from the sender within the last hour.
    pub transfer_count: usize,
    /// Seconds between the oldest of those transfers and now.
    pub time_span_secs: i64,
    /// Coefficient of variation of recent sale prices.
    pub price_deviation: f64,
    pub wallet_age_secs: u64,
    pub transaction_count: u64,
    pub has_circular_pattern: bool,
    pub uniform_timing: bool,
    pub round_gas_prices: bool,
}

/// Inputs for the event rule table.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFeatures {
    pub organizer_age_secs: u64,
    pub content_similarity: f64,
    pub price_to_market_ratio: f64,
    pub ticket_count: u64,
    pub venue_capacity: u64,
    pub ticket_price_avax: f64,
    pub image_flagged: bool,
}

/// A weighted boolean check over a single ticket transfer.
/// Triggered rules contribute their weight to the risk score and their
/// flag text to the analysis.
pub trait TransferRule {
    fn id(&self) -> &str;
    fn flag(&self) -> &str;
    fn default_weight(&self) -> f64;
    fn triggers(&self, features: &TransferFeatures) -> bool;
}

/// A weighted boolean check over an event listing.
pub trait EventRule {
    fn id(&self) -> &str;
    fn flag(&self) -> &str;
    fn default_weight(&self) -> f64;
    fn triggers(&self, features: &EventFeatures) -> bool;
}

/// All transfer rules with default weights.
pub fn transfer_rules() -> Vec<Box<dyn TransferRule + Send + Sync>> {
    vec![
        Box::new(RapidTransfers),
        Box::new(PriceManipulation),
        Box::new(NewWalletActivity),
        Box::new(CircularTrading),
        Box::new(BotBehavior),
    ]
}

/// All event rules with default weights.
pub fn event_rules() -> Vec<Box<dyn EventRule + Send + Sync>> {
    vec![
        Box::new(DuplicateContent),
        Box::new(UnrealisticPricing),
        Box::new(NewOrganizer),
        Box::new(ImpossibleVenue),
        Box::new(SuspiciousImages),
    ]
}

// --- Transfer rules ---

struct RapidTransfers;
impl TransferRule for RapidTransfers {
    fn id(&self) -> &str { "rapid_transfers" }
    fn flag(&self) -> &str { "Rapid consecutive transfers" }
    fn default_weight(&self) -> f64 { 0.4 }
    fn triggers(&self, f: &TransferFeatures) -> bool {
        // 5+ transfers within one hour
        f.transfer_count > 5 && f.time_span_secs < 3600
    }
}

struct PriceManipulation;
impl TransferRule for PriceManipulation {
    fn id(&self) -> &str { "price_manipulation" }
    fn flag(&self) -> &str { "Unusual price patterns" }
    fn default_weight(&self) -> f64 { 0.5 }
    fn triggers(&self, f: &TransferFeatures) -> bool {
        // 3x standard deviation from recent prices
        f.price_deviation > 3.0
    }
}

struct NewWalletActivity;
impl TransferRule for NewWalletActivity {
    fn id(&self) -> &str { "new_wallet_activity" }
    fn flag(&self) -> &str { "New wallet with high activity" }
    fn default_weight(&self) -> f64 { 0.3 }
    fn triggers(&self, f: &TransferFeatures) -> bool {
        // wallet younger than a day with 10+ transactions
        f.wallet_age_secs < 86_400 && f.transaction_count > 10
    }
}

struct CircularTrading;
impl TransferRule for CircularTrading {
    fn id(&self) -> &str { "circular_trading" }
    fn flag(&self) -> &str { "Circular trading pattern" }
    fn default_weight(&self) -> f64 { 0.6 }
    fn triggers(&self, f: &TransferFeatures) -> bool {
        f.has_circular_pattern
    }
}

struct BotBehavior;
impl TransferRule for BotBehavior {
    fn id(&self) -> &str { "bot_behavior" }
    fn flag(&self) -> &str { "Bot-like transaction patterns" }
    fn default_weight(&self) -> f64 { 0.4 }
    fn triggers(&self, f: &TransferFeatures) -> bool {
        f.uniform_timing && f.round_gas_prices
    }
}

// --- Event rules ---

struct DuplicateContent;
impl EventRule for DuplicateContent {
    fn id(&self) -> &str { "duplicate_content" }
    fn flag(&self) -> &str { "Duplicate event content" }
    fn default_weight(&self) -> f64 { 0.7 }
    fn triggers(&self, f: &EventFeatures) -> bool {
        f.content_similarity > 0.9
    }
}

struct UnrealisticPricing;
impl EventRule for UnrealisticPricing {
    fn id(&self) -> &str { "unrealistic_pricing" }
    fn flag(&self) -> &str { "Unrealistic ticket pricing" }
    fn default_weight(&self) -> f64 { 0.5 }
    fn triggers(&self, f: &EventFeatures) -> bool {
        f.price_to_market_ratio < 0.1 || f.price_to_market_ratio > 10.0
    }
}

struct NewOrganizer;
impl EventRule for NewOrganizer {
    fn id(&self) -> &str { "new_organizer" }
    fn flag(&self) -> &str { "New organizer with premium event" }
    fn default_weight(&self) -> f64 { 0.4 }
    fn triggers(&self, f: &EventFeatures) -> bool {
        // organizer younger than a week selling tickets above 1 AVAX
        f.organizer_age_secs < 604_800 && f.ticket_price_avax > 1.0
    }
}

struct ImpossibleVenue;
impl EventRule for ImpossibleVenue {
    fn id(&self) -> &str { "impossible_venue" }
    fn flag(&self) -> &str { "Impossible venue capacity" }
    fn default_weight(&self) -> f64 { 0.8 }
    fn triggers(&self, f: &EventFeatures) -> bool {
        f.ticket_count as f64 > f.venue_capacity as f64 * CAPACITY_SLACK_FACTOR
    }
}

struct SuspiciousImages;
impl EventRule for SuspiciousImages {
    fn id(&self) -> &str { "suspicious_images" }
    fn flag(&self) -> &str { "Stock or stolen images" }
    fn default_weight(&self) -> f64 { 0.6 }
    fn triggers(&self, f: &EventFeatures) -> bool {
        f.image_flagged
    }
}
