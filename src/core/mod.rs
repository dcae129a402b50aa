use serde::{Deserialize, Serialize};

/// An event listing as read from the tickets contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub organizer: String,
    /// Ticket price as a decimal AVAX string, e.g. "0.1".
    pub price: String,
    pub max_tickets: u64,
    pub sold_tickets: u64,
    /// Event start, unix seconds.
    pub event_date: i64,
    pub location: String,
    pub is_active: bool,
}

/// A new listing as submitted for creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub name: String,
    pub description: String,
    /// Ticket price as a decimal AVAX string.
    pub price: String,
    pub max_tickets: u64,
    /// Event start, unix seconds.
    pub event_date: i64,
    pub location: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub organizer_email: Option<String>,
    #[serde(default)]
    pub organizer_phone: Option<String>,
}

/// A ticket NFT with its resolved event context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub token_id: u64,
    pub event_id: u64,
    pub owner: String,
    pub is_used: bool,
    pub event_name: String,
    /// Unix seconds.
    pub event_date: i64,
    pub location: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,      // < 0.6
    Medium,   // >= 0.6
    High,     // >= 0.8
    Critical, // >= 0.9
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            RiskLevel::Critical
        } else if score >= 0.8 {
            RiskLevel::High
        } else if score >= 0.6 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

/// Result of scoring a single ticket transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferAnalysis {
    pub transfer_id: String,
    pub from_address: String,
    pub to_address: String,
    pub token_id: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub flags: Vec<String>,
    pub is_blocked: bool,
}

/// Result of validating an event listing before creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventValidation {
    pub event_id: String,
    pub organizer_address: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub flags: Vec<String>,
    pub recommendations: Vec<String>,
}

/// What a persisted fraud alert refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Event,
    Transfer,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Event => "event",
            AlertKind::Transfer => "transfer",
        }
    }
}

/// Review lifecycle of a persisted fraud alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Investigating,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Investigating => "investigating",
            AlertStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AlertStatus::Active),
            "investigating" => Some(AlertStatus::Investigating),
            "resolved" => Some(AlertStatus::Resolved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Warning,
    Info,
}

/// A feed entry shown to the user; expires shortly after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// Unix milliseconds.
    pub timestamp: i64,
}
