use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{Event, Ticket};

/// One OpenSea-style attribute entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NFTAttribute {
    pub trait_type: String,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub display_type: Option<String>,
}

impl NFTAttribute {
    fn text(trait_type: &str, value: impl Into<String>) -> Self {
        Self {
            trait_type: trait_type.to_string(),
            value: Value::from(value.into()),
            display_type: None,
        }
    }

    fn number(trait_type: &str, value: impl Into<Value>) -> Self {
        Self {
            trait_type: trait_type.to_string(),
            value: value.into(),
            display_type: Some("number".into()),
        }
    }

    fn date(trait_type: &str, millis: i64) -> Self {
        Self {
            trait_type: trait_type.to_string(),
            value: Value::from(millis),
            display_type: Some("date".into()),
        }
    }
}

/// OpenSea-style token metadata document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NFTMetadata {
    pub name: String,
    pub description: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub external_url: Option<String>,
    pub attributes: Vec<NFTAttribute>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub background_color: Option<String>,
}

/// Rarity tier by the token's position in the allocation.
fn ticket_rarity(token_id: u64, max_tickets: u64) -> &'static str {
    let position = token_id as f64 / max_tickets as f64 * 100.0;
    if position <= 1.0 {
        "Genesis"
    } else if position <= 5.0 {
        "Legendary"
    } else if position <= 15.0 {
        "Epic"
    } else if position <= 40.0 {
        "Rare"
    } else {
        "Common"
    }
}

/// hsl() color derived from the event name with the JS accumulator hash, so
/// colors match documents produced by the web client.
fn background_color(event_name: &str) -> String {
    let mut hash: i64 = 0;
    for c in event_name.encode_utf16() {
        let shifted = ((hash as i32).wrapping_shl(5)) as i64;
        hash = c as i64 + shifted - hash;
    }
    let hue = hash.abs() % 360;
    format!("hsl({hue}, 70%, 85%)")
}

fn ticket_image_url(base_url: &str, params: &[(&str, String)]) -> String {
    let endpoint = format!("{base_url}/api/ticket-image");
    reqwest::Url::parse_with_params(&endpoint, params)
        .map(|url| url.to_string())
        .unwrap_or(endpoint)
}

fn iso_millis(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Full metadata document for a minted ticket.
pub fn ticket_metadata(
    event: &Event,
    ticket: &Ticket,
    base_url: &str,
    seat_number: Option<&str>,
) -> NFTMetadata {
    let date = DateTime::from_timestamp(event.event_date, 0).unwrap_or_default();
    let display_date = date.format("%-m/%-d/%Y");

    let mut attributes = vec![
        NFTAttribute::text("Event Name", event.name.clone()),
        NFTAttribute::date("Event Date", event.event_date * 1000),
        NFTAttribute::text("Venue", event.location.clone()),
        NFTAttribute::text("Organizer", event.organizer.clone()),
        NFTAttribute::number("Ticket Price", event.price.trim().parse::<f64>().ok()),
        NFTAttribute::number("Ticket ID", ticket.token_id),
        NFTAttribute::number("Event ID", event.id),
        NFTAttribute::text("Status", if ticket.is_used { "Used" } else { "Valid" }),
        NFTAttribute::text("Transferable", if ticket.is_used { "No" } else { "Yes" }),
    ];
    if let Some(seat) = seat_number {
        attributes.push(NFTAttribute::text("Seat Number", seat));
    }
    attributes.push(NFTAttribute::text(
        "Rarity",
        ticket_rarity(ticket.token_id, event.max_tickets),
    ));

    let mut image_params = vec![
        ("eventName", event.name.clone()),
        ("ticketId", ticket.token_id.to_string()),
        ("eventDate", iso_millis(date)),
        ("venue", event.location.clone()),
    ];
    if let Some(seat) = seat_number {
        image_params.push(("seat", seat.to_string()));
    }

    NFTMetadata {
        name: format!("{} - Ticket #{}", event.name, ticket.token_id),
        description: format!(
            "Official NFT ticket for {}. This ticket grants access to the event on {}. \
             Ticket #{} of {}.",
            event.name, display_date, ticket.token_id, event.max_tickets
        ),
        image: ticket_image_url(base_url, &image_params),
        external_url: Some(format!("{base_url}/ticket/{}", ticket.token_id)),
        attributes,
        background_color: Some(background_color(&event.name)),
    }
}

/// Placeholder document served for tokens with nothing stored.
pub fn default_metadata(token_id: u64, base_url: &str) -> NFTMetadata {
    let image_params = vec![
        ("ticketId", token_id.to_string()),
        ("eventName", "Sample Event".to_string()),
        ("eventDate", iso_millis(Utc::now())),
        ("venue", "Sample Venue".to_string()),
    ];
    NFTMetadata {
        name: format!("EventXX Ticket #{token_id}"),
        description: "Official EventXX NFT Ticket".into(),
        image: ticket_image_url(base_url, &image_params),
        external_url: None,
        attributes: vec![
            NFTAttribute::number("Ticket ID", token_id),
            NFTAttribute::text("Status", "Valid"),
            NFTAttribute::text("Platform", "EventXX"),
        ],
        background_color: None,
    }
}

/// Rolling-hash signature over the pass identity fields, wire-compatible
/// with passes issued by the web client.
pub fn pass_signature(ticket_id: u64, event_id: u64, owner: &str, event_date: i64) -> String {
    let data = format!("{ticket_id}-{event_id}-{owner}-{event_date}");
    let mut hash: i32 = 0;
    for c in data.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(c as i32);
    }
    format!("{:x}", (hash as i64).abs())
}

/// QR payload carried by a ticket pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketPass {
    pub ticket_id: u64,
    pub event_id: u64,
    pub owner: String,
    pub event_name: String,
    /// Unix seconds.
    pub event_date: i64,
    pub is_used: bool,
    /// Issue time, unix milliseconds.
    pub timestamp: i64,
    pub signature: String,
}

impl TicketPass {
    pub fn issue(ticket: &Ticket, event: &Event) -> Self {
        Self {
            ticket_id: ticket.token_id,
            event_id: event.id,
            owner: ticket.owner.clone(),
            event_name: event.name.clone(),
            event_date: event.event_date,
            is_used: ticket.is_used,
            timestamp: Utc::now().timestamp_millis(),
            signature: pass_signature(ticket.token_id, event.id, &ticket.owner, event.event_date),
        }
    }

    pub fn signature_valid(&self) -> bool {
        self.signature == pass_signature(self.ticket_id, self.event_id, &self.owner, self.event_date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Valid,
    Invalid,
    Duplicate,
}

/// Outcome of one gate scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub ticket_id: u64,
    pub event_id: u64,
    pub status: VerificationStatus,
    pub message: String,
}

/// Gate-side scan state: which passes were already admitted this session.
pub struct TicketVerifier {
    scanned: HashSet<String>,
}

impl TicketVerifier {
    pub fn new() -> Self {
        Self {
            scanned: HashSet::new(),
        }
    }

    /// Checks a scanned pass against the gate's event. Accepted passes are
    /// recorded so a repeat scan reports a duplicate.
    pub fn verify(&mut self, pass: &TicketPass, gate_event_id: u64) -> VerificationOutcome {
        let mut outcome = VerificationOutcome {
            ticket_id: pass.ticket_id,
            event_id: pass.event_id,
            status: VerificationStatus::Valid,
            message: "Ticket verified successfully".into(),
        };

        let key = format!("{}_{}", pass.ticket_id, pass.event_id);
        if !pass.signature_valid() {
            outcome.status = VerificationStatus::Invalid;
            outcome.message = "Invalid ticket signature".into();
        } else if self.scanned.contains(&key) {
            outcome.status = VerificationStatus::Duplicate;
            outcome.message = "Ticket already used".into();
        } else if pass.event_id != gate_event_id {
            outcome.status = VerificationStatus::Invalid;
            outcome.message = "Ticket not valid for this event".into();
        } else {
            self.scanned.insert(key);
        }
        outcome
    }
}

impl Default for TicketVerifier {
    fn default() -> Self {
        Self::new()
    }
}
