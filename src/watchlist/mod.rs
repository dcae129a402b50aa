use serde::{Deserialize, Serialize};

use crate::fraud::SharedFraudEngine;

/// Which list an address sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Blocked,
    Trusted,
}

impl ListKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Blocked => "blocked",
            ListKind::Trusted => "trusted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blocked" => Some(ListKind::Blocked),
            "trusted" => Some(ListKind::Trusted),
            _ => None,
        }
    }
}

/// A persisted watchlist entry. Addresses are stored lowercased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedAddress {
    pub address: String,
    pub kind: ListKind,
    pub reason: Option<String>,
}

impl ListedAddress {
    pub fn new(address: &str, kind: ListKind, reason: Option<String>) -> Self {
        Self {
            address: address.to_lowercase(),
            kind,
            reason,
        }
    }
}

/// Seed the engine's block/allow lists from persisted entries.
/// Returns (blocked, trusted) counts.
pub fn hydrate_engine(engine: &SharedFraudEngine, entries: &[ListedAddress]) -> (usize, usize) {
    let mut blocked = 0;
    let mut trusted = 0;
    for entry in entries {
        match entry.kind {
            ListKind::Blocked => {
                engine.add_to_blacklist(&entry.address);
                blocked += 1;
            }
            ListKind::Trusted => {
                engine.add_to_whitelist(&entry.address);
                trusted += 1;
            }
        }
    }
    (blocked, trusted)
}
