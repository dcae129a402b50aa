use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub fraud: FraudConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NetworkConfig {
    /// "fuji" or "mainnet".
    pub chain: String,
    /// Overrides the preset endpoint list when non-empty.
    pub rpc_urls: Vec<String>,
    pub contract_address: Option<String>,
    pub max_retries: u32,
    /// How far back to scan for EventCreated logs.
    pub log_scan_blocks: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FraudConfig {
    pub weights: HashMap<String, f64>,
    /// Event creation is rejected above this score.
    pub create_block_score: f64,
    /// Transfers are rejected above this score.
    pub transfer_block_score: f64,
    /// Analyses below this score are not persisted as alerts.
    pub min_score_persist: f64,
    /// Transfer history records kept per address.
    pub history_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub watchlist_csv: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
    /// Prefix for token URIs in generated metadata.
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub max_notifications: usize,
    pub notification_ttl_seconds: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            fraud: FraudConfig::default(),
            database: DatabaseConfig::default(),
            api: ApiConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            chain: "fuji".into(),
            rpc_urls: Vec::new(),
            contract_address: None,
            max_retries: 3,
            log_scan_blocks: 2000,
        }
    }
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            weights: HashMap::new(),
            create_block_score: 0.7,
            transfer_block_score: 0.8,
            min_score_persist: 0.3,
            history_limit: 100,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/eventxx.db".into(),
            watchlist_csv: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".into(),
            base_url: "http://localhost:3000".into(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_notifications: 100,
            notification_ttl_seconds: 5,
        }
    }
}

impl Config {
    /// Load config from a TOML file. Falls back to defaults if file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Config loaded from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", path.display());
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_missing() {
        let config = Config::load("does_not_exist.toml");
        assert_eq!(config.network.chain, "fuji");
        assert_eq!(config.network.max_retries, 3);
        assert_eq!(config.fraud.create_block_score, 0.7);
        assert_eq!(config.fraud.transfer_block_score, 0.8);
        assert_eq!(config.fraud.history_limit, 100);
        assert_eq!(config.api.bind, "127.0.0.1:8080");
        assert_eq!(config.store.max_notifications, 100);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [network]
            chain = "mainnet"

            [fraud]
            create_block_score = 0.5

            [fraud.weights]
            rapid_transfers = 0.9
            "#,
        )
        .unwrap();
        assert_eq!(parsed.network.chain, "mainnet");
        assert_eq!(parsed.network.log_scan_blocks, 2000);
        assert_eq!(parsed.fraud.create_block_score, 0.5);
        assert_eq!(parsed.fraud.transfer_block_score, 0.8);
        assert_eq!(parsed.fraud.weights.get("rapid_transfers"), Some(&0.9));
        assert_eq!(parsed.database.path, "data/eventxx.db");
    }

    #[test]
    fn rpc_url_override_list() {
        let parsed: Config = toml::from_str(
            r#"
            [network]
            rpc_urls = ["http://localhost:9650/ext/bc/C/rpc"]
            contract_address = "0x00000000000000000000000000000000000000aa"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.network.rpc_urls.len(), 1);
        assert!(parsed.network.contract_address.is_some());
    }
}
