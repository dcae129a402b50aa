pub mod contract;
pub mod mock;
pub mod rpc;

pub use contract::{TicketsContract, format_avax, parse_avax};
pub use mock::DemoChain;
pub use rpc::{EvmRpc, RpcChain};

use async_trait::async_trait;
use thiserror::Error;

use crate::core::{CreateEventRequest, Event, Ticket};

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Signer required for {0}")]
    SignerRequired(&'static str),

    #[error("Invalid event ID")]
    InvalidEventId,

    #[error("Event {0} not found")]
    EventNotFound(u64),

    #[error("Ticket {0} not found")]
    TicketNotFound(u64),

    #[error("Event is not active")]
    EventInactive,

    #[error("Event is sold out")]
    SoldOut,

    #[error("Ticket already used")]
    TicketAlreadyUsed,

    #[error("Not the ticket owner")]
    NotTicketOwner,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid AVAX amount: {0}")]
    InvalidAmount(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error: {0}")]
    Rpc(serde_json::Value),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Failed to connect to any RPC endpoint after {0} retries")]
    NoEndpoint(u32),
}

/// Static connection parameters for one Avalanche network.
pub struct NetworkPreset {
    pub name: &'static str,
    pub chain_id: u64,
    pub chain_id_hex: &'static str,
    pub rpc_urls: &'static [&'static str],
    pub explorer: &'static str,
    pub contract_address: &'static str,
}

pub const FUJI: NetworkPreset = NetworkPreset {
    name: "fuji",
    chain_id: 43113,
    chain_id_hex: "0xa869",
    rpc_urls: &[
        "https://api.avax-test.network/ext/bc/C/rpc",
        "https://avalanche-fuji-c-chain.publicnode.com",
        "https://rpc.ankr.com/avalanche_fuji",
        "https://ava-testnet.public.blastapi.io/ext/bc/C/rpc",
    ],
    explorer: "https://testnet.snowtrace.io",
    contract_address: "0x742d35Cc6634C0532925a3b8D4C9db96C4b5Da5A",
};

pub const MAINNET: NetworkPreset = NetworkPreset {
    name: "mainnet",
    chain_id: 43114,
    chain_id_hex: "0xa86a",
    rpc_urls: &[
        "https://api.avax.network/ext/bc/C/rpc",
        "https://avalanche-c-chain.publicnode.com",
        "https://rpc.ankr.com/avalanche",
        "https://ava-mainnet.public.blastapi.io/ext/bc/C/rpc",
    ],
    explorer: "https://snowtrace.io",
    // No deployment yet.
    contract_address: "0x0000000000000000000000000000000000000000",
};

impl NetworkPreset {
    pub fn by_name(name: &str) -> Option<&'static NetworkPreset> {
        match name {
            "fuji" => Some(&FUJI),
            "mainnet" => Some(&MAINNET),
            _ => None,
        }
    }
}

/// Read and write access to the event-tickets contract.
#[async_trait]
pub trait TicketChain: Send + Sync {
    async fn get_event(&self, event_id: u64) -> Result<Event, ChainError>;
    async fn get_all_events(&self) -> Result<Vec<Event>, ChainError>;
    async fn get_user_tickets(&self, owner: &str) -> Result<Vec<Ticket>, ChainError>;
    async fn is_ticket_used(&self, token_id: u64) -> Result<bool, ChainError>;
    async fn owner_of(&self, token_id: u64) -> Result<String, ChainError>;
    async fn token_uri(&self, token_id: u64) -> Result<String, ChainError>;

    /// Returns the new event id.
    async fn create_event(
        &self,
        organizer: &str,
        request: &CreateEventRequest,
    ) -> Result<u64, ChainError>;
    /// Returns the minted token id.
    async fn buy_ticket(
        &self,
        buyer: &str,
        event_id: u64,
        price_avax: &str,
    ) -> Result<u64, ChainError>;
    async fn use_ticket(&self, token_id: u64) -> Result<(), ChainError>;
    async fn transfer_from(&self, from: &str, to: &str, token_id: u64)
    -> Result<(), ChainError>;
}
