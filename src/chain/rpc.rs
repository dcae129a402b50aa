use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ethers_core::types::U256;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::contract::{TicketsContract, topic_to_u64};
use super::{ChainError, TicketChain};
use crate::core::{CreateEventRequest, Event, Ticket};

const SCAN_ATTEMPTS: u32 = 3;

/// Exponential backoff delay: initial * 2^retry, shift capped to keep the
/// multiplication in range.
pub fn backoff_delay_ms(initial_ms: u64, retry_index: u32) -> u64 {
    initial_ms.max(1).saturating_mul(1u64 << retry_index.min(16))
}

/// Subset of an eth_getLogs entry the scanner reads.
#[derive(Debug, Clone, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

/// Simple EVM JSON-RPC client.
pub struct EvmRpc {
    url: String,
    client: Client,
}

impl EvmRpc {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Probes endpoints in order until one answers eth_blockNumber. Each URL
    /// gets up to `max_retries` attempts with exponential backoff in between.
    pub async fn connect(urls: &[String], max_retries: u32) -> Result<Self, ChainError> {
        for url in urls {
            for retry in 0..max_retries {
                let rpc = Self::new(url);
                match rpc.block_number().await {
                    Ok(height) => {
                        info!(url = url.as_str(), height, "connected to RPC endpoint");
                        return Ok(rpc);
                    }
                    Err(e) => {
                        warn!(url = url.as_str(), retry, "endpoint probe failed: {e}");
                        if retry + 1 < max_retries {
                            let delay = backoff_delay_ms(1000, retry);
                            tokio::time::sleep(Duration::from_millis(delay)).await;
                        }
                    }
                }
            }
        }
        Err(ChainError::NoEndpoint(max_retries))
    }

    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, ChainError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let json: Value = resp.json().await?;

        if let Some(err) = json.get("error").and_then(|e| {
            if e.is_null() {
                None
            } else {
                Some(e.clone())
            }
        }) {
            return Err(ChainError::Rpc(err));
        }

        Ok(json["result"].clone())
    }

    fn as_quantity(value: &Value) -> Result<u64, ChainError> {
        let text = value
            .as_str()
            .ok_or_else(|| ChainError::Rpc(value.clone()))?;
        u64::from_str_radix(text.trim_start_matches("0x"), 16)
            .map_err(|_| ChainError::Rpc(value.clone()))
    }

    pub async fn block_number(&self) -> Result<u64, ChainError> {
        let result = self.call("eth_blockNumber", vec![]).await?;
        Self::as_quantity(&result)
    }

    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        let result = self.call("eth_chainId", vec![]).await?;
        Self::as_quantity(&result)
    }

    pub async fn gas_price(&self) -> Result<u64, ChainError> {
        let result = self.call("eth_gasPrice", vec![]).await?;
        Self::as_quantity(&result)
    }

    pub async fn get_balance(&self, address: &str) -> Result<U256, ChainError> {
        let result = self
            .call("eth_getBalance", vec![json!(address), json!("latest")])
            .await?;
        let text = result
            .as_str()
            .ok_or_else(|| ChainError::Rpc(result.clone()))?;
        U256::from_str_radix(text.trim_start_matches("0x"), 16)
            .map_err(|_| ChainError::Rpc(result.clone()))
    }

    pub async fn eth_call(&self, to: &str, data: &str) -> Result<String, ChainError> {
        let result = self
            .call("eth_call", vec![json!({ "to": to, "data": data }), json!("latest")])
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ChainError::Rpc(result.clone()))
    }

    pub async fn get_logs(
        &self,
        address: &str,
        topic0: &str,
        from_block: u64,
    ) -> Result<Vec<LogEntry>, ChainError> {
        let filter = json!({
            "fromBlock": format!("0x{from_block:x}"),
            "toBlock": "latest",
            "address": address,
            "topics": [topic0],
        });
        let result = self.call("eth_getLogs", vec![filter]).await?;
        serde_json::from_value(result.clone()).map_err(|_| ChainError::Rpc(result))
    }
}

/// Live chain access over JSON-RPC. Reads go through eth_call and
/// eth_getLogs; writes need a signer this deployment does not hold.
pub struct RpcChain {
    rpc: EvmRpc,
    contract: TicketsContract,
    log_scan_blocks: u64,
}

impl RpcChain {
    pub fn new(rpc: EvmRpc, contract: TicketsContract, log_scan_blocks: u64) -> Self {
        Self {
            rpc,
            contract,
            log_scan_blocks,
        }
    }

    async fn fetch_event(&self, event_id: u64) -> Result<Event, ChainError> {
        let data = self.contract.encode_get_event(event_id)?;
        let ret = self
            .rpc
            .eth_call(&self.contract.address_hex(), &data)
            .await?;
        self.contract.decode_get_event(&ret)
    }

    async fn fetch_is_used(&self, token_id: u64) -> Result<bool, ChainError> {
        let data = self.contract.encode_is_ticket_used(token_id)?;
        let ret = self
            .rpc
            .eth_call(&self.contract.address_hex(), &data)
            .await?;
        self.contract.decode_is_ticket_used(&ret)
    }

    /// One EventCreated log scan over the trailing block window.
    async fn scan_events(&self) -> Result<Vec<Event>, ChainError> {
        let current = self.rpc.block_number().await?;
        let from_block = current.saturating_sub(self.log_scan_blocks);
        let topic = self.contract.event_created_topic()?;
        let logs = self
            .rpc
            .get_logs(&self.contract.address_hex(), &topic, from_block)
            .await?;

        let mut events = Vec::new();
        for log in &logs {
            let Some(event_id) = log.topics.get(1).and_then(|t| topic_to_u64(t)) else {
                continue;
            };
            match self.fetch_event(event_id).await {
                Ok(event) => events.push(event),
                Err(e) => warn!(event_id, "skipping event that failed to load: {e}"),
            }
        }
        Ok(events)
    }

    /// token id -> event id, from TicketPurchased logs in the scan window.
    async fn purchase_map(&self) -> Result<HashMap<u64, u64>, ChainError> {
        let current = self.rpc.block_number().await?;
        let from_block = current.saturating_sub(self.log_scan_blocks);
        let topic = self.contract.ticket_purchased_topic()?;
        let logs = self
            .rpc
            .get_logs(&self.contract.address_hex(), &topic, from_block)
            .await?;

        let mut map = HashMap::new();
        for log in &logs {
            if let Some((event_id, token_id)) =
                self.contract.decode_ticket_purchased(&log.topics, &log.data)
            {
                map.insert(token_id, event_id);
            }
        }
        Ok(map)
    }
}

#[async_trait]
impl TicketChain for RpcChain {
    async fn get_event(&self, event_id: u64) -> Result<Event, ChainError> {
        if event_id == 0 {
            return Err(ChainError::InvalidEventId);
        }
        self.fetch_event(event_id).await
    }

    async fn get_all_events(&self) -> Result<Vec<Event>, ChainError> {
        let mut attempt = 1;
        loop {
            match self.scan_events().await {
                Ok(events) => return Ok(events),
                Err(e) if attempt < SCAN_ATTEMPTS => {
                    warn!(attempt, "event scan failed, retrying: {e}");
                    let delay = backoff_delay_ms(1000, attempt - 1);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_user_tickets(&self, owner: &str) -> Result<Vec<Ticket>, ChainError> {
        let data = self.contract.encode_get_user_tickets(owner)?;
        let ret = self
            .rpc
            .eth_call(&self.contract.address_hex(), &data)
            .await?;
        let token_ids = self.contract.decode_get_user_tickets(&ret)?;
        if token_ids.is_empty() {
            return Ok(Vec::new());
        }

        let purchases = self.purchase_map().await.unwrap_or_default();

        let mut tickets = Vec::with_capacity(token_ids.len());
        for token_id in token_ids {
            let is_used = self.fetch_is_used(token_id).await.unwrap_or(false);
            let event_id = purchases.get(&token_id).copied().unwrap_or(0);
            let (event_name, event_date, location) = if event_id == 0 {
                (String::new(), Utc::now().timestamp(), String::new())
            } else {
                match self.fetch_event(event_id).await {
                    Ok(event) => (event.name, event.event_date, event.location),
                    Err(e) => {
                        warn!(token_id, "ticket event lookup failed: {e}");
                        (String::new(), Utc::now().timestamp(), String::new())
                    }
                }
            };
            tickets.push(Ticket {
                token_id,
                event_id,
                owner: owner.to_string(),
                is_used,
                event_name,
                event_date,
                location,
            });
        }
        Ok(tickets)
    }

    async fn is_ticket_used(&self, token_id: u64) -> Result<bool, ChainError> {
        self.fetch_is_used(token_id).await
    }

    async fn owner_of(&self, token_id: u64) -> Result<String, ChainError> {
        let data = self.contract.encode_owner_of(token_id)?;
        let ret = self
            .rpc
            .eth_call(&self.contract.address_hex(), &data)
            .await?;
        self.contract.decode_owner_of(&ret)
    }

    async fn token_uri(&self, token_id: u64) -> Result<String, ChainError> {
        let data = self.contract.encode_token_uri(token_id)?;
        let ret = self
            .rpc
            .eth_call(&self.contract.address_hex(), &data)
            .await?;
        self.contract.decode_token_uri(&ret)
    }

    async fn create_event(
        &self,
        _organizer: &str,
        _request: &CreateEventRequest,
    ) -> Result<u64, ChainError> {
        Err(ChainError::SignerRequired("creating events"))
    }

    async fn buy_ticket(
        &self,
        _buyer: &str,
        _event_id: u64,
        _price_avax: &str,
    ) -> Result<u64, ChainError> {
        Err(ChainError::SignerRequired("buying tickets"))
    }

    async fn use_ticket(&self, _token_id: u64) -> Result<(), ChainError> {
        Err(ChainError::SignerRequired("using tickets"))
    }

    async fn transfer_from(
        &self,
        _from: &str,
        _to: &str,
        _token_id: u64,
    ) -> Result<(), ChainError> {
        Err(ChainError::SignerRequired("transferring tickets"))
    }
}
