use ethers_core::abi::{Abi, Token};
use ethers_core::types::{Address, U256};

use super::ChainError;
use crate::core::Event;

/// Event-tickets contract ABI, the surface the service actually calls.
const TICKETS_ABI_JSON: &str = r#"[
  {"inputs":[{"name":"name","type":"string"},{"name":"description","type":"string"},{"name":"price","type":"uint256"},{"name":"maxTickets","type":"uint256"},{"name":"eventDate","type":"uint256"},{"name":"location","type":"string"}],"name":"createEvent","outputs":[{"name":"","type":"uint256"}],"stateMutability":"nonpayable","type":"function"},
  {"inputs":[{"name":"eventId","type":"uint256"}],"name":"buyTicket","outputs":[{"name":"","type":"uint256"}],"stateMutability":"payable","type":"function"},
  {"inputs":[{"name":"eventId","type":"uint256"}],"name":"getEvent","outputs":[{"components":[{"name":"id","type":"uint256"},{"name":"name","type":"string"},{"name":"description","type":"string"},{"name":"organizer","type":"address"},{"name":"price","type":"uint256"},{"name":"maxTickets","type":"uint256"},{"name":"soldTickets","type":"uint256"},{"name":"eventDate","type":"uint256"},{"name":"location","type":"string"},{"name":"isActive","type":"bool"}],"name":"","type":"tuple"}],"stateMutability":"view","type":"function"},
  {"inputs":[{"name":"owner","type":"address"}],"name":"getUserTickets","outputs":[{"name":"","type":"uint256[]"}],"stateMutability":"view","type":"function"},
  {"inputs":[{"name":"tokenId","type":"uint256"}],"name":"isTicketUsed","outputs":[{"name":"","type":"bool"}],"stateMutability":"view","type":"function"},
  {"inputs":[{"name":"tokenId","type":"uint256"}],"name":"useTicket","outputs":[],"stateMutability":"nonpayable","type":"function"},
  {"inputs":[{"name":"from","type":"address"},{"name":"to","type":"address"},{"name":"tokenId","type":"uint256"}],"name":"transferFrom","outputs":[],"stateMutability":"nonpayable","type":"function"},
  {"inputs":[{"name":"tokenId","type":"uint256"}],"name":"ownerOf","outputs":[{"name":"","type":"address"}],"stateMutability":"view","type":"function"},
  {"inputs":[{"name":"tokenId","type":"uint256"}],"name":"tokenURI","outputs":[{"name":"","type":"string"}],"stateMutability":"view","type":"function"},
  {"anonymous":false,"inputs":[{"indexed":true,"name":"eventId","type":"uint256"},{"indexed":false,"name":"name","type":"string"},{"indexed":false,"name":"price","type":"uint256"},{"indexed":false,"name":"maxTickets","type":"uint256"}],"name":"EventCreated","type":"event"},
  {"anonymous":false,"inputs":[{"indexed":true,"name":"eventId","type":"uint256"},{"indexed":true,"name":"buyer","type":"address"},{"indexed":false,"name":"tokenId","type":"uint256"}],"name":"TicketPurchased","type":"event"},
  {"anonymous":false,"inputs":[{"indexed":true,"name":"tokenId","type":"uint256"}],"name":"TicketUsed","type":"event"},
  {"anonymous":false,"inputs":[{"indexed":true,"name":"from","type":"address"},{"indexed":true,"name":"to","type":"address"},{"indexed":true,"name":"tokenId","type":"uint256"}],"name":"Transfer","type":"event"}
]"#;

/// Wei to a trimmed decimal AVAX string ("0.1" style, at least one
/// fractional digit).
pub fn format_avax(wei: U256) -> String {
    let raw = wei.to_string();
    let padded = format!("{raw:0>19}");
    let split = padded.len() - 18;
    let (whole, frac) = padded.split_at(split);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        format!("{whole}.0")
    } else {
        format!("{whole}.{frac}")
    }
}

/// Decimal AVAX string to wei.
pub fn parse_avax(amount: &str) -> Result<U256, ChainError> {
    ethers_core::utils::parse_ether(amount)
        .map_err(|e| ChainError::InvalidAmount(format!("{amount}: {e}")))
}

/// A 32-byte log topic as a u64 id.
pub fn topic_to_u64(topic: &str) -> Option<u64> {
    let stripped = topic.trim_start_matches("0x");
    U256::from_str_radix(stripped, 16).ok().map(|v| v.low_u64())
}

/// ABI-level view of the event-tickets contract: calldata encoding,
/// return-data decoding, and log topics.
pub struct TicketsContract {
    address: Address,
    abi: Abi,
}

impl TicketsContract {
    pub fn new(address: &str) -> Result<Self, ChainError> {
        let address: Address = address
            .parse()
            .map_err(|_| ChainError::InvalidAddress(address.to_string()))?;
        let abi: Abi =
            serde_json::from_str(TICKETS_ABI_JSON).map_err(|e| ChainError::Abi(e.to_string()))?;
        Ok(Self { address, abi })
    }

    pub fn address_hex(&self) -> String {
        format!("{:?}", self.address)
    }

    fn encode_call(&self, name: &str, args: &[Token]) -> Result<String, ChainError> {
        let function = self
            .abi
            .function(name)
            .map_err(|e| ChainError::Abi(e.to_string()))?;
        let data = function
            .encode_input(args)
            .map_err(|e| ChainError::Abi(e.to_string()))?;
        Ok(format!("0x{}", hex::encode(data)))
    }

    fn decode_return(&self, name: &str, data: &str) -> Result<Vec<Token>, ChainError> {
        let function = self
            .abi
            .function(name)
            .map_err(|e| ChainError::Abi(e.to_string()))?;
        let bytes = hex::decode(data.trim_start_matches("0x"))
            .map_err(|e| ChainError::Abi(e.to_string()))?;
        function
            .decode_output(&bytes)
            .map_err(|e| ChainError::Abi(e.to_string()))
    }

    fn parse_address(address: &str) -> Result<Address, ChainError> {
        address
            .parse()
            .map_err(|_| ChainError::InvalidAddress(address.to_string()))
    }

    pub fn encode_get_event(&self, event_id: u64) -> Result<String, ChainError> {
        self.encode_call("getEvent", &[Token::Uint(U256::from(event_id))])
    }

    pub fn decode_get_event(&self, data: &str) -> Result<Event, ChainError> {
        let tokens = self.decode_return("getEvent", data)?;
        let Some(Token::Tuple(fields)) = tokens.first() else {
            return Err(ChainError::Abi("getEvent did not return a tuple".into()));
        };
        match fields.as_slice() {
            [
                Token::Uint(id),
                Token::String(name),
                Token::String(description),
                Token::Address(organizer),
                Token::Uint(price),
                Token::Uint(max_tickets),
                Token::Uint(sold_tickets),
                Token::Uint(event_date),
                Token::String(location),
                Token::Bool(is_active),
            ] => Ok(Event {
                id: id.low_u64(),
                name: name.clone(),
                description: description.clone(),
                organizer: format!("{organizer:?}"),
                price: format_avax(*price),
                max_tickets: max_tickets.low_u64(),
                sold_tickets: sold_tickets.low_u64(),
                event_date: event_date.low_u64() as i64,
                location: location.clone(),
                is_active: *is_active,
            }),
            _ => Err(ChainError::Abi("unexpected getEvent output shape".into())),
        }
    }

    pub fn encode_get_user_tickets(&self, owner: &str) -> Result<String, ChainError> {
        let owner = Self::parse_address(owner)?;
        self.encode_call("getUserTickets", &[Token::Address(owner)])
    }

    pub fn decode_get_user_tickets(&self, data: &str) -> Result<Vec<u64>, ChainError> {
        let tokens = self.decode_return("getUserTickets", data)?;
        let Some(Token::Array(items)) = tokens.first() else {
            return Err(ChainError::Abi("getUserTickets did not return an array".into()));
        };
        items
            .iter()
            .map(|item| match item {
                Token::Uint(id) => Ok(id.low_u64()),
                _ => Err(ChainError::Abi("non-uint token id".into())),
            })
            .collect()
    }

    pub fn encode_is_ticket_used(&self, token_id: u64) -> Result<String, ChainError> {
        self.encode_call("isTicketUsed", &[Token::Uint(U256::from(token_id))])
    }

    pub fn decode_is_ticket_used(&self, data: &str) -> Result<bool, ChainError> {
        let tokens = self.decode_return("isTicketUsed", data)?;
        match tokens.first() {
            Some(Token::Bool(used)) => Ok(*used),
            _ => Err(ChainError::Abi("isTicketUsed did not return a bool".into())),
        }
    }

    pub fn encode_owner_of(&self, token_id: u64) -> Result<String, ChainError> {
        self.encode_call("ownerOf", &[Token::Uint(U256::from(token_id))])
    }

    pub fn decode_owner_of(&self, data: &str) -> Result<String, ChainError> {
        let tokens = self.decode_return("ownerOf", data)?;
        match tokens.first() {
            Some(Token::Address(owner)) => Ok(format!("{owner:?}")),
            _ => Err(ChainError::Abi("ownerOf did not return an address".into())),
        }
    }

    pub fn encode_token_uri(&self, token_id: u64) -> Result<String, ChainError> {
        self.encode_call("tokenURI", &[Token::Uint(U256::from(token_id))])
    }

    pub fn decode_token_uri(&self, data: &str) -> Result<String, ChainError> {
        let tokens = self.decode_return("tokenURI", data)?;
        match tokens.first() {
            Some(Token::String(uri)) => Ok(uri.clone()),
            _ => Err(ChainError::Abi("tokenURI did not return a string".into())),
        }
    }

    pub fn event_created_topic(&self) -> Result<String, ChainError> {
        let event = self
            .abi
            .event("EventCreated")
            .map_err(|e| ChainError::Abi(e.to_string()))?;
        Ok(format!("{:?}", event.signature()))
    }

    pub fn ticket_purchased_topic(&self) -> Result<String, ChainError> {
        let event = self
            .abi
            .event("TicketPurchased")
            .map_err(|e| ChainError::Abi(e.to_string()))?;
        Ok(format!("{:?}", event.signature()))
    }

    /// (event_id, token_id) from a TicketPurchased log.
    pub fn decode_ticket_purchased(&self, topics: &[String], data: &str) -> Option<(u64, u64)> {
        let event_id = topic_to_u64(topics.get(1)?)?;
        let bytes = hex::decode(data.trim_start_matches("0x")).ok()?;
        let tokens =
            ethers_core::abi::decode(&[ethers_core::abi::ParamType::Uint(256)], &bytes).ok()?;
        match tokens.first() {
            Some(Token::Uint(token_id)) => Some((event_id, token_id.low_u64())),
            _ => None,
        }
    }
}
