//! Inbound message models

use chrono::{DateTime, Utc};

use super::transaction::ShopId;

#[derive(Debug, Clone, PartialEq)]
pub struct Media {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Audio(Media),
    Image(Media),
}

/// Where the text the pipeline works on came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Text,
    Voice,
    Ticket,
}

impl Payload {
    pub fn source(&self) -> InputSource {
        match self {
            Payload::Text(_) => InputSource::Text,
            Payload::Audio(_) => InputSource::Voice,
            Payload::Image(_) => InputSource::Ticket,
        }
    }
}

/// One webhook event, already resolved to a shop and a payload
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Provider-assigned id, used as the idempotency key
    pub message_id: String,
    pub shop_id: ShopId,
    pub payload: Payload,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn text(message_id: &str, shop_id: ShopId, body: &str) -> Self {
        Self {
            message_id: message_id.to_string(),
            shop_id,
            payload: Payload::Text(body.to_string()),
            received_at: Utc::now(),
        }
    }
}
