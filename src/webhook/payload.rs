//! Meta WhatsApp Business webhook payloads

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    pub field: String,
    #[serde(default)]
    pub value: ChangeValue,
}

/// Only `messages` matters; delivery statuses and contacts are ignored
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messages: Vec<WebhookMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMessage {
    pub id: String,
    pub from: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextContent>,
    #[serde(default)]
    pub audio: Option<MediaRef>,
    #[serde(default)]
    pub image: Option<MediaRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextContent {
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaRef {
    pub id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// What a message carries before any media is downloaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    Audio { media_id: String },
    Image { media_id: String },
}

impl WebhookPayload {
    /// Inbound messages of a WhatsApp Business payload, in delivery order
    pub fn messages(&self) -> Vec<&WebhookMessage> {
        if self.object != "whatsapp_business_account" {
            return Vec::new();
        }
        self.entry
            .iter()
            .flat_map(|entry| &entry.changes)
            .filter(|change| change.field == "messages")
            .flat_map(|change| &change.value.messages)
            .collect()
    }
}

impl WebhookMessage {
    /// `None` for message types the bot does not read (stickers, locations, ...)
    pub fn content(&self) -> Option<MessageContent> {
        match self.kind.as_str() {
            "text" => self
                .text
                .as_ref()
                .map(|text| MessageContent::Text(text.body.clone())),
            "audio" => self.audio.as_ref().map(|audio| MessageContent::Audio {
                media_id: audio.id.clone(),
            }),
            "image" => self.image.as_ref().map(|image| MessageContent::Image {
                media_id: image.id.clone(),
            }),
            _ => None,
        }
    }

    /// Provider timestamp (unix seconds), if it parses
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        let seconds = self.timestamp.as_deref()?.parse::<i64>().ok()?;
        Utc.timestamp_opt(seconds, 0).single()
    }
}
