use serde::{Deserialize, Serialize};

/// Body of POST /{phone_number_id}/messages for a plain text reply
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingTextMessage<'a> {
    pub messaging_product: &'static str,
    pub recipient_type: &'static str,
    pub to: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: TextBody<'a>,
}

impl<'a> OutgoingTextMessage<'a> {
    pub fn new(to: &'a str, body: &'a str) -> Self {
        Self {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to,
            kind: "text",
            text: TextBody {
                preview_url: false,
                body,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TextBody<'a> {
    pub preview_url: bool,
    pub body: &'a str,
}

/// Response from GET /{media_id}
#[derive(Debug, Clone, Deserialize)]
pub struct MediaInfo {
    pub url: String,
    pub mime_type: String,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// Response from GET /oauth/access_token
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}
