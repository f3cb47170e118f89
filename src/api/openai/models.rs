use serde::{Deserialize, Serialize};

/// Body of POST /chat/completions
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: &str) -> Self {
        Self {
            role: "system",
            content: MessageContent::Text(text.to_string()),
        }
    }

    pub fn user(text: &str) -> Self {
        Self {
            role: "user",
            content: MessageContent::Text(text.to_string()),
        }
    }

    /// User turn carrying a prompt and an inline image
    pub fn user_with_image(text: &str, data_url: String) -> Self {
        Self {
            role: "user",
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: text.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: data_url },
                },
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Response from POST /chat/completions
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatReply,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    pub content: Option<String>,
}

impl ChatResponse {
    /// Text of the first choice, if any
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
    }
}

/// Response from POST /audio/transcriptions
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionResponse {
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_image_message_serializes_as_content_parts() {
        let message = ChatMessage::user_with_image("Lee este ticket", "data:image/jpeg;base64,AAAA".to_string());
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "Lee este ticket"},
                    {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,AAAA"}}
                ]
            })
        );
    }

    #[test]
    fn test_plain_message_serializes_as_string() {
        let value = serde_json::to_value(ChatMessage::system("hola")).unwrap();
        assert_eq!(value, json!({"role": "system", "content": "hola"}));
    }

    #[test]
    fn test_first_content() {
        let response: ChatResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "{\"intent\": \"SALE\"}"}}]
        }))
        .unwrap();
        assert_eq!(response.first_content(), Some("{\"intent\": \"SALE\"}"));

        let empty: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert_eq!(empty.first_content(), None);
    }
}
