use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::Client as HttpClient;
use tracing::{debug, warn};

use super::models::{ChatMessage, ChatRequest, ChatResponse, TranscriptionResponse};
use crate::api::error::ApiError;
use crate::models::{ConversationContext, Media, ModelGuess};
use crate::traits::{ImageToText, SpeechToText, StructuredExtractor};
use crate::utils::errors::{ExtractionServiceError, TranscriptionError, VisionError};

const TRANSCRIPTION_MODEL: &str = "whisper-1";
const CHAT_MODEL: &str = "gpt-4o";

const TICKET_PROMPT: &str = "Eres un lector de tickets de compra de tiendas mexicanas. \
Transcribe el texto del ticket tal como aparece, una línea por renglón, \
incluyendo el nombre de la tienda y la línea del TOTAL. \
No expliques nada. Si la imagen no es un ticket responde solo: null";

const INTENT_PROMPT: &str = "Clasificas mensajes de dueños de tienditas mexicanas que llevan sus cuentas por WhatsApp.

Intenciones posibles:
- SALE: registró una venta (\"vendí 3 refrescos a 10\")
- EXPENSE: registró un gasto o compra (\"pagué 80 de luz\")
- CASH_ADJUSTMENT: metió o sacó dinero de la caja (\"empiezo con 500\", \"saqué 150\")
- BALANCE_QUERY: pregunta por su saldo o cómo va
- SEARCH: busca movimientos por una palabra; pon esa palabra en keyword
- GREETING: saludo sin nada más
- UNKNOWN: cualquier otra cosa

Responde SOLO con JSON, sin markdown:
{\"intent\": \"SALE\", \"confidence\": 0.9, \"keyword\": null}

La confianza va de 0.0 a 1.0. Si dudas, usa 0.3 a 0.6.";

/// OpenAI client for transcription, ticket reading and intent guesses
pub struct OpenAiClient {
    http_client: HttpClient,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, Self::DEFAULT_BASE_URL.to_string())
    }

    /// Create a new client with custom base URL (for testing)
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            base_url,
        }
    }

    fn create_headers(&self) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| ApiError::RequestError(format!("Failed to create auth header: {}", e)))?;
        headers.insert(AUTHORIZATION, auth_value);
        Ok(headers)
    }

    /// POST /audio/transcriptions (Spanish)
    pub async fn transcribe_audio(&self, audio: &Media) -> Result<String, ApiError> {
        let url = format!("{}/audio/transcriptions", self.base_url);
        let file = Part::bytes(audio.bytes.clone())
            .file_name(audio_file_name(&audio.mime_type))
            .mime_str(base_mime(&audio.mime_type))?;
        let form = Form::new()
            .part("file", file)
            .text("model", TRANSCRIPTION_MODEL)
            .text("language", "es");

        let response = self
            .http_client
            .post(&url)
            .headers(self.create_headers()?)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await);
        }

        let transcription = response
            .json::<TranscriptionResponse>()
            .await
            .map_err(|e| ApiError::DeserializationError(format!("Failed to parse response: {}", e)))?;
        debug!("Transcribed {} bytes of audio", audio.bytes.len());
        Ok(transcription.text)
    }

    /// Vision model reads the ticket text out of a photo
    pub async fn read_ticket(&self, image: &Media) -> Result<String, ApiError> {
        let data_url = format!(
            "data:{};base64,{}",
            base_mime(&image.mime_type),
            STANDARD.encode(&image.bytes)
        );
        let request = ChatRequest {
            model: CHAT_MODEL.to_string(),
            messages: vec![
                ChatMessage::system(TICKET_PROMPT),
                ChatMessage::user_with_image("Lee este ticket de compra:", data_url),
            ],
            temperature: 0.1,
            max_tokens: 600,
        };
        self.chat(&request).await
    }

    /// POST /chat/completions, returning the first choice's text
    pub async fn chat(&self, request: &ChatRequest) -> Result<String, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .headers(self.create_headers()?)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await);
        }

        let chat = response
            .json::<ChatResponse>()
            .await
            .map_err(|e| ApiError::DeserializationError(format!("Failed to parse response: {}", e)))?;
        Ok(chat.first_content().unwrap_or_default().trim().to_string())
    }
}

#[async_trait]
impl SpeechToText for OpenAiClient {
    async fn transcribe(&self, audio: &Media) -> Result<String, TranscriptionError> {
        let text = self.transcribe_audio(audio).await?;
        if text.trim().is_empty() {
            return Err(TranscriptionError::Empty);
        }
        Ok(text)
    }
}

#[async_trait]
impl ImageToText for OpenAiClient {
    async fn read_text(&self, image: &Media) -> Result<String, VisionError> {
        let text = self.read_ticket(image).await?;
        if text.is_empty() || text.eq_ignore_ascii_case("null") {
            return Err(VisionError::Empty);
        }
        Ok(text)
    }
}

#[async_trait]
impl StructuredExtractor for OpenAiClient {
    async fn guess_intent(
        &self,
        text: &str,
        context: &ConversationContext,
    ) -> Result<ModelGuess, ExtractionServiceError> {
        let mut user_prompt = format!("Mensaje: '{}'", text);
        if context.has_pending_confirmation {
            user_prompt.push_str("\n(Hay una transacción esperando confirmación.)");
        }
        let request = ChatRequest {
            model: CHAT_MODEL.to_string(),
            messages: vec![ChatMessage::system(INTENT_PROMPT), ChatMessage::user(&user_prompt)],
            temperature: 0.1,
            max_tokens: 100,
        };

        let content = self.chat(&request).await?;
        parse_guess(&content)
    }
}

/// Models sometimes wrap the JSON in prose or markdown; read the outermost object
fn parse_guess(content: &str) -> Result<ModelGuess, ExtractionServiceError> {
    let json = match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => content,
    };
    serde_json::from_str::<ModelGuess>(json).map_err(|e| {
        warn!("Unreadable intent guess {:?}: {}", content, e);
        ExtractionServiceError::Malformed(e.to_string())
    })
}

fn base_mime(mime_type: &str) -> &str {
    mime_type.split(';').next().unwrap_or(mime_type).trim()
}

fn audio_file_name(mime_type: &str) -> &'static str {
    match base_mime(mime_type) {
        "audio/mpeg" => "audio.mp3",
        "audio/mp4" | "audio/aac" => "audio.m4a",
        "audio/amr" => "audio.amr",
        "audio/wav" | "audio/x-wav" => "audio.wav",
        _ => "audio.ogg",
    }
}
