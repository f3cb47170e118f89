use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client as HttpClient;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::models::{MediaInfo, OutgoingTextMessage, TokenResponse};
use crate::api::error::ApiError;
use crate::models::{Media, ShopId};
use crate::traits::{MediaSource, MessageSender};
use crate::utils::errors::DeliveryError;
use crate::utils::ratelimit::SlidingWindowLimiter;

const GRAPH_VERSION: &str = "v18.0";

/// App credentials used to mint a new access token when the current one expires
#[derive(Debug, Clone)]
pub struct WhatsAppCredentials {
    pub app_id: String,
    pub app_secret: String,
}

/// WhatsApp Cloud API client (Meta Graph API)
pub struct WhatsAppClient {
    http_client: HttpClient,
    base_url: String,
    phone_number_id: String,
    access_token: RwLock<String>,
    credentials: Option<WhatsAppCredentials>,
    limiter: SlidingWindowLimiter,
}

impl WhatsAppClient {
    const DEFAULT_BASE_URL: &'static str = "https://graph.facebook.com";

    pub fn new(
        phone_number_id: String,
        access_token: String,
        credentials: Option<WhatsAppCredentials>,
        requests_per_second: usize,
    ) -> Self {
        Self::with_base_url(
            Self::DEFAULT_BASE_URL.to_string(),
            phone_number_id,
            access_token,
            credentials,
            requests_per_second,
        )
    }

    /// Create a new client with custom base URL (for testing)
    pub fn with_base_url(
        base_url: String,
        phone_number_id: String,
        access_token: String,
        credentials: Option<WhatsAppCredentials>,
        requests_per_second: usize,
    ) -> Self {
        Self {
            http_client: HttpClient::new(),
            base_url,
            phone_number_id,
            access_token: RwLock::new(access_token),
            credentials,
            limiter: SlidingWindowLimiter::per_second("whatsapp", requests_per_second),
        }
    }

    fn create_headers(token: &str) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| ApiError::RequestError(format!("Failed to create auth header: {}", e)))?;
        headers.insert(AUTHORIZATION, auth_value);
        Ok(headers)
    }

    /// POST /{phone_number_id}/messages
    pub async fn send_text(&self, to: &str, body: &str) -> Result<(), ApiError> {
        let url = format!(
            "{}/{}/{}/messages",
            self.base_url, GRAPH_VERSION, self.phone_number_id
        );
        let message = OutgoingTextMessage::new(to, body);

        self.send_authorized(|headers| self.http_client.post(&url).headers(headers).json(&message))
            .await?;
        debug!("Sent {} chars to {}", body.chars().count(), to);
        Ok(())
    }

    /// GET /{media_id} for the download URL, then the bytes behind it
    pub async fn download_media(&self, media_id: &str) -> Result<Media, ApiError> {
        let url = format!("{}/{}/{}", self.base_url, GRAPH_VERSION, media_id);
        let info = self
            .send_authorized(|headers| self.http_client.get(&url).headers(headers))
            .await?
            .json::<MediaInfo>()
            .await
            .map_err(|e| ApiError::DeserializationError(format!("Failed to parse response: {}", e)))?;

        let bytes = self
            .send_authorized(|headers| self.http_client.get(&info.url).headers(headers))
            .await?
            .bytes()
            .await?;
        debug!("Downloaded media {} ({} bytes, {})", media_id, bytes.len(), info.mime_type);

        Ok(Media {
            bytes: bytes.to_vec(),
            mime_type: info.mime_type,
        })
    }

    /// GET /oauth/access_token with the app's client credentials
    pub async fn refresh_token(&self) -> Result<(), ApiError> {
        let Some(credentials) = &self.credentials else {
            return Err(ApiError::Unauthorized(
                "access token rejected and no app credentials to refresh it".to_string(),
            ));
        };

        let url = format!("{}/oauth/access_token", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("grant_type", "client_credentials"),
                ("client_id", credentials.app_id.as_str()),
                ("client_secret", credentials.app_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await);
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| ApiError::DeserializationError(format!("Failed to parse response: {}", e)))?;
        *self.access_token.write().await = token.access_token;
        info!("🔑 WhatsApp access token refreshed");
        Ok(())
    }

    /// Send with the current token. A 401 refreshes the token and retries once.
    async fn send_authorized<F>(&self, build: F) -> Result<reqwest::Response, ApiError>
    where
        F: Fn(HeaderMap) -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut refreshed = false;
        loop {
            self.limiter.acquire().await;
            let token = self.access_token.read().await.clone();
            let response = build(Self::create_headers(&token)?).send().await?;
            if response.status().is_success() {
                return Ok(response);
            }

            let error = ApiError::from_response(response).await;
            if matches!(error, ApiError::Unauthorized(_)) && !refreshed && self.credentials.is_some() {
                warn!("WhatsApp rejected the access token, refreshing");
                self.refresh_token().await?;
                refreshed = true;
                continue;
            }
            return Err(error);
        }
    }
}

#[async_trait]
impl MessageSender for WhatsAppClient {
    async fn send(&self, shop_id: &ShopId, text: &str) -> Result<(), DeliveryError> {
        if shop_id.as_str().is_empty() {
            return Err(DeliveryError::InvalidRecipient(shop_id.to_string()));
        }
        self.send_text(shop_id.as_str(), text).await?;
        Ok(())
    }
}

#[async_trait]
impl MediaSource for WhatsAppClient {
    async fn fetch(&self, media_id: &str) -> Result<Media, ApiError> {
        self.download_media(media_id).await
    }
}
