//! HTTP error type shared by every outbound API client

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Delay used when a 429 carries no usable Retry-After
const DEFAULT_RETRY_AFTER_MS: u64 = 1000;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    /// 400 Bad Request
    #[error("Bad Request: {0}")]
    BadRequest(String),
    /// 401 Unauthorized
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// 403 Forbidden
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// 404 Not Found
    #[error("Not Found: {0}")]
    NotFound(String),
    /// 429 Too Many Requests
    #[error("Rate Limited. Retry after {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },
    /// 5xx Server Error
    #[error("Server Error ({0}): {1}")]
    ServerError(u16, String),
    /// Other HTTP errors
    #[error("HTTP Error ({0}): {1}")]
    HttpError(u16, String),
    /// Network/request error
    #[error("Request Error: {0}")]
    RequestError(String),
    /// Deserialization error
    #[error("Deserialization Error: {0}")]
    DeserializationError(String),
}

impl ApiError {
    /// Worth retrying with the same request
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimited { .. } | ApiError::ServerError(..) | ApiError::RequestError(_)
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::RateLimited { retry_after_ms } => Some(Duration::from_millis(*retry_after_ms)),
            _ => None,
        }
    }

    /// Map a non-success response to an error
    pub async fn from_response(response: reqwest::Response) -> ApiError {
        let status = response.status().as_u16();
        let retry_after_header = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        let body_text = response.text().await.unwrap_or_default();

        Self::from_parts(status, retry_after_header, body_text)
    }

    /// Status code, Retry-After seconds and body to error
    pub fn from_parts(status: u16, retry_after_secs: Option<u64>, body_text: String) -> ApiError {
        match status {
            400 => ApiError::BadRequest(error_message(&body_text)),
            401 => ApiError::Unauthorized(error_message(&body_text)),
            403 => ApiError::Forbidden(error_message(&body_text)),
            404 => ApiError::NotFound(error_message(&body_text)),
            429 => {
                let retry_after_ms = retry_after_secs
                    .map(|secs| secs * 1000)
                    .unwrap_or(DEFAULT_RETRY_AFTER_MS);
                warn!("Rate limited, retry after {} ms", retry_after_ms);
                ApiError::RateLimited { retry_after_ms }
            }
            500..=599 => {
                warn!("Server error {}: {}", status, body_text);
                ApiError::ServerError(status, body_text)
            }
            _ => ApiError::HttpError(status, body_text),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::DeserializationError(e.to_string())
        } else {
            ApiError::RequestError(format!("Request failed: {}", e))
        }
    }
}

/// Pull `error.message` (Graph and OpenAI) or `message` out of a JSON body
fn error_message(body_text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body_text)
        .ok()
        .and_then(|json| {
            json.pointer("/error/message")
                .or_else(|| json.get("message"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body_text.to_string())
}
