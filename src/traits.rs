//! Capabilities the pipeline consumes. Production implementations live in
//! `api` and `db`; tests swap in fakes.

use async_trait::async_trait;

use crate::api::error::ApiError;
use crate::models::{ConversationContext, Media, ModelGuess, ShopId, Transaction};
use crate::utils::errors::{
    DeliveryError, ExtractionServiceError, LedgerError, TranscriptionError, VisionError,
};

#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &Media) -> Result<String, TranscriptionError>;
}

#[async_trait]
pub trait ImageToText: Send + Sync {
    async fn read_text(&self, image: &Media) -> Result<String, VisionError>;
}

/// Hosted model asked for an intent when no rule matched
#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    async fn guess_intent(
        &self,
        text: &str,
        context: &ConversationContext,
    ) -> Result<ModelGuess, ExtractionServiceError>;
}

/// Append-only transaction log keyed by shop
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persist every record of the batch or none of them
    async fn append(&self, batch: &[Transaction]) -> Result<(), LedgerError>;

    /// All records of a shop, oldest first
    async fn query(&self, shop_id: &ShopId) -> Result<Vec<Transaction>, LedgerError>;
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, shop_id: &ShopId, text: &str) -> Result<(), DeliveryError>;
}

/// Fetches the bytes behind a provider media id
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn fetch(&self, media_id: &str) -> Result<Media, ApiError>;
}
