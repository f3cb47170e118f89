//! Error taxonomy for the message pipeline
//!
//! Each collaborator gets its own error type so the pipeline can turn a
//! failure into the matching reply without string matching.

use std::time::Duration;

use thiserror::Error;

use crate::api::error::ApiError;

/// Errors that may go away if the same call is made again
pub trait Transient {
    fn is_transient(&self) -> bool;

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("Speech-to-text service failed: {0}")]
    Service(#[from] ApiError),
    #[error("Transcript is empty")]
    Empty,
}

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Image-to-text service failed: {0}")]
    Service(#[from] ApiError),
    #[error("No text found in image")]
    Empty,
}

#[derive(Debug, Error)]
pub enum ExtractionServiceError {
    #[error("Structured extraction service failed: {0}")]
    Service(#[from] ApiError),
    #[error("Malformed model answer: {0}")]
    Malformed(String),
}

/// Local field extraction failures. Never retried.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("No amount found in message")]
    NoAmountFound,
    #[error("Intent does not describe a transaction")]
    NotTransactional,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Transaction store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Transaction rejected: {0}")]
    Rejected(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if is_permanent_db_error(db.kind(), db.code().as_deref()) => {
                LedgerError::Rejected(db.message().to_string())
            }
            _ => LedgerError::StoreUnavailable(e.to_string()),
        }
    }
}

/// Constraint and data errors fail the same way on every retry.
/// SQLSTATE class 22 is a data exception, class 23 an integrity violation.
fn is_permanent_db_error(kind: sqlx::error::ErrorKind, sqlstate: Option<&str>) -> bool {
    use sqlx::error::ErrorKind;

    match kind {
        ErrorKind::UniqueViolation
        | ErrorKind::ForeignKeyViolation
        | ErrorKind::NotNullViolation
        | ErrorKind::CheckViolation => true,
        _ => sqlstate.map_or(false, |code| code.starts_with("22") || code.starts_with("23")),
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Messaging API failed: {0}")]
    Api(#[from] ApiError),
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
}

impl Transient for ApiError {
    fn is_transient(&self) -> bool {
        ApiError::is_transient(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        ApiError::retry_after(self)
    }
}

impl Transient for TranscriptionError {
    fn is_transient(&self) -> bool {
        matches!(self, TranscriptionError::Service(e) if e.is_transient())
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            TranscriptionError::Service(e) => e.retry_after(),
            TranscriptionError::Empty => None,
        }
    }
}

impl Transient for VisionError {
    fn is_transient(&self) -> bool {
        matches!(self, VisionError::Service(e) if e.is_transient())
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            VisionError::Service(e) => e.retry_after(),
            VisionError::Empty => None,
        }
    }
}

impl Transient for ExtractionServiceError {
    fn is_transient(&self) -> bool {
        matches!(self, ExtractionServiceError::Service(e) if e.is_transient())
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ExtractionServiceError::Service(e) => e.retry_after(),
            ExtractionServiceError::Malformed(_) => None,
        }
    }
}

impl Transient for LedgerError {
    fn is_transient(&self) -> bool {
        matches!(self, LedgerError::StoreUnavailable(_))
    }
}

impl Transient for DeliveryError {
    fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::Api(e) if e.is_transient())
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            DeliveryError::Api(e) => e.retry_after(),
            DeliveryError::InvalidRecipient(_) => None,
        }
    }
}
