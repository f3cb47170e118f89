//! Data models shared by the pipeline, the ledger and the webhook host
//!
//! Each model is plain data. Behavior that needs collaborators lives in `services`.

pub mod balance;
pub mod intent;
pub mod message;
pub mod outcome;
pub mod transaction;

// Re-export commonly used types for convenience
pub use balance::ShopAccount;
pub use intent::{
    Classification, ConversationContext, CorrectionReply, ExtractionResult, Intent, ModelGuess,
};
pub use message::{InboundMessage, InputSource, Media, Payload};
pub use outcome::{ClarifyReason, CommitPath, FailureReason, Outcome};
pub use transaction::{ShopId, Transaction, TransactionDraft, TransactionKind};
