//! Pipeline outcome models
//!
//! `handle_inbound_message` always ends in exactly one `Outcome`. The response
//! composer turns it into the reply text, so nothing here knows about wording.

use rust_decimal::Decimal;

use super::balance::ShopAccount;
use super::transaction::{Transaction, TransactionDraft, TransactionKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPath {
    /// Confidence cleared the threshold on the first message
    Direct,
    /// Owner answered "sí" to a pending confirmation
    Confirmed,
    /// Owner answered with the other kind to a pending confirmation
    KindCorrected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClarifyReason {
    NoAmount,
    UnknownIntent,
    EmptyMessage,
    NothingPending,
    /// Ticket photo had no number that could be a total
    UnreadableTicket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Transcription,
    Vision,
    MediaDownload,
    ExtractionService,
    /// `pending_kept` is true when the candidate is still waiting for a retry
    StoreUnavailable { pending_kept: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Committed {
        transaction: Transaction,
        /// `None` when the balance could not be read back after the write
        account: Option<ShopAccount>,
        path: CommitPath,
    },
    AwaitingConfirmation {
        candidate: TransactionDraft,
        confidence: f64,
        from_ticket: bool,
    },
    Corrected {
        reversal: Transaction,
        replacement: Option<Transaction>,
        account: Option<ShopAccount>,
    },
    Discarded {
        candidate: TransactionDraft,
    },
    Balance {
        account: ShopAccount,
    },
    SearchResults {
        keyword: String,
        kind: Option<TransactionKind>,
        transactions: Vec<Transaction>,
    },
    Greeting,
    Clarify(ClarifyReason),
    Failed(FailureReason),
    /// Message id was already handled; nothing to reply
    Duplicate,
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    /// Net balance effect of the records this outcome wrote
    pub fn ledger_delta(&self) -> Decimal {
        match self {
            Outcome::Committed { transaction, .. } => transaction.signed_amount(),
            Outcome::Corrected {
                reversal,
                replacement,
                ..
            } => {
                reversal.signed_amount()
                    + replacement
                        .as_ref()
                        .map(Transaction::signed_amount)
                        .unwrap_or(Decimal::ZERO)
            }
            _ => Decimal::ZERO,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Committed { .. } => "committed",
            Outcome::AwaitingConfirmation { .. } => "awaiting_confirmation",
            Outcome::Corrected { .. } => "corrected",
            Outcome::Discarded { .. } => "discarded",
            Outcome::Balance { .. } => "balance",
            Outcome::SearchResults { .. } => "search_results",
            Outcome::Greeting => "greeting",
            Outcome::Clarify(_) => "clarify",
            Outcome::Failed(_) => "failed",
            Outcome::Duplicate => "duplicate",
        }
    }
}
