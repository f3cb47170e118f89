//! Intent models

use rust_decimal::Decimal;
use serde::Deserialize;

use super::transaction::TransactionKind;

/// Closed set of things an inbound utterance can mean
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Sale,
    Expense,
    CashAdjustment,
    BalanceQuery,
    Search {
        keyword: String,
        kind: Option<TransactionKind>,
    },
    Correction(CorrectionReply),
    Greeting,
    Unknown,
}

impl Intent {
    pub fn is_transactional(&self) -> bool {
        matches!(self, Intent::Sale | Intent::Expense | Intent::CashAdjustment)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Intent::Sale => "SALE",
            Intent::Expense => "EXPENSE",
            Intent::CashAdjustment => "CASH_ADJUSTMENT",
            Intent::BalanceQuery => "BALANCE_QUERY",
            Intent::Search { .. } => "SEARCH",
            Intent::Correction(_) => "CORRECTION",
            Intent::Greeting => "GREETING",
            Intent::Unknown => "UNKNOWN",
        }
    }
}

/// Short reply to a pending confirmation or a just-committed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionReply {
    Affirm,
    Reject,
    Kind(TransactionKind),
}

/// What the classifier needs to know about the conversation so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversationContext {
    pub has_pending_confirmation: bool,
    pub has_recent_commit: bool,
}

/// Intent plus how sure the classifier is about it
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    /// 1.0 for rule matches, the model's own score for fallback guesses
    pub confidence: f64,
}

impl Classification {
    pub fn by_rule(intent: Intent) -> Self {
        Self {
            intent,
            confidence: 1.0,
        }
    }
}

/// Structured fields pulled out of a transactional utterance
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub description: String,
    pub confidence: f64,
}

/// Raw answer of the structured-extraction service
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelGuess {
    pub intent: String,
    pub confidence: f64,
    #[serde(default)]
    pub keyword: Option<String>,
}
