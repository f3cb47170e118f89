//! Transaction models

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::errors::LedgerError;
use crate::utils::normalize::truncate_chars;

/// Longest description the ledger will store
pub const MAX_DESCRIPTION_CHARS: usize = 120;

/// Largest amount the `DECIMAL(12, 2)` column holds: 9999999999.99
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

/// Stable merchant key derived from the sender's phone number
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShopId(String);

impl ShopId {
    /// Build a shop id from a raw sender such as `whatsapp:+52 55 1234 5678`.
    /// Returns `None` when the sender carries no digits at all.
    pub fn from_phone(raw: &str) -> Option<Self> {
        let digits: String = raw
            .trim()
            .trim_start_matches("whatsapp:")
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();

        if digits.is_empty() {
            None
        } else {
            Some(ShopId(digits))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Sale,
    Expense,
    CashIn,
    CashOut,
}

impl TransactionKind {
    /// +1 for money coming into the till, -1 for money leaving it
    pub fn sign(self) -> Decimal {
        match self {
            TransactionKind::Sale | TransactionKind::CashIn => Decimal::ONE,
            TransactionKind::Expense | TransactionKind::CashOut => Decimal::NEGATIVE_ONE,
        }
    }

    /// Code used in the `kind` column
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Sale => "SALE",
            TransactionKind::Expense => "EXPENSE",
            TransactionKind::CashIn => "CASH_IN",
            TransactionKind::CashOut => "CASH_OUT",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "SALE" => Some(TransactionKind::Sale),
            "EXPENSE" => Some(TransactionKind::Expense),
            "CASH_IN" => Some(TransactionKind::CashIn),
            "CASH_OUT" => Some(TransactionKind::CashOut),
            _ => None,
        }
    }

    /// Label shown to shop owners
    pub fn label(self) -> &'static str {
        match self {
            TransactionKind::Sale => "VENTA",
            TransactionKind::Expense => "GASTO",
            TransactionKind::CashIn => "ENTRADA DE CAJA",
            TransactionKind::CashOut => "SALIDA DE CAJA",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transaction the ledger has not stored yet (no id, no timestamp)
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionDraft {
    pub shop_id: ShopId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub description: String,
    pub currency: String,
    pub reverses: Option<Uuid>,
    pub source_message_id: Option<String>,
}

impl TransactionDraft {
    pub fn new(
        shop_id: ShopId,
        kind: TransactionKind,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        let description: String = description.into();
        Self {
            shop_id,
            kind,
            amount: amount.round_dp(2),
            description: truncate_chars(description.trim(), MAX_DESCRIPTION_CHARS),
            currency: "MXN".to_string(),
            reverses: None,
            source_message_id: None,
        }
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_uppercase();
        self
    }

    pub fn with_source(mut self, message_id: Option<String>) -> Self {
        self.source_message_id = message_id;
        self
    }

    /// Enforce the ledger invariants before anything touches the store
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount <= Decimal::ZERO {
            return Err(LedgerError::Rejected(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        if self.amount > MAX_AMOUNT {
            return Err(LedgerError::Rejected(format!(
                "amount {} exceeds {}",
                self.amount, MAX_AMOUNT
            )));
        }
        if self.description.trim().is_empty() {
            return Err(LedgerError::Rejected("description is empty".to_string()));
        }
        Ok(())
    }
}

/// A stored ledger record. Never edited after it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub shop_id: ShopId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub description: String,
    pub currency: String,
    /// Set on compensating records: the id of the transaction being cancelled
    pub reverses: Option<Uuid>,
    pub source_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn from_draft(draft: TransactionDraft, id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            shop_id: draft.shop_id,
            kind: draft.kind,
            amount: draft.amount,
            description: draft.description,
            currency: draft.currency,
            reverses: draft.reverses,
            source_message_id: draft.source_message_id,
            created_at,
        }
    }

    /// Contribution of this record to the running balance
    pub fn signed_amount(&self) -> Decimal {
        let signed = self.kind.sign() * self.amount;
        if self.is_reversal() {
            -signed
        } else {
            signed
        }
    }

    pub fn is_reversal(&self) -> bool {
        self.reverses.is_some()
    }

    /// Draft of the record that cancels this one
    pub fn reversal_draft(&self) -> TransactionDraft {
        TransactionDraft {
            shop_id: self.shop_id.clone(),
            kind: self.kind,
            amount: self.amount,
            description: truncate_chars(
                &format!("corrección: {}", self.description),
                MAX_DESCRIPTION_CHARS,
            ),
            currency: self.currency.clone(),
            reverses: Some(self.id),
            source_message_id: self.source_message_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn shop() -> ShopId {
        ShopId::from_phone("5215512345678").unwrap()
    }

    #[test]
    fn test_shop_id_keeps_only_digits() {
        let id = ShopId::from_phone("whatsapp:+52 1 55 1234 5678").unwrap();
        assert_eq!(id.as_str(), "5215512345678");
        assert!(ShopId::from_phone("whatsapp:").is_none());
    }

    #[test]
    fn test_draft_validation() {
        let ok = TransactionDraft::new(shop(), TransactionKind::Sale, Decimal::from(45), "3 coca colas");
        assert!(ok.validate().is_ok());

        let negative = TransactionDraft::new(shop(), TransactionKind::Sale, Decimal::from(-10), "x");
        assert!(matches!(negative.validate(), Err(LedgerError::Rejected(_))));

        let empty = TransactionDraft::new(shop(), TransactionKind::Sale, Decimal::from(10), "   ");
        assert!(matches!(empty.validate(), Err(LedgerError::Rejected(_))));

        assert_eq!(MAX_AMOUNT.to_string(), "9999999999.99");
        let largest = TransactionDraft::new(shop(), TransactionKind::Sale, MAX_AMOUNT, "x");
        assert!(largest.validate().is_ok());
        let oversize = TransactionDraft::new(shop(), TransactionKind::Sale, MAX_AMOUNT + Decimal::ONE, "x");
        assert!(matches!(oversize.validate(), Err(LedgerError::Rejected(_))));
    }

    #[test]
    fn test_reversal_flips_sign() {
        let draft = TransactionDraft::new(
            shop(),
            TransactionKind::Expense,
            Decimal::from_str("75.25").unwrap(),
            "mercancía",
        );
        let original = Transaction::from_draft(draft, Uuid::new_v4(), Utc::now());
        assert_eq!(original.signed_amount(), Decimal::from_str("-75.25").unwrap());

        let reversal = Transaction::from_draft(original.reversal_draft(), Uuid::new_v4(), Utc::now());
        assert_eq!(reversal.reverses, Some(original.id));
        assert_eq!(reversal.signed_amount(), Decimal::from_str("75.25").unwrap());
        assert!(reversal.description.starts_with("corrección"));
    }

    #[test]
    fn test_kind_codes() {
        for kind in [
            TransactionKind::Sale,
            TransactionKind::Expense,
            TransactionKind::CashIn,
            TransactionKind::CashOut,
        ] {
            assert_eq!(TransactionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(TransactionKind::parse("venta"), None);
    }
}
