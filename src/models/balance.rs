//! Balance models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::transaction::{ShopId, Transaction, TransactionKind};

/// Running totals for one shop, always derived from its transaction log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShopAccount {
    pub shop_id: ShopId,
    pub balance: Decimal,
    pub total_sales: Decimal,
    pub total_expenses: Decimal,
    /// Net cash put in minus cash taken out
    pub total_adjustments: Decimal,
    /// Average daily net outflow over the trailing window
    pub burn_rate: Decimal,
    pub transaction_count: usize,
    pub last_activity: Option<DateTime<Utc>>,
}

impl ShopAccount {
    pub fn empty(shop_id: ShopId) -> Self {
        Self {
            shop_id,
            balance: Decimal::ZERO,
            total_sales: Decimal::ZERO,
            total_expenses: Decimal::ZERO,
            total_adjustments: Decimal::ZERO,
            burn_rate: Decimal::ZERO,
            transaction_count: 0,
            last_activity: None,
        }
    }

    /// Fold a shop's log, oldest first. `burn_rate` is left at zero.
    pub fn fold<'a>(shop_id: ShopId, transactions: impl IntoIterator<Item = &'a Transaction>) -> Self {
        let mut account = Self::empty(shop_id);
        for transaction in transactions {
            account.apply(transaction);
        }
        account
    }

    pub fn apply(&mut self, transaction: &Transaction) {
        let signed = transaction.signed_amount();
        self.balance += signed;

        match transaction.kind {
            TransactionKind::Sale => self.total_sales += signed,
            TransactionKind::Expense => self.total_expenses -= signed,
            TransactionKind::CashIn | TransactionKind::CashOut => self.total_adjustments += signed,
        }

        self.transaction_count += 1;
        if self.last_activity.map_or(true, |last| transaction.created_at > last) {
            self.last_activity = Some(transaction.created_at);
        }
    }

    /// Days the current balance lasts at the current burn rate
    pub fn runway_days(&self) -> Option<Decimal> {
        if self.burn_rate > Decimal::ZERO {
            Some((self.balance.max(Decimal::ZERO) / self.burn_rate).round_dp(1))
        } else {
            None
        }
    }
}
