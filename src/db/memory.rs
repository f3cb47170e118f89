//! In-process transaction store for development and tests

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::{ShopId, Transaction};
use crate::traits::TransactionStore;
use crate::utils::errors::LedgerError;

#[derive(Default)]
pub struct MemoryStore {
    shops: RwLock<HashMap<ShopId, Vec<Transaction>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across every shop
    pub async fn len(&self) -> usize {
        self.shops.read().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn append(&self, batch: &[Transaction]) -> Result<(), LedgerError> {
        let mut shops = self.shops.write().await;
        for transaction in batch {
            let log = shops.entry(transaction.shop_id.clone()).or_default();
            // a retried batch must not land twice
            if log.iter().any(|t| t.id == transaction.id) {
                continue;
            }
            log.push(transaction.clone());
        }
        Ok(())
    }

    async fn query(&self, shop_id: &ShopId) -> Result<Vec<Transaction>, LedgerError> {
        let shops = self.shops.read().await;
        let mut log = shops.get(shop_id).cloned().unwrap_or_default();
        // insertion order breaks created_at ties
        log.sort_by_key(|t| t.created_at);
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TransactionDraft, TransactionKind};
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_query_is_per_shop_and_ascending() {
        let store = MemoryStore::new();
        let a = ShopId::from_phone("111").unwrap();
        let b = ShopId::from_phone("222").unwrap();
        let now = Utc::now();

        let later = Transaction::from_draft(
            TransactionDraft::new(a.clone(), TransactionKind::Sale, Decimal::from(10), "later"),
            Uuid::new_v4(),
            now,
        );
        let earlier = Transaction::from_draft(
            TransactionDraft::new(a.clone(), TransactionKind::Sale, Decimal::from(5), "earlier"),
            Uuid::new_v4(),
            now - Duration::hours(1),
        );
        let other = Transaction::from_draft(
            TransactionDraft::new(b.clone(), TransactionKind::Expense, Decimal::from(7), "other"),
            Uuid::new_v4(),
            now,
        );

        store.append(&[later.clone(), other]).await.unwrap();
        store.append(&[earlier.clone()]).await.unwrap();
        store.append(&[earlier.clone()]).await.unwrap();

        let log = store.query(&a).await.unwrap();
        assert_eq!(log, vec![earlier, later]);
        assert_eq!(store.query(&b).await.unwrap().len(), 1);
        assert_eq!(store.len().await, 3);
    }
}
