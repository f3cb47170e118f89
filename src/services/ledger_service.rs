use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Days, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{ShopAccount, ShopId, Transaction, TransactionDraft, TransactionKind};
use crate::traits::TransactionStore;
use crate::utils::clock::Clock;
use crate::utils::errors::LedgerError;
use crate::utils::retry::RetryPolicy;

/// Most rows a search returns
pub const SEARCH_LIMIT: usize = 20;

struct CachedAccount {
    account: ShopAccount,
    /// Burn rate depends on "today", so a cached fold is only good for one day
    day: NaiveDate,
}

/// Append-only ledger over a `TransactionStore`, with a per-shop balance cache
pub struct Ledger {
    store: Arc<dyn TransactionStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    burn_window_days: u32,
    cache: Mutex<HashMap<ShopId, CachedAccount>>,
}

impl Ledger {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        burn_window_days: u32,
    ) -> Self {
        Self {
            store,
            clock,
            retry,
            burn_window_days,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Assign id and timestamp, then persist
    pub async fn append(&self, draft: TransactionDraft) -> Result<Transaction, LedgerError> {
        draft.validate()?;
        let transaction = Transaction::from_draft(draft, Uuid::new_v4(), self.clock.now());

        self.write(std::slice::from_ref(&transaction)).await?;
        info!(
            "Recorded {} {} {} for shop {} ({})",
            transaction.kind,
            transaction.amount,
            transaction.currency,
            transaction.shop_id,
            transaction.id
        );
        Ok(transaction)
    }

    /// Cancel `original` and, when a kind is given, re-record it under that kind.
    /// Both records are written in one batch.
    pub async fn append_correction(
        &self,
        original: &Transaction,
        replacement_kind: Option<TransactionKind>,
    ) -> Result<(Transaction, Option<Transaction>), LedgerError> {
        if original.is_reversal() {
            return Err(LedgerError::Rejected(format!(
                "{} is already a reversal",
                original.id
            )));
        }

        let now = self.clock.now();
        let reversal = Transaction::from_draft(original.reversal_draft(), Uuid::new_v4(), now);
        let replacement = replacement_kind.map(|kind| {
            let draft = TransactionDraft {
                kind,
                description: original.description.clone(),
                reverses: None,
                ..original.reversal_draft()
            };
            Transaction::from_draft(draft, Uuid::new_v4(), now)
        });

        let mut batch = vec![reversal.clone()];
        batch.extend(replacement.clone());
        self.write(&batch).await?;

        info!(
            "Reversed {} for shop {}{}",
            original.id,
            original.shop_id,
            replacement
                .as_ref()
                .map(|r| format!(", re-recorded as {}", r.kind))
                .unwrap_or_default()
        );
        Ok((reversal, replacement))
    }

    /// Current totals and burn rate of a shop
    pub async fn balance(&self, shop_id: &ShopId) -> Result<ShopAccount, LedgerError> {
        let now = self.clock.now();
        let today = now.date_naive();

        let cached = self
            .lock_cache()
            .get(shop_id)
            .filter(|cached| cached.day == today)
            .map(|cached| cached.account.clone());
        if let Some(account) = cached {
            return Ok(account);
        }

        let log = self.read(shop_id).await?;
        let mut account = ShopAccount::fold(shop_id.clone(), &log);
        account.burn_rate = burn_rate_of(&log, self.burn_window_days, now);

        debug!(
            "Folded {} records for shop {}: balance {}",
            log.len(),
            shop_id,
            account.balance
        );
        self.lock_cache().insert(
            shop_id.clone(),
            CachedAccount {
                account: account.clone(),
                day: today,
            },
        );
        Ok(account)
    }

    /// Live records whose description contains `keyword`, newest first
    pub async fn search(
        &self,
        shop_id: &ShopId,
        keyword: &str,
        kind: Option<TransactionKind>,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let keyword = keyword.trim().to_lowercase();
        let log = self.read(shop_id).await?;

        let reversed: HashSet<Uuid> = log.iter().filter_map(|t| t.reverses).collect();
        let mut hits: Vec<Transaction> = log
            .into_iter()
            .rev()
            .filter(|t| !t.is_reversal() && !reversed.contains(&t.id))
            .filter(|t| kind.map_or(true, |k| t.kind == k))
            .filter(|t| t.description.to_lowercase().contains(&keyword))
            .collect();

        // stable: same-instant records keep newest-insert-first
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        hits.truncate(SEARCH_LIMIT);
        Ok(hits)
    }

    pub async fn burn_rate(&self, shop_id: &ShopId, window_days: u32) -> Result<Decimal, LedgerError> {
        let log = self.read(shop_id).await?;
        Ok(burn_rate_of(&log, window_days, self.clock.now()))
    }

    async fn write(&self, batch: &[Transaction]) -> Result<(), LedgerError> {
        let shop_id = match batch.first() {
            Some(first) => first.shop_id.clone(),
            None => return Ok(()),
        };
        let result = self
            .retry
            .run("store append", || self.store.append(batch))
            .await;
        // drop the fold even on failure: the write may have landed
        self.lock_cache().remove(&shop_id);
        result
    }

    async fn read(&self, shop_id: &ShopId) -> Result<Vec<Transaction>, LedgerError> {
        self.retry
            .run("store query", || self.store.query(shop_id))
            .await
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<ShopId, CachedAccount>> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Average daily operational outflow (expenses and withdrawals minus sales)
/// over the trailing window. Cash put into the till is capital, not income.
pub fn burn_rate_of(log: &[Transaction], window_days: u32, now: DateTime<Utc>) -> Decimal {
    let days: BTreeSet<NaiveDate> = log.iter().map(|t| t.created_at.date_naive()).collect();
    if days.len() < 2 || window_days == 0 {
        return Decimal::ZERO;
    }
    let Some(&first_day) = days.iter().next() else {
        return Decimal::ZERO;
    };

    let today = now.date_naive();
    // a window reaching past the calendar just starts at the first record
    let start = today
        .checked_sub_days(Days::new(u64::from(window_days) - 1))
        .map_or(first_day, |window_start| window_start.max(first_day));
    let covered_days = (today - start).num_days() + 1;
    if covered_days <= 0 {
        return Decimal::ZERO;
    }

    let outflow: Decimal = log
        .iter()
        .filter(|t| t.kind != TransactionKind::CashIn)
        .filter(|t| {
            let day = t.created_at.date_naive();
            day >= start && day <= today
        })
        .map(|t| -t.signed_amount())
        .sum();

    (outflow.max(Decimal::ZERO) / Decimal::from(covered_days)).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::utils::clock::ManualClock;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn shop(phone: &str) -> ShopId {
        ShopId::from_phone(phone).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 15, 0, 0).unwrap()
    }

    fn ledger_with(store: Arc<dyn TransactionStore>) -> (Ledger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at(start()));
        let ledger = Ledger::new(store, clock.clone(), RetryPolicy::none(), 7);
        (ledger, clock)
    }

    fn draft(shop_id: &ShopId, kind: TransactionKind, amount: &str, description: &str) -> TransactionDraft {
        TransactionDraft::new(shop_id.clone(), kind, dec(amount), description)
    }

    struct DownStore;

    #[async_trait]
    impl TransactionStore for DownStore {
        async fn append(&self, _batch: &[Transaction]) -> Result<(), LedgerError> {
            Err(LedgerError::StoreUnavailable("connection refused".into()))
        }

        async fn query(&self, _shop_id: &ShopId) -> Result<Vec<Transaction>, LedgerError> {
            Err(LedgerError::StoreUnavailable("connection refused".into()))
        }
    }

    /// Counts reads so cache hits can be observed
    struct CountingStore {
        inner: MemoryStore,
        queries: AtomicU32,
    }

    #[async_trait]
    impl TransactionStore for CountingStore {
        async fn append(&self, batch: &[Transaction]) -> Result<(), LedgerError> {
            self.inner.append(batch).await
        }

        async fn query(&self, shop_id: &ShopId) -> Result<Vec<Transaction>, LedgerError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.inner.query(shop_id).await
        }
    }

    #[tokio::test]
    async fn test_balance_is_signed_sum_across_interleaved_shops() {
        let (ledger, clock) = ledger_with(Arc::new(MemoryStore::new()));
        let a = shop("111");
        let b = shop("222");

        let entries = [
            (&a, TransactionKind::Sale, "150.50"),
            (&b, TransactionKind::Expense, "30"),
            (&a, TransactionKind::Expense, "75.25"),
            (&b, TransactionKind::Sale, "99.99"),
            (&a, TransactionKind::Sale, "10"),
            (&a, TransactionKind::Expense, "0.25"),
        ];
        for (shop_id, kind, amount) in entries {
            ledger.append(draft(shop_id, kind, amount, "demo")).await.unwrap();
            clock.advance(Duration::minutes(1));
        }

        let account_a = ledger.balance(&a).await.unwrap();
        assert_eq!(account_a.balance, dec("85.00"));
        assert_eq!(account_a.total_sales, dec("160.50"));
        assert_eq!(account_a.total_expenses, dec("75.50"));
        assert_eq!(account_a.transaction_count, 4);

        let account_b = ledger.balance(&b).await.unwrap();
        assert_eq!(account_b.balance, dec("69.99"));
    }

    #[tokio::test]
    async fn test_append_rejects_invalid_draft() {
        let store = Arc::new(MemoryStore::new());
        let (ledger, _) = ledger_with(store.clone());
        let result = ledger
            .append(draft(&shop("111"), TransactionKind::Sale, "0", "nada"))
            .await;
        assert!(matches!(result, Err(LedgerError::Rejected(_))));
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let (ledger, _) = ledger_with(Arc::new(DownStore));
        let shop_id = shop("111");
        let result = ledger
            .append(draft(&shop_id, TransactionKind::Sale, "10", "chicles"))
            .await;
        assert!(matches!(result, Err(LedgerError::StoreUnavailable(_))));
        assert!(matches!(ledger.balance(&shop_id).await, Err(LedgerError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_balance_cache_invalidated_by_append_and_day_change() {
        let store = Arc::new(CountingStore {
            inner: MemoryStore::new(),
            queries: AtomicU32::new(0),
        });
        let (ledger, clock) = ledger_with(store.clone());
        let shop_id = shop("111");

        ledger.append(draft(&shop_id, TransactionKind::Sale, "10", "chicles")).await.unwrap();
        ledger.balance(&shop_id).await.unwrap();
        ledger.balance(&shop_id).await.unwrap();
        assert_eq!(store.queries.load(Ordering::SeqCst), 1);

        ledger.append(draft(&shop_id, TransactionKind::Sale, "5", "dulces")).await.unwrap();
        assert_eq!(ledger.balance(&shop_id).await.unwrap().balance, dec("15"));
        assert_eq!(store.queries.load(Ordering::SeqCst), 2);

        clock.advance(Duration::days(1));
        ledger.balance(&shop_id).await.unwrap();
        assert_eq!(store.queries.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_search_filters_and_orders_newest_first() {
        let (ledger, clock) = ledger_with(Arc::new(MemoryStore::new()));
        let shop_id = shop("111");

        let first = ledger
            .append(draft(&shop_id, TransactionKind::Expense, "120", "Refrescos Coca"))
            .await
            .unwrap();
        clock.advance(Duration::hours(1));
        ledger
            .append(draft(&shop_id, TransactionKind::Expense, "80", "papitas"))
            .await
            .unwrap();
        clock.advance(Duration::hours(1));
        let second = ledger
            .append(draft(&shop_id, TransactionKind::Sale, "45", "3 refrescos"))
            .await
            .unwrap();
        ledger
            .append(draft(&shop_id, TransactionKind::Expense, "10", "otros"))
            .await
            .unwrap();
        // same instant as `second`, inserted later
        let third = ledger
            .append(draft(&shop_id, TransactionKind::Expense, "60", "refrescos fríos"))
            .await
            .unwrap();

        let hits = ledger.search(&shop_id, "REFRESCOS", None).await.unwrap();
        let ids: Vec<Uuid> = hits.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);
        assert!(hits
            .iter()
            .all(|t| t.description.to_lowercase().contains("refrescos")));

        let expenses = ledger
            .search(&shop_id, "refrescos", Some(TransactionKind::Expense))
            .await
            .unwrap();
        assert_eq!(expenses.len(), 2);
        assert!(expenses.iter().all(|t| t.kind == TransactionKind::Expense));
    }

    #[tokio::test]
    async fn test_search_skips_reversed_records_and_caps_results() {
        let (ledger, clock) = ledger_with(Arc::new(MemoryStore::new()));
        let shop_id = shop("111");

        let wrong = ledger
            .append(draft(&shop_id, TransactionKind::Sale, "50", "dulces"))
            .await
            .unwrap();
        ledger.append_correction(&wrong, None).await.unwrap();
        assert!(ledger.search(&shop_id, "dulces", None).await.unwrap().is_empty());

        for _ in 0..25 {
            clock.advance(Duration::minutes(1));
            ledger
                .append(draft(&shop_id, TransactionKind::Sale, "1", "chicle"))
                .await
                .unwrap();
        }
        assert_eq!(
            ledger.search(&shop_id, "chicle", None).await.unwrap().len(),
            SEARCH_LIMIT
        );
    }

    #[tokio::test]
    async fn test_correction_with_new_kind() {
        let (ledger, _) = ledger_with(Arc::new(MemoryStore::new()));
        let shop_id = shop("111");
        ledger
            .append(draft(&shop_id, TransactionKind::Sale, "800", "ventas previas"))
            .await
            .unwrap();
        let wrong = ledger
            .append(draft(&shop_id, TransactionKind::Sale, "75", "mercancía"))
            .await
            .unwrap();

        let (reversal, replacement) = ledger
            .append_correction(&wrong, Some(TransactionKind::Expense))
            .await
            .unwrap();
        let replacement = replacement.unwrap();

        assert_eq!(reversal.reverses, Some(wrong.id));
        assert_eq!(replacement.kind, TransactionKind::Expense);
        assert_eq!(replacement.amount, dec("75"));
        assert_eq!(replacement.description, "mercancía");
        assert_eq!(replacement.reverses, None);

        let account = ledger.balance(&shop_id).await.unwrap();
        assert_eq!(account.balance, dec("725"));
        assert_eq!(account.total_sales, dec("800"));
        assert_eq!(account.total_expenses, dec("75"));

        assert!(ledger.append_correction(&reversal, None).await.is_err());
    }

    #[tokio::test]
    async fn test_burn_rate_needs_two_days() {
        let (ledger, clock) = ledger_with(Arc::new(MemoryStore::new()));
        let shop_id = shop("111");
        ledger
            .append(draft(&shop_id, TransactionKind::Expense, "300", "renta"))
            .await
            .unwrap();
        clock.advance(Duration::hours(2));
        ledger
            .append(draft(&shop_id, TransactionKind::Expense, "100", "luz"))
            .await
            .unwrap();

        assert_eq!(ledger.burn_rate(&shop_id, 7).await.unwrap(), Decimal::ZERO);
        assert_eq!(ledger.balance(&shop_id).await.unwrap().burn_rate, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_burn_rate_over_window() {
        let (ledger, clock) = ledger_with(Arc::new(MemoryStore::new()));
        let shop_id = shop("111");

        ledger
            .append(draft(&shop_id, TransactionKind::CashIn, "1000", "saldo inicial"))
            .await
            .unwrap();
        ledger
            .append(draft(&shop_id, TransactionKind::Expense, "400", "mercancía"))
            .await
            .unwrap();
        clock.advance(Duration::days(1));
        ledger
            .append(draft(&shop_id, TransactionKind::Sale, "100", "ventas"))
            .await
            .unwrap();
        ledger
            .append(draft(&shop_id, TransactionKind::CashOut, "50", "retirado de caja"))
            .await
            .unwrap();
        clock.advance(Duration::days(1));

        // 3 covered days, outflow 400 + 50 - 100
        let rate = ledger.burn_rate(&shop_id, 7).await.unwrap();
        assert_eq!(rate, dec("116.67"));

        // only today in a one-day window, nothing happened today
        assert_eq!(ledger.burn_rate(&shop_id, 1).await.unwrap(), Decimal::ZERO);
        assert_eq!(ledger.burn_rate(&shop_id, 0).await.unwrap(), Decimal::ZERO);

        // a window far past the first record covers the same three days
        assert_eq!(ledger.burn_rate(&shop_id, u32::MAX).await.unwrap(), dec("116.67"));
    }

    #[tokio::test]
    async fn test_burn_rate_clamps_at_zero() {
        let (ledger, clock) = ledger_with(Arc::new(MemoryStore::new()));
        let shop_id = shop("111");
        ledger
            .append(draft(&shop_id, TransactionKind::Sale, "500", "ventas"))
            .await
            .unwrap();
        clock.advance(Duration::days(1));
        ledger
            .append(draft(&shop_id, TransactionKind::Expense, "100", "luz"))
            .await
            .unwrap();
        assert_eq!(ledger.burn_rate(&shop_id, 7).await.unwrap(), Decimal::ZERO);
    }
}
