use std::str::FromStr;

use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlConnection, MySqlPool};
use tracing::debug;
use uuid::Uuid;

use crate::models::{ShopId, Transaction, TransactionKind};
use crate::traits::TransactionStore;
use crate::utils::errors::LedgerError;

/// (id, shop_id, kind, amount, description, currency, reverses, source_message_id, created_at)
type TransactionRow = (
    String,
    String,
    String,
    Decimal,
    String,
    String,
    Option<String>,
    Option<String>,
    NaiveDateTime,
);

/// Insert one ledger record
pub async fn create_transaction(
    conn: &mut MySqlConnection,
    transaction: &Transaction,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO transactions (id, shop_id, kind, amount, description, currency, reverses, source_message_id, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
    )
    .bind(transaction.id.to_string())
    .bind(transaction.shop_id.as_str())
    .bind(transaction.kind.as_str())
    .bind(transaction.amount)
    .bind(&transaction.description)
    .bind(&transaction.currency)
    .bind(transaction.reverses.map(|id| id.to_string()))
    .bind(transaction.source_message_id.as_deref())
    .bind(transaction.created_at.naive_utc())
    .execute(conn)
    .await?;

    Ok(())
}

/// Every record of a shop in write order
pub async fn get_shop_transactions(
    pool: &MySqlPool,
    shop_id: &str,
) -> Result<Vec<TransactionRow>, sqlx::Error> {
    sqlx::query_as::<_, TransactionRow>(
        "SELECT id, shop_id, kind, amount, description, currency, reverses, source_message_id, created_at \
         FROM transactions WHERE shop_id = ? ORDER BY created_at, seq"
    )
    .bind(shop_id)
    .fetch_all(pool)
    .await
}

fn from_row(row: TransactionRow) -> Result<Transaction, LedgerError> {
    let (id, shop_id, kind, amount, description, currency, reverses, source_message_id, created_at) = row;

    let corrupt = |what: &str, value: &str| {
        LedgerError::StoreUnavailable(format!("corrupt {} in stored transaction: {:?}", what, value))
    };

    Ok(Transaction {
        id: Uuid::from_str(&id).map_err(|_| corrupt("id", &id))?,
        shop_id: ShopId::from_phone(&shop_id).ok_or_else(|| corrupt("shop_id", &shop_id))?,
        kind: TransactionKind::parse(&kind).ok_or_else(|| corrupt("kind", &kind))?,
        amount,
        description,
        currency,
        reverses: reverses
            .map(|r| Uuid::from_str(&r).map_err(|_| corrupt("reverses", &r)))
            .transpose()?,
        source_message_id,
        created_at: Utc.from_utc_datetime(&created_at),
    })
}

/// `TransactionStore` backed by the `transactions` table
#[derive(Clone)]
pub struct MySqlTransactionStore {
    pool: MySqlPool,
}

impl MySqlTransactionStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for MySqlTransactionStore {
    async fn append(&self, batch: &[Transaction]) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;
        for transaction in batch {
            match create_transaction(&mut *tx, transaction).await {
                Ok(()) => {}
                // batches land whole, so a known id means a retry of a batch that already committed
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                    debug!("Transaction {} already stored, skipping batch", transaction.id);
                    tx.rollback().await?;
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, shop_id: &ShopId) -> Result<Vec<Transaction>, LedgerError> {
        get_shop_transactions(&self.pool, shop_id.as_str())
            .await?
            .into_iter()
            .map(from_row)
            .collect()
    }
}
