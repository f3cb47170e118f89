use sqlx::mysql::MySqlPool;
use tracing::{debug, warn};

pub mod memory;
pub mod transaction;

pub use memory::MemoryStore;
pub use transaction::MySqlTransactionStore;

const CREATE_TABLES_SQL: &str = include_str!("../../migrations/create_tables.sql");

/// Initialize the MySQL connection pool and create tables
pub async fn init_db(database_url: &str) -> Result<MySqlPool, sqlx::Error> {
    let pool = MySqlPool::connect(database_url).await?;

    create_tables(&pool).await;

    Ok(pool)
}

/// Run a ';'-separated SQL script one statement at a time
async fn execute_sql(pool: &MySqlPool, sql: &str) {
    for statement in sql.split(';') {
        let trimmed = strip_comments(statement);
        if trimmed.is_empty() {
            continue;
        }
        // tables that already exist are fine
        if let Err(e) = sqlx::raw_sql(&trimmed).execute(pool).await {
            warn!("Schema statement failed: {}", e);
        }
    }
}

fn strip_comments(statement: &str) -> String {
    statement
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Create all database tables
async fn create_tables(pool: &MySqlPool) {
    execute_sql(pool, CREATE_TABLES_SQL).await;
    debug!("Schema is in place");
}
