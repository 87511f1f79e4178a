//! # Connection Pool
//!
//! One [`SqlitePool`] per process, shared by every repository.
//!
//! ```text
//! BillingConfig ──► DbConfig ──► Database::new ──► SqlitePool (WAL, FK on)
//!                                      │
//!                                      └── embedded migrations
//!
//!  record_payment ─► conn A: BEGIN; UPDATE invoices … RETURNING; … COMMIT
//!  process_refund ─► conn B: waits up to busy_timeout for the write lock
//!  ledger page    ─► conn C: reads its WAL snapshot, never waits
//! ```
//!
//! SQLite admits one writer at a time. The busy timeout is how long a
//! second writer queues before the call fails with a conflict. Write
//! transactions open with `BEGIN IMMEDIATE`: a deferred transaction that
//! reads first cannot upgrade to a writer once another connection has
//! committed, and SQLite fails that upgrade without waiting.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::booking::BookingRepository;
use crate::repository::fuel_price::FuelPriceRepository;
use crate::repository::inventory::InventoryRepository;
use crate::repository::invoice::InvoiceRepository;
use crate::repository::ledger::LedgerRepository;
use crate::repository::payment::PaymentRepository;

const IN_MEMORY: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Pool settings.
///
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/forecourt/billing.db")
///     .max_connections(8)
///     .busy_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_path: PathBuf,
    /// Default 5.
    pub max_connections: u32,
    /// Default 1.
    pub min_connections: u32,
    /// How long `acquire` waits for a free connection. Default 30 s.
    pub acquire_timeout: Duration,
    /// Default 5 s.
    pub busy_timeout: Duration,
    /// Apply pending migrations on connect. Default true.
    pub run_migrations: bool,
}

impl DbConfig {
    /// File-backed configuration; the file is created on first connect.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Private in-memory database for tests.
    ///
    /// Every SQLite connection to `:memory:` opens its own empty database,
    /// so the pool is pinned to a single connection.
    pub fn in_memory() -> Self {
        DbConfig {
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            ..Self::new(IN_MEMORY)
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        let options = if self.database_path.as_os_str() == IN_MEMORY {
            SqliteConnectOptions::new().in_memory(true)
        } else {
            SqliteConnectOptions::new()
                .filename(&self.database_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
        };

        options
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout)
    }
}

/// Opens a transaction that holds the write lock from its first statement.
pub(crate) async fn begin_write(pool: &SqlitePool) -> DbResult<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

// =============================================================================
// Database
// =============================================================================

/// Handle to the billing database. Clones share the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool and, unless disabled, brings the schema up to date.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            max_connections = config.max_connections,
            "Opening billing database"
        );

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections.min(config.max_connections))
            .acquire_timeout(config.acquire_timeout)
            .connect_with(config.connect_options())
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        debug!(busy_timeout_ms = config.busy_timeout.as_millis() as u64, "Pool ready");

        let db = Database { pool };
        if config.run_migrations {
            migrations::run_migrations(&db.pool).await?;
        }

        Ok(db)
    }

    /// Raw pool, for opening transactions.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Write transaction; waits up to the busy timeout for the write lock.
    pub async fn begin_write(&self) -> DbResult<Transaction<'static, Sqlite>> {
        begin_write(&self.pool).await
    }

    pub fn invoices(&self) -> InvoiceRepository {
        InvoiceRepository::new(self.pool.clone())
    }

    pub fn payments(&self) -> PaymentRepository {
        PaymentRepository::new(self.pool.clone())
    }

    pub fn ledger(&self) -> LedgerRepository {
        LedgerRepository::new(self.pool.clone())
    }

    pub fn bookings(&self) -> BookingRepository {
        BookingRepository::new(self.pool.clone())
    }

    pub fn inventory(&self) -> InventoryRepository {
        InventoryRepository::new(self.pool.clone())
    }

    pub fn fuel_prices(&self) -> FuelPriceRepository {
        FuelPriceRepository::new(self.pool.clone())
    }

    /// True while the store answers a trivial query.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn test_migrations_create_billing_tables() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(db.pool())
                .await
                .unwrap();

        for table in [
            "bookings",
            "finance_ledger",
            "fuel_prices",
            "inventory_items",
            "invoice_lines",
            "invoices",
            "payments",
            "service_types",
        ] {
            assert!(tables.iter().any(|t| t == table), "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_ledger_rejects_updates() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sqlx::query(
            "INSERT INTO finance_ledger (id, event_id, transaction_at, account, side, amount_cents, created_at)
             VALUES ('le-1', 'evt-1', '2024-01-01T00:00:00Z', 'CASH', 'DEBIT', 100, '2024-01-01T00:00:00Z')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let update = sqlx::query("UPDATE finance_ledger SET amount_cents = 1 WHERE id = 'le-1'")
            .execute(db.pool())
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM finance_ledger WHERE id = 'le-1'")
            .execute(db.pool())
            .await;
        assert!(delete.is_err());
    }

    #[tokio::test]
    async fn test_write_transaction_rolls_back_on_drop() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        {
            let mut tx = db.begin_write().await.unwrap();
            sqlx::query("INSERT INTO service_types (id, name, price_cents) VALUES ('st-1', 'Wash', 500)")
                .execute(&mut *tx)
                .await
                .unwrap();
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM service_types")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/billing.db")
            .max_connections(10)
            .min_connections(2)
            .busy_timeout(Duration::from_millis(250))
            .run_migrations(false);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert!(!config.run_migrations);

        let memory = DbConfig::in_memory();
        assert_eq!(memory.max_connections, 1);
        assert!(memory.run_migrations);
    }
}
