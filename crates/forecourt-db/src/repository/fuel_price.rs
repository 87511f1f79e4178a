//! # Fuel Price Repository
//!
//! Optional database home for the price table.
//! [`BillingService::from_stored_prices`](crate::BillingService::from_stored_prices)
//! loads it once at startup; the running table never changes.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;
use forecourt_core::{FuelGrade, FuelPriceTable, Money};

#[derive(Debug, sqlx::FromRow)]
struct FuelPriceRow {
    grade: FuelGrade,
    price_cents: i64,
}

/// Repository for stored fuel prices.
#[derive(Debug, Clone)]
pub struct FuelPriceRepository {
    pool: SqlitePool,
}

impl FuelPriceRepository {
    /// Creates a new FuelPriceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        FuelPriceRepository { pool }
    }

    /// Builds a table from the stored rows. `None` when nothing is stored.
    pub async fn load_table(&self) -> DbResult<Option<FuelPriceTable>> {
        let rows = sqlx::query_as::<_, FuelPriceRow>("SELECT grade, price_cents FROM fuel_prices")
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        debug!(grades = rows.len(), "Loaded fuel prices");
        Ok(Some(FuelPriceTable::from_prices(
            rows.into_iter()
                .map(|row| (row.grade, Money::from_cents(row.price_cents))),
        )))
    }

    /// Inserts or replaces the price of one grade.
    pub async fn upsert(&self, grade: FuelGrade, price: Money, now: DateTime<Utc>) -> DbResult<()> {
        info!(grade = %grade, price = %price, "Setting fuel price");

        sqlx::query(
            r#"
            INSERT INTO fuel_prices (grade, price_cents, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(grade) DO UPDATE SET
                price_cents = excluded.price_cents,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(grade)
        .bind(price.cents())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stores every row of a table.
    pub async fn store_table(&self, table: &FuelPriceTable, now: DateTime<Utc>) -> DbResult<()> {
        for (grade, price) in table.all() {
            self.upsert(grade, price, now).await?;
        }
        Ok(())
    }
}
