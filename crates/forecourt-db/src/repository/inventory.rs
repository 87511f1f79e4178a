//! # Inventory Repository
//!
//! Stock valuation for the period summary. Billing never changes stock.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use forecourt_core::{InventoryItem, Money};

/// Read access to inventory items.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Σ unit_price × on_hand over active items. Unpriced items count as zero.
    pub async fn total_value(&self) -> DbResult<Money> {
        let cents: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(COALESCE(unit_price_cents, 0) * on_hand), 0)
            FROM inventory_items
            WHERE is_active = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::from_cents(cents))
    }

    pub async fn insert(&self, item: &InventoryItem) -> DbResult<()> {
        debug!(id = %item.id, sku = %item.sku, "Inserting inventory item");

        sqlx::query(
            r#"
            INSERT INTO inventory_items (
                id, sku, name, category, on_hand, unit_price_cents, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&item.id)
        .bind(&item.sku)
        .bind(&item.name)
        .bind(&item.category)
        .bind(item.on_hand)
        .bind(item.unit_price_cents)
        .bind(item.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
