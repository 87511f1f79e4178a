//! # Payment Repository
//!
//! Payments are immutable once written: captures carry a positive amount,
//! refunds a negative one. Only the invoice link changes, and only when the
//! invoice itself is deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use tracing::debug;

use super::like_pattern;
use crate::error::DbResult;
use forecourt_core::{Money, Payment, PaymentMethod};

const PAYMENT_COLUMNS: &str = r#"
    id, invoice_id, method, amount_cents, reference, notes, created_by, created_at
"#;

/// Net amount taken through one method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodTotal {
    pub method: PaymentMethod,
    pub total: Money,
    pub count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct MethodTotalRow {
    method: PaymentMethod,
    total_cents: i64,
    payment_count: i64,
}

/// Repository for payment database operations.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Writes a payment on the caller's transaction.
    pub async fn insert(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
        debug!(
            id = %payment.id,
            invoice_id = ?payment.invoice_id,
            method = %payment.method,
            amount = payment.amount_cents,
            "Inserting payment"
        );

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, invoice_id, method, amount_cents, reference, notes, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.invoice_id)
        .bind(payment.method)
        .bind(payment.amount_cents)
        .bind(&payment.reference)
        .bind(&payment.notes)
        .bind(&payment.created_by)
        .bind(payment.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Σ signed amounts attached to an invoice, read on the caller's
    /// transaction.
    pub async fn sum_for_invoice(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<Money> {
        let cents: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM payments WHERE invoice_id = ?1",
        )
        .bind(invoice_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(Money::from_cents(cents))
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments WHERE id = ?1", PAYMENT_COLUMNS);
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(payment)
    }

    /// Every payment, newest first.
    pub async fn list_all(&self) -> DbResult<Vec<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments ORDER BY created_at DESC, id ASC",
            PAYMENT_COLUMNS
        );
        let payments = sqlx::query_as::<_, Payment>(&sql).fetch_all(&self.pool).await?;

        Ok(payments)
    }

    /// Payments and refunds of one invoice, in the order they were taken.
    pub async fn list_by_invoice(&self, invoice_id: &str) -> DbResult<Vec<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE invoice_id = ?1 ORDER BY created_at ASC, id ASC",
            PAYMENT_COLUMNS
        );
        let payments = sqlx::query_as::<_, Payment>(&sql)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(payments)
    }

    pub async fn list_by_method(&self, method: PaymentMethod) -> DbResult<Vec<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE method = ?1 ORDER BY created_at DESC",
            PAYMENT_COLUMNS
        );
        let payments = sqlx::query_as::<_, Payment>(&sql)
            .bind(method)
            .fetch_all(&self.pool)
            .await?;

        Ok(payments)
    }

    /// Payments taken in `[from, to]`, oldest first.
    pub async fn list_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<Payment>> {
        let sql = format!(
            r#"
            SELECT {} FROM payments
            WHERE created_at >= ?1 AND created_at <= ?2
            ORDER BY created_at ASC
            "#,
            PAYMENT_COLUMNS
        );
        let payments = sqlx::query_as::<_, Payment>(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;

        Ok(payments)
    }

    /// Substring search over payment references.
    pub async fn search_reference(&self, term: &str) -> DbResult<Vec<Payment>> {
        let sql = format!(
            r#"
            SELECT {} FROM payments
            WHERE reference LIKE ?1 ESCAPE '\'
            ORDER BY created_at DESC
            "#,
            PAYMENT_COLUMNS
        );
        let payments = sqlx::query_as::<_, Payment>(&sql)
            .bind(like_pattern(term))
            .fetch_all(&self.pool)
            .await?;

        Ok(payments)
    }

    /// Net amount per method in `[from, to]`, refunds included.
    pub async fn totals_by_method(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<BTreeMap<PaymentMethod, MethodTotal>> {
        let rows = sqlx::query_as::<_, MethodTotalRow>(
            r#"
            SELECT method,
                   COALESCE(SUM(amount_cents), 0) AS total_cents,
                   COUNT(*) AS payment_count
            FROM payments
            WHERE created_at >= ?1 AND created_at <= ?2
            GROUP BY method
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.method,
                    MethodTotal {
                        method: row.method,
                        total: Money::from_cents(row.total_cents),
                        count: row.payment_count,
                    },
                )
            })
            .collect())
    }
}
