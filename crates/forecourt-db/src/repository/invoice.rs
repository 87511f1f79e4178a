//! # Invoice Repository
//!
//! Database operations for invoices and invoice lines.
//!
//! ## Invoice Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Invoice Lifecycle                                 │
//! │                                                                         │
//! │  1. ISSUE                                                               │
//! │     └── insert_with_lines() → Invoice + lines in one transaction        │
//! │                                                                         │
//! │  2. SETTLE (payments / refunds)                                         │
//! │     └── lock()            → takes the write lock, returns the row       │
//! │     └── apply_totals()    → paid, balance, status from InvoiceTotals    │
//! │                                                                         │
//! │  3. (ADMIN) DELETE                                                      │
//! │     └── delete() → payments keep history (invoice_id = NULL),           │
//! │                    lines cascade, ledger untouched                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use tracing::debug;

use super::{like_pattern, page_bounds};
use crate::error::{DbError, DbResult};
use forecourt_core::invoice::InvoiceTotals;
use forecourt_core::{Invoice, InvoiceLine, InvoiceStatus, Money, Page, SortDirection};

const INVOICE_COLUMNS: &str = r#"
    id, invoice_number, booking_id,
    subtotal_cents, tax_cents, total_cents, paid_cents, balance_cents,
    status, notes, created_at, due_at, updated_at
"#;

const LINE_COLUMNS: &str = r#"
    id, invoice_id, position, kind, reference_id, description,
    quantity, unit_price_cents, line_total_cents
"#;

// =============================================================================
// Sorting
// =============================================================================

/// Sortable invoice columns for the paged list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceSort {
    #[default]
    CreatedAt,
    DueAt,
    InvoiceNumber,
    Total,
    Balance,
    Status,
}

impl InvoiceSort {
    fn column(&self) -> &'static str {
        match self {
            InvoiceSort::CreatedAt => "created_at",
            InvoiceSort::DueAt => "due_at",
            InvoiceSort::InvoiceNumber => "invoice_number",
            InvoiceSort::Total => "total_cents",
            InvoiceSort::Balance => "balance_cents",
            InvoiceSort::Status => "status",
        }
    }
}

impl FromStr for InvoiceSort {
    type Err = DbError;

    /// Accepts both `created_at` and the `createdAt` spelling used by the
    /// HTTP layer.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "").as_str() {
            "createdat" => Ok(InvoiceSort::CreatedAt),
            "dueat" | "duedate" => Ok(InvoiceSort::DueAt),
            "invoicenumber" => Ok(InvoiceSort::InvoiceNumber),
            "total" | "totalamount" => Ok(InvoiceSort::Total),
            "balance" => Ok(InvoiceSort::Balance),
            "status" => Ok(InvoiceSort::Status),
            other => Err(DbError::QueryFailed(format!("unsupported invoice sort: {}", other))),
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for invoice database operations.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Transactional writes
    // -------------------------------------------------------------------------

    /// Inserts an invoice and its lines on the caller's transaction.
    pub async fn insert_with_lines(
        conn: &mut SqliteConnection,
        invoice: &Invoice,
        lines: &[InvoiceLine],
    ) -> DbResult<()> {
        debug!(
            id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            lines = lines.len(),
            "Inserting invoice"
        );

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, invoice_number, booking_id,
                subtotal_cents, tax_cents, total_cents, paid_cents, balance_cents,
                status, notes, created_at, due_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&invoice.id)
        .bind(&invoice.invoice_number)
        .bind(&invoice.booking_id)
        .bind(invoice.subtotal_cents)
        .bind(invoice.tax_cents)
        .bind(invoice.total_cents)
        .bind(invoice.paid_cents)
        .bind(invoice.balance_cents)
        .bind(invoice.status)
        .bind(&invoice.notes)
        .bind(invoice.created_at)
        .bind(invoice.due_at)
        .bind(invoice.updated_at)
        .execute(&mut *conn)
        .await?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO invoice_lines (
                    id, invoice_id, position, kind, reference_id, description,
                    quantity, unit_price_cents, line_total_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&line.id)
            .bind(&line.invoice_id)
            .bind(line.position)
            .bind(line.kind)
            .bind(&line.reference_id)
            .bind(&line.description)
            .bind(line.quantity)
            .bind(line.unit_price_cents)
            .bind(line.line_total_cents)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Takes the database write lock and returns the invoice row.
    ///
    /// SQLite has no `SELECT … FOR UPDATE`; a no-op `UPDATE … RETURNING` as
    /// the first statement of the transaction acquires the write lock, which
    /// is held until commit or rollback. Concurrent settlements on any
    /// invoice queue behind it for up to the busy timeout.
    pub async fn lock(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Invoice>> {
        let sql = format!(
            "UPDATE invoices SET updated_at = updated_at WHERE id = ?1 RETURNING {}",
            INVOICE_COLUMNS
        );
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(invoice)
    }

    /// Writes re-derived settlement fields.
    ///
    /// Only [`InvoiceTotals`] values are accepted, so balance and status
    /// always follow from total and paid.
    pub async fn apply_totals(
        conn: &mut SqliteConnection,
        id: &str,
        totals: &InvoiceTotals,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE invoices SET
                subtotal_cents = ?2,
                tax_cents = ?3,
                total_cents = ?4,
                paid_cents = ?5,
                balance_cents = ?6,
                status = ?7,
                updated_at = ?8
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(totals.subtotal.cents())
        .bind(totals.tax.cents())
        .bind(totals.total.cents())
        .bind(totals.paid.cents())
        .bind(totals.balance.cents())
        .bind(totals.status)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Invoice", id));
        }

        Ok(())
    }

    /// Whether an invoice already exists for a booking.
    pub async fn exists_for_booking(conn: &mut SqliteConnection, booking_id: &str) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices WHERE booking_id = ?1")
            .bind(booking_id)
            .fetch_one(&mut *conn)
            .await?;

        Ok(count > 0)
    }

    /// Deletes an invoice (admin).
    ///
    /// Payments keep their rows with `invoice_id` nulled, lines go with the
    /// invoice, ledger entries are not touched.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting invoice");

        let mut tx = crate::pool::begin_write(&self.pool).await?;

        sqlx::query("UPDATE payments SET invoice_id = NULL WHERE invoice_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM invoice_lines WHERE invoice_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM invoices WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Invoice", id));
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Gets an invoice by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Invoice>> {
        let sql = format!("SELECT {} FROM invoices WHERE id = ?1", INVOICE_COLUMNS);
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(invoice)
    }

    /// Gets an invoice by its human-readable number.
    pub async fn get_by_number(&self, invoice_number: &str) -> DbResult<Option<Invoice>> {
        let sql = format!("SELECT {} FROM invoices WHERE invoice_number = ?1", INVOICE_COLUMNS);
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(invoice_number)
            .fetch_optional(&self.pool)
            .await?;

        Ok(invoice)
    }

    /// Invoices issued for a booking (zero or one while the booking exists).
    pub async fn list_by_booking(&self, booking_id: &str) -> DbResult<Vec<Invoice>> {
        let sql = format!(
            "SELECT {} FROM invoices WHERE booking_id = ?1 ORDER BY created_at DESC",
            INVOICE_COLUMNS
        );
        let invoices = sqlx::query_as::<_, Invoice>(&sql)
            .bind(booking_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(invoices)
    }

    pub async fn list_by_status(&self, status: InvoiceStatus) -> DbResult<Vec<Invoice>> {
        let sql = format!(
            "SELECT {} FROM invoices WHERE status = ?1 ORDER BY created_at DESC",
            INVOICE_COLUMNS
        );
        let invoices = sqlx::query_as::<_, Invoice>(&sql)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;

        Ok(invoices)
    }

    /// UNPAID and PARTIAL invoices, oldest first.
    pub async fn list_unpaid(&self) -> DbResult<Vec<Invoice>> {
        let sql = format!(
            "SELECT {} FROM invoices WHERE status IN ('UNPAID', 'PARTIAL') ORDER BY created_at ASC",
            INVOICE_COLUMNS
        );
        let invoices = sqlx::query_as::<_, Invoice>(&sql).fetch_all(&self.pool).await?;

        Ok(invoices)
    }

    /// Open invoices whose due date is before `as_of`, most overdue first.
    pub async fn list_overdue(&self, as_of: DateTime<Utc>) -> DbResult<Vec<Invoice>> {
        let sql = format!(
            r#"
            SELECT {} FROM invoices
            WHERE due_at < ?1 AND status IN ('UNPAID', 'PARTIAL')
            ORDER BY due_at ASC
            "#,
            INVOICE_COLUMNS
        );
        let invoices = sqlx::query_as::<_, Invoice>(&sql)
            .bind(as_of)
            .fetch_all(&self.pool)
            .await?;

        Ok(invoices)
    }

    /// Invoices created in `[from, to]`, newest first.
    pub async fn list_by_date_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<Invoice>> {
        let sql = format!(
            r#"
            SELECT {} FROM invoices
            WHERE created_at >= ?1 AND created_at <= ?2
            ORDER BY created_at DESC
            "#,
            INVOICE_COLUMNS
        );
        let invoices = sqlx::query_as::<_, Invoice>(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;

        Ok(invoices)
    }

    /// One page of invoices.
    pub async fn list_page(
        &self,
        page: u32,
        size: u32,
        sort: InvoiceSort,
        direction: SortDirection,
    ) -> DbResult<Page<Invoice>> {
        let (limit, offset) = page_bounds(page, size);

        // Column and direction come from enums, never from input text.
        let sql = format!(
            "SELECT {} FROM invoices ORDER BY {} {}, id ASC LIMIT ?1 OFFSET ?2",
            INVOICE_COLUMNS,
            sort.column(),
            direction.as_sql()
        );
        let items = sqlx::query_as::<_, Invoice>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let total = self.count().await?;

        Ok(Page::new(items, page, limit as u32, total))
    }

    /// Substring search over invoice number and booking id.
    pub async fn search(&self, term: &str) -> DbResult<Vec<Invoice>> {
        let sql = format!(
            r#"
            SELECT {} FROM invoices
            WHERE invoice_number LIKE ?1 ESCAPE '\'
               OR booking_id LIKE ?1 ESCAPE '\'
            ORDER BY created_at DESC
            "#,
            INVOICE_COLUMNS
        );
        let invoices = sqlx::query_as::<_, Invoice>(&sql)
            .bind(like_pattern(term))
            .fetch_all(&self.pool)
            .await?;

        Ok(invoices)
    }

    /// Lines of an invoice in position order.
    pub async fn get_lines(&self, invoice_id: &str) -> DbResult<Vec<InvoiceLine>> {
        let sql = format!(
            "SELECT {} FROM invoice_lines WHERE invoice_id = ?1 ORDER BY position ASC",
            LINE_COLUMNS
        );
        let lines = sqlx::query_as::<_, InvoiceLine>(&sql)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(lines)
    }

    // -------------------------------------------------------------------------
    // Aggregates
    // -------------------------------------------------------------------------

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// UNPAID and PARTIAL invoices.
    pub async fn count_open(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM invoices WHERE status IN ('UNPAID', 'PARTIAL')")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    pub async fn count_overdue(&self, as_of: DateTime<Utc>) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM invoices WHERE due_at < ?1 AND status IN ('UNPAID', 'PARTIAL')",
        )
        .bind(as_of)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Σ balance over open invoices.
    pub async fn total_outstanding(&self) -> DbResult<Money> {
        let cents: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(balance_cents), 0) FROM invoices WHERE status IN ('UNPAID', 'PARTIAL')",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::from_cents(cents))
    }

    /// Σ paid over invoices created in `[from, to]`.
    pub async fn revenue_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> DbResult<Money> {
        let cents: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(paid_cents), 0) FROM invoices
            WHERE created_at >= ?1 AND created_at <= ?2
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::from_cents(cents))
    }

    /// Invoice numbers that appear more than once (always empty while the
    /// UNIQUE constraint holds).
    pub async fn duplicate_numbers(&self) -> DbResult<Vec<String>> {
        let numbers: Vec<String> = sqlx::query_scalar(
            "SELECT invoice_number FROM invoices GROUP BY invoice_number HAVING COUNT(*) > 1",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(numbers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_parse() {
        assert_eq!("createdAt".parse::<InvoiceSort>().unwrap(), InvoiceSort::CreatedAt);
        assert_eq!("due_date".parse::<InvoiceSort>().unwrap(), InvoiceSort::DueAt);
        assert_eq!("totalAmount".parse::<InvoiceSort>().unwrap(), InvoiceSort::Total);
        assert!("id; DROP TABLE invoices".parse::<InvoiceSort>().is_err());
    }
}
