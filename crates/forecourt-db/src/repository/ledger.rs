//! # Ledger Repository
//!
//! The finance ledger is append-only: rows are inserted in pairs inside the
//! transaction that mutates the invoice, and triggers in the schema abort
//! any UPDATE or DELETE.
//!
//! ## Filters
//! ```text
//! WHERE 1=1
//!   [AND transaction_at >= ?]   from
//!   [AND transaction_at <= ?]   to
//!   [AND account = ?]           account
//!   [AND side = ?]              side
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

use super::page_bounds;
use crate::error::{DbError, DbResult};
use forecourt_core::{EntrySide, LedgerEntry, Money, Page, SortDirection};

const ENTRY_COLUMNS: &str = r#"
    id, event_id, transaction_at, account, side, amount_cents,
    reference, description, created_by, created_at
"#;

// =============================================================================
// Query Parameters
// =============================================================================

/// Optional ledger filters; `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub account: Option<String>,
    pub side: Option<EntrySide>,
}

impl LedgerFilter {
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        LedgerFilter {
            from: Some(from),
            to: Some(to),
            ..Default::default()
        }
    }

    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn side(mut self, side: EntrySide) -> Self {
        self.side = Some(side);
        self
    }

    fn where_clause(&self) -> (String, Vec<FilterArg>) {
        let mut sql = String::from(" WHERE 1=1");
        let mut args = Vec::new();

        if let Some(from) = self.from {
            sql.push_str(" AND transaction_at >= ?");
            args.push(FilterArg::Time(from));
        }
        if let Some(to) = self.to {
            sql.push_str(" AND transaction_at <= ?");
            args.push(FilterArg::Time(to));
        }
        if let Some(account) = &self.account {
            sql.push_str(" AND account = ?");
            args.push(FilterArg::Text(account.clone()));
        }
        if let Some(side) = self.side {
            sql.push_str(" AND side = ?");
            args.push(FilterArg::Side(side));
        }

        (sql, args)
    }
}

enum FilterArg {
    Time(DateTime<Utc>),
    Text(String),
    Side(EntrySide),
}

type RowsQuery<'q, O> = sqlx::query::QueryAs<'q, Sqlite, O, SqliteArguments<'q>>;
type ScalarQuery<'q, T> = sqlx::query::QueryScalar<'q, Sqlite, T, SqliteArguments<'q>>;

fn bind_rows<O>(mut query: RowsQuery<'_, O>, args: Vec<FilterArg>) -> RowsQuery<'_, O> {
    for arg in args {
        query = match arg {
            FilterArg::Time(t) => query.bind(t),
            FilterArg::Text(s) => query.bind(s),
            FilterArg::Side(s) => query.bind(s),
        };
    }
    query
}

fn bind_scalar<T>(mut query: ScalarQuery<'_, T>, args: Vec<FilterArg>) -> ScalarQuery<'_, T> {
    for arg in args {
        query = match arg {
            FilterArg::Time(t) => query.bind(t),
            FilterArg::Text(s) => query.bind(s),
            FilterArg::Side(s) => query.bind(s),
        };
    }
    query
}

/// Sortable ledger columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerSort {
    #[default]
    TransactionAt,
    Amount,
    Account,
    CreatedAt,
}

impl LedgerSort {
    fn column(&self) -> &'static str {
        match self {
            LedgerSort::TransactionAt => "transaction_at",
            LedgerSort::Amount => "amount_cents",
            LedgerSort::Account => "account",
            LedgerSort::CreatedAt => "created_at",
        }
    }
}

impl FromStr for LedgerSort {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "").as_str() {
            "transactionat" | "transactiondate" | "date" => Ok(LedgerSort::TransactionAt),
            "amount" => Ok(LedgerSort::Amount),
            "account" => Ok(LedgerSort::Account),
            "createdat" => Ok(LedgerSort::CreatedAt),
            other => Err(DbError::QueryFailed(format!("unsupported ledger sort: {}", other))),
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the finance ledger.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Appends both rows of one posting on the caller's transaction.
    pub async fn insert_pair(conn: &mut SqliteConnection, entries: &[LedgerEntry; 2]) -> DbResult<()> {
        debug!(
            event_id = %entries[0].event_id,
            debit = %entries[0].account,
            credit = %entries[1].account,
            amount = entries[0].amount_cents,
            "Appending ledger pair"
        );

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO finance_ledger (
                    id, event_id, transaction_at, account, side, amount_cents,
                    reference, description, created_by, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )
            .bind(&entry.id)
            .bind(&entry.event_id)
            .bind(entry.transaction_at)
            .bind(&entry.account)
            .bind(entry.side)
            .bind(entry.amount_cents)
            .bind(&entry.reference)
            .bind(&entry.description)
            .bind(&entry.created_by)
            .bind(entry.created_at)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// One page of entries matching `filter`.
    pub async fn page(
        &self,
        filter: &LedgerFilter,
        page: u32,
        size: u32,
        sort: LedgerSort,
        direction: SortDirection,
    ) -> DbResult<Page<LedgerEntry>> {
        let (limit, offset) = page_bounds(page, size);

        let (clause, args) = filter.where_clause();
        let sql = format!(
            "SELECT {} FROM finance_ledger{} ORDER BY {} {}, id ASC LIMIT {} OFFSET {}",
            ENTRY_COLUMNS,
            clause,
            sort.column(),
            direction.as_sql(),
            limit,
            offset
        );
        let items = bind_rows(sqlx::query_as::<_, LedgerEntry>(&sql), args)
            .fetch_all(&self.pool)
            .await?;

        let total = self.count(filter).await?;

        Ok(Page::new(items, page, limit as u32, total))
    }

    pub async fn count(&self, filter: &LedgerFilter) -> DbResult<i64> {
        let (clause, args) = filter.where_clause();
        let sql = format!("SELECT COUNT(*) FROM finance_ledger{}", clause);
        let count = bind_scalar(sqlx::query_scalar::<_, i64>(&sql), args)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Every entry matching `filter`, newest transaction first.
    pub async fn list(&self, filter: &LedgerFilter) -> DbResult<Vec<LedgerEntry>> {
        let (clause, args) = filter.where_clause();
        let sql = format!(
            "SELECT {} FROM finance_ledger{} ORDER BY transaction_at DESC, id ASC",
            ENTRY_COLUMNS, clause
        );
        let entries = bind_rows(sqlx::query_as::<_, LedgerEntry>(&sql), args)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    /// Both rows of one billing event, debit first.
    pub async fn by_event(&self, event_id: &str) -> DbResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM finance_ledger WHERE event_id = ?1 ORDER BY side DESC",
            ENTRY_COLUMNS
        );
        let entries = sqlx::query_as::<_, LedgerEntry>(&sql)
            .bind(event_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    /// Entries whose reference matches exactly (invoice number or payment
    /// reference), oldest first.
    pub async fn by_reference(&self, reference: &str) -> DbResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM finance_ledger WHERE reference = ?1 ORDER BY transaction_at ASC, side DESC",
            ENTRY_COLUMNS
        );
        let entries = sqlx::query_as::<_, LedgerEntry>(&sql)
            .bind(reference)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    /// `Σ credit − Σ debit` for one account.
    pub async fn account_balance(&self, account: &str) -> DbResult<Money> {
        let cents: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(CASE WHEN side = 'CREDIT' THEN amount_cents ELSE -amount_cents END), 0)
            FROM finance_ledger
            WHERE account = ?1
            "#,
        )
        .bind(account)
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::from_cents(cents))
    }

    /// `Σ credit − Σ debit` for every account in the ledger.
    pub async fn balances(&self) -> DbResult<BTreeMap<String, Money>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT account,
                   COALESCE(SUM(CASE WHEN side = 'CREDIT' THEN amount_cents ELSE -amount_cents END), 0)
            FROM finance_ledger
            GROUP BY account
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(account, cents)| (account, Money::from_cents(cents)))
            .collect())
    }

    /// Account names in the ledger, sorted.
    pub async fn distinct_accounts(&self) -> DbResult<Vec<String>> {
        let accounts: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT account FROM finance_ledger ORDER BY account ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(accounts)
    }

    /// `(Σ debit, Σ credit)` over entries matching `filter`.
    pub async fn side_totals(&self, filter: &LedgerFilter) -> DbResult<(Money, Money)> {
        let (clause, args) = filter.where_clause();
        let sql = format!(
            r#"
            SELECT COALESCE(SUM(CASE WHEN side = 'DEBIT' THEN amount_cents ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN side = 'CREDIT' THEN amount_cents ELSE 0 END), 0)
            FROM finance_ledger{}
            "#,
            clause
        );
        let (debits, credits) = bind_rows(sqlx::query_as::<_, (i64, i64)>(&sql), args)
            .fetch_one(&self.pool)
            .await?;

        Ok((Money::from_cents(debits), Money::from_cents(credits)))
    }

    /// Events whose debit and credit sides do not match, or that have other
    /// than two rows. Empty on a healthy ledger.
    pub async fn unbalanced_events(&self) -> DbResult<Vec<String>> {
        let events: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT event_id FROM finance_ledger
            GROUP BY event_id
            HAVING COUNT(*) <> 2
                OR SUM(CASE WHEN side = 'DEBIT' THEN amount_cents ELSE -amount_cents END) <> 0
            ORDER BY event_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }
}
