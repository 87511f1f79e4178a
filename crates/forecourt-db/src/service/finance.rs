//! # Finance Service
//!
//! Read side of the ledger: pages, balances, period totals, CSV export.
//!
//! Account balances follow one convention for every account:
//! `Σ credit − Σ debit`. Asset accounts such as CASH therefore read
//! negative after payments come in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use super::error::{BillingError, BillingResult};
use crate::pool::Database;
use crate::repository::ledger::{LedgerFilter, LedgerSort};
use forecourt_core::{LedgerEntry, Money, Page, SortDirection};

/// Timestamp format of the CSV `Date` column.
pub const CSV_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const CSV_HEADER: [&str; 6] = ["Date", "Account", "Type", "Amount", "Reference", "Description"];

/// Totals for a reporting window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    /// Inventory valuation at the time of the call (not windowed).
    pub total_debits: Money,
    /// Σ paid over invoices created in the window.
    pub total_credits: Money,
    /// `total_credits − total_debits`.
    pub net_amount: Money,
    /// Always zero; no cash-flow source is tracked yet.
    pub cash_flow: Money,
    /// `Σ credit − Σ debit` for every account in the ledger.
    pub account_balances: BTreeMap<String, Money>,
}

/// Ledger reporting over one database.
#[derive(Debug, Clone)]
pub struct FinanceService {
    db: Database,
}

impl FinanceService {
    pub fn new(db: Database) -> Self {
        FinanceService { db }
    }

    /// One page of ledger entries.
    pub async fn ledger(
        &self,
        filter: &LedgerFilter,
        page: u32,
        size: u32,
        sort: LedgerSort,
        direction: SortDirection,
    ) -> BillingResult<Page<LedgerEntry>> {
        Ok(self.db.ledger().page(filter, page, size, sort, direction).await?)
    }

    pub async fn account_balance(&self, account: &str) -> BillingResult<Money> {
        Ok(self.db.ledger().account_balance(account).await?)
    }

    /// Account names in the ledger, sorted.
    pub async fn distinct_accounts(&self) -> BillingResult<Vec<String>> {
        Ok(self.db.ledger().distinct_accounts().await?)
    }

    /// Both rows written for one billing event.
    pub async fn event_entries(&self, event_id: &str) -> BillingResult<Vec<LedgerEntry>> {
        Ok(self.db.ledger().by_event(event_id).await?)
    }

    /// Entries carrying an invoice number or payment reference.
    pub async fn entries_for_reference(&self, reference: &str) -> BillingResult<Vec<LedgerEntry>> {
        Ok(self.db.ledger().by_reference(reference).await?)
    }

    /// `(Σ debit, Σ credit)` over the filtered entries.
    pub async fn side_totals(&self, filter: &LedgerFilter) -> BillingResult<(Money, Money)> {
        Ok(self.db.ledger().side_totals(filter).await?)
    }

    /// Events whose two rows do not balance. Empty on a healthy ledger.
    pub async fn unbalanced_events(&self) -> BillingResult<Vec<String>> {
        Ok(self.db.ledger().unbalanced_events().await?)
    }

    /// Revenue, inventory expense and per-account balances.
    #[instrument(skip(self))]
    pub async fn period_summary(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BillingResult<PeriodSummary> {
        let revenue = self.db.invoices().revenue_between(from, to).await?;
        let inventory_expense = self.db.inventory().total_value().await?;
        let account_balances = self.db.ledger().balances().await?;

        debug!(revenue = %revenue, inventory = %inventory_expense, "Period totals");

        Ok(PeriodSummary {
            total_debits: inventory_expense,
            total_credits: revenue,
            net_amount: revenue - inventory_expense,
            cash_flow: Money::zero(),
            account_balances,
        })
    }

    /// UTF-8 CSV of the filtered ledger, newest first.
    #[instrument(skip(self))]
    pub async fn export_ledger_csv(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        account: Option<&str>,
    ) -> BillingResult<Vec<u8>> {
        let filter = LedgerFilter {
            from,
            to,
            account: account.map(str::to_string),
            side: None,
        };
        let entries = self.db.ledger().list(&filter).await?;

        debug!(rows = entries.len(), "Exporting ledger");
        write_csv(&entries)
    }
}

fn write_csv(entries: &[LedgerEntry]) -> BillingResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER).map_err(csv_error)?;

    for entry in entries {
        writer
            .write_record([
                entry.transaction_at.format(CSV_DATE_FORMAT).to_string(),
                entry.account.clone(),
                entry.side.to_string(),
                entry.amount().to_decimal_string(),
                entry.reference.clone().unwrap_or_default(),
                entry.description.clone().unwrap_or_default(),
            ])
            .map_err(csv_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| BillingError::Internal(format!("CSV export failed: {}", e)))
}

fn csv_error(err: csv::Error) -> BillingError {
    BillingError::Internal(format!("CSV export failed: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use forecourt_core::EntrySide;

    fn entry(account: &str, side: EntrySide, cents: i64, reference: Option<&str>) -> LedgerEntry {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        LedgerEntry {
            id: format!("le-{}-{}", account, side),
            event_id: "evt-1".to_string(),
            transaction_at: at,
            account: account.to_string(),
            side,
            amount_cents: cents,
            reference: reference.map(str::to_string),
            description: None,
            created_by: None,
            created_at: at,
        }
    }

    #[test]
    fn test_csv_layout() {
        let bytes = write_csv(&[
            entry("CASH", EntrySide::Debit, 5750, Some("CASH-1")),
            entry("ACCOUNTS_RECEIVABLE", EntrySide::Credit, 5750, None),
        ])
        .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Date,Account,Type,Amount,Reference,Description");
        assert_eq!(lines[1], "2024-03-09 14:05:07,CASH,DEBIT,57.50,CASH-1,");
        assert_eq!(lines[2], "2024-03-09 14:05:07,ACCOUNTS_RECEIVABLE,CREDIT,57.50,,");
    }

    #[test]
    fn test_csv_quotes_commas() {
        let mut row = entry("REVENUE", EntrySide::Credit, 11500, Some("INV-1"));
        row.description = Some("Revenue from invoice INV-1, booking b-1".to_string());
        let text = String::from_utf8(write_csv(&[row]).unwrap()).unwrap();
        assert!(text.contains("\"Revenue from invoice INV-1, booking b-1\""));
    }
}
