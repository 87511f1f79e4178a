//! # Billing Service
//!
//! Invoice issuance, payment capture and refunds. Each write runs in one
//! SQLite transaction; an early return drops the transaction and rolls
//! back everything it wrote.
//!
//! ## Payment Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  record_payment(request)                                                │
//! │                                                                         │
//! │  preflight (no lock)                                                    │
//! │   ├── invoice exists?            → INVOICE_NOT_FOUND                    │
//! │   ├── amount > 0?                → AMOUNT_NON_POSITIVE                  │
//! │   ├── amount ≤ balance?          → AMOUNT_EXCEEDS_BALANCE               │
//! │   ├── strategy for method?       → UNSUPPORTED_PAYMENT_METHOD           │
//! │   ├── strategy.validate()        → VALIDATION_FAILED                    │
//! │   └── gateway latency (awaited)                                         │
//! │                                                                         │
//! │  BEGIN IMMEDIATE                                                        │
//! │   ├── lock invoice row           → INVOICE_NOT_FOUND                    │
//! │   ├── amount ≤ balance? (again, under the lock)                         │
//! │   ├── strategy.process()         → PROCESSING_FAILED                    │
//! │   ├── INSERT payment (reference = transaction id)                       │
//! │   ├── UPDATE invoice (paid, balance, status from InvoiceTotals)         │
//! │   └── INSERT ledger pair                                                │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The balance check under the lock is the one that counts: concurrent
//! payments queue on the write lock and each sees the balance the previous
//! one committed.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::error::{BillingError, BillingResult};
use crate::config::BillingConfig;
use crate::pool::Database;
use crate::repository::booking::BookingRepository;
use crate::repository::invoice::{InvoiceRepository, InvoiceSort};
use crate::repository::ledger::LedgerRepository;
use crate::repository::payment::PaymentRepository;
use forecourt_core::invoice::{assemble_lines, InvoiceTotals};
use forecourt_core::ledger::SYSTEM_ACTOR;
use forecourt_core::validation::validate_search_query;
use forecourt_core::{
    AssemblyMode, BillingEvent, CoreError, FuelGrade, FuelPriceTable, Invoice, InvoiceLine,
    InvoiceStatus, LedgerEntry, Money, Page, Payment, PaymentAttempt, PaymentMethod,
    ProcessingOutcome, SortDirection, StrategyRegistry,
};

// =============================================================================
// Requests
// =============================================================================

/// A payment against an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub invoice_id: String,
    pub amount: Money,
    pub method: PaymentMethod,
    /// Terminal or gateway reference; replaced by the transaction id.
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub actor: Option<String>,
}

impl PaymentRequest {
    pub fn new(invoice_id: impl Into<String>, amount: Money, method: PaymentMethod) -> Self {
        PaymentRequest {
            invoice_id: invoice_id.into(),
            amount,
            method,
            reference: None,
            notes: None,
            actor: None,
        }
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// A refund against an invoice. Always paid out in cash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub invoice_id: String,
    pub amount: Money,
    pub reason: String,
    pub actor: Option<String>,
}

impl RefundRequest {
    pub fn new(invoice_id: impl Into<String>, amount: Money, reason: impl Into<String>) -> Self {
        RefundRequest {
            invoice_id: invoice_id.into(),
            amount,
            reason: reason.into(),
            actor: None,
        }
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Dashboard counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingSummary {
    pub total_invoices: i64,
    /// UNPAID and PARTIAL.
    pub unpaid: i64,
    pub overdue: i64,
    pub total_outstanding: Money,
    /// Σ paid over invoices created since the first of the month.
    pub monthly_revenue: Money,
}

/// Net payments taken on one UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub amount: Money,
}

// =============================================================================
// Invoice Numbers
// =============================================================================

/// `INV-<epoch-ms>`, strictly increasing within the process.
///
/// Two processes can still mint the same number; the UNIQUE constraint
/// turns that into a retryable conflict.
#[derive(Debug, Default)]
struct InvoiceNumbers {
    last: AtomicI64,
}

impl InvoiceNumbers {
    fn next(&self, now: DateTime<Utc>) -> String {
        let now_ms = now.timestamp_millis();
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now_ms.max(last + 1)))
            .unwrap_or_else(|last| last);
        format!("INV-{}", now_ms.max(previous + 1))
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Service
// =============================================================================

/// Billing operations over one database.
///
/// Cheap to clone; the price table and strategy registry are shared and
/// never change after construction.
#[derive(Debug, Clone)]
pub struct BillingService {
    db: Database,
    config: BillingConfig,
    prices: Arc<FuelPriceTable>,
    strategies: Arc<StrategyRegistry>,
    numbers: Arc<InvoiceNumbers>,
}

impl BillingService {
    /// Creates a service with the cash, card and online strategies.
    pub fn new(db: Database, config: BillingConfig, prices: FuelPriceTable) -> Self {
        Self::with_strategies(db, config, prices, StrategyRegistry::standard())
    }

    pub fn with_strategies(
        db: Database,
        config: BillingConfig,
        prices: FuelPriceTable,
        strategies: StrategyRegistry,
    ) -> Self {
        BillingService {
            db,
            config,
            prices: Arc::new(prices),
            strategies: Arc::new(strategies),
            numbers: Arc::new(InvoiceNumbers::default()),
        }
    }

    /// Creates a service priced from the stored `fuel_prices` rows, falling
    /// back to the standard table when none are stored.
    pub async fn from_stored_prices(db: Database, config: BillingConfig) -> BillingResult<Self> {
        let prices = match db.fuel_prices().load_table().await? {
            Some(table) => table,
            None => {
                info!("No stored fuel prices, using the standard table");
                FuelPriceTable::standard()
            }
        };
        Ok(Self::new(db, config, prices))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn prices(&self) -> &FuelPriceTable {
        &self.prices
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    // -------------------------------------------------------------------------
    // Invoice issuance
    // -------------------------------------------------------------------------

    /// Issues an invoice with the booking's service fee and fuel.
    pub async fn create_invoice_from_booking(&self, booking_id: &str) -> BillingResult<Invoice> {
        self.issue_invoice(booking_id, AssemblyMode::Full).await
    }

    /// Issues an invoice for the booking's fuel only.
    pub async fn create_fuel_only_invoice_from_booking(&self, booking_id: &str) -> BillingResult<Invoice> {
        self.issue_invoice(booking_id, AssemblyMode::FuelOnly).await
    }

    #[instrument(skip(self))]
    async fn issue_invoice(&self, booking_id: &str, mode: AssemblyMode) -> BillingResult<Invoice> {
        let mut tx = self.db.begin_write().await?;

        let booking = BookingRepository::find(&mut *tx, booking_id)
            .await?
            .ok_or_else(|| BillingError::BookingNotFound(booking_id.to_string()))?;

        if InvoiceRepository::exists_for_booking(&mut *tx, booking_id).await? {
            warn!("Booking already invoiced");
            return Err(BillingError::InvoiceAlreadyExists(booking_id.to_string()));
        }

        let service = match (mode, booking.service_type_id.as_deref()) {
            (AssemblyMode::Full, Some(service_id)) => {
                BookingRepository::find_service_type(&mut *tx, service_id).await?
            }
            _ => None,
        };

        let drafts = assemble_lines(&booking, service.as_ref(), &self.prices, mode)?;
        let totals = InvoiceTotals::from_lines(&drafts, self.config.vat_rate)?;

        let now = Utc::now();
        let invoice = Invoice {
            id: new_id(),
            invoice_number: self.numbers.next(now),
            booking_id: Some(booking.id.clone()),
            subtotal_cents: totals.subtotal.cents(),
            tax_cents: totals.tax.cents(),
            total_cents: totals.total.cents(),
            paid_cents: totals.paid.cents(),
            balance_cents: totals.balance.cents(),
            status: totals.status,
            notes: None,
            created_at: now,
            due_at: now + Duration::days(self.config.due_days),
            updated_at: now,
        };

        let lines: Vec<InvoiceLine> = drafts
            .iter()
            .enumerate()
            .map(|(position, draft)| InvoiceLine {
                id: new_id(),
                invoice_id: invoice.id.clone(),
                position: position as i64,
                kind: draft.kind,
                reference_id: draft.reference_id.clone(),
                description: draft.description.clone(),
                quantity: draft.quantity,
                unit_price_cents: draft.unit_price.cents(),
                line_total_cents: draft.line_total().cents(),
            })
            .collect();

        InvoiceRepository::insert_with_lines(&mut *tx, &invoice, &lines)
            .await
            .map_err(|e| {
                if e.is_unique_violation_on("invoices.booking_id") {
                    BillingError::InvoiceAlreadyExists(booking_id.to_string())
                } else {
                    e.into()
                }
            })?;

        let event = BillingEvent::InvoiceIssued {
            invoice_number: invoice.invoice_number.clone(),
            booking_id: invoice.booking_id.clone(),
            total: invoice.total(),
        };
        post(&mut *tx, &event, now, Some(SYSTEM_ACTOR)).await?;

        tx.commit().await?;

        info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            lines = lines.len(),
            total = %invoice.total(),
            status = %invoice.status,
            "Invoice issued"
        );

        Ok(invoice)
    }

    /// Price of `liters` of a grade at the running table, to the cent.
    ///
    /// Quotes are not billed, so fractional liters count.
    pub fn quote_fuel(&self, grade_tag: &str, liters: f64) -> BillingResult<Money> {
        let grade: FuelGrade = grade_tag.parse()?;
        if self.prices.price_of(grade).is_zero() {
            return Err(BillingError::UnknownFuelGrade(grade_tag.to_string()));
        }
        if !liters.is_finite() || liters < 0.0 {
            return Err(CoreError::InvalidFuelQuantity { liters }.into());
        }
        Ok(self.prices.fuel_cost(grade, liters))
    }

    // -------------------------------------------------------------------------
    // Payments
    // -------------------------------------------------------------------------

    /// Captures a payment against an invoice.
    ///
    /// The returned payment carries the strategy's transaction id as its
    /// reference.
    #[instrument(
        skip(self, request),
        fields(invoice_id = %request.invoice_id, method = %request.method, amount = %request.amount)
    )]
    pub async fn record_payment(&self, request: PaymentRequest) -> BillingResult<Payment> {
        let current = self
            .db
            .invoices()
            .get_by_id(&request.invoice_id)
            .await?
            .ok_or_else(|| BillingError::InvoiceNotFound(request.invoice_id.clone()))?;
        check_capture(request.amount, current.balance())?;

        let strategy = self.strategies.resolve(request.method)?;
        let attempt = PaymentAttempt {
            amount: request.amount,
            reference: request.reference.clone(),
        };
        if let Err(reason) = strategy.validate(&attempt) {
            warn!(reason = %reason, "Payment rejected by strategy");
            return Err(BillingError::ValidationFailed(reason.to_string()));
        }

        if self.config.simulate_gateway_latency {
            let latency = strategy.gateway_latency();
            if !latency.is_zero() {
                debug!(latency_ms = latency.as_millis() as u64, "Waiting on gateway");
                tokio::time::sleep(latency).await;
            }
        }

        let mut tx = self.db.begin_write().await?;

        let invoice = InvoiceRepository::lock(&mut *tx, &request.invoice_id)
            .await?
            .ok_or_else(|| BillingError::InvoiceNotFound(request.invoice_id.clone()))?;
        check_capture(request.amount, invoice.balance())?;

        let now = Utc::now();
        let transaction_id = match strategy.process(&attempt, now) {
            ProcessingOutcome::Success { transaction_id, .. } => transaction_id,
            ProcessingOutcome::Failure { reason } => {
                warn!(reason = %reason, "Payment processing failed");
                return Err(BillingError::ProcessingFailed(reason));
            }
        };

        let payment = Payment {
            id: new_id(),
            invoice_id: Some(invoice.id.clone()),
            method: request.method,
            amount_cents: request.amount.cents(),
            reference: Some(transaction_id),
            notes: request.notes,
            created_by: request.actor,
            created_at: now,
        };
        PaymentRepository::insert(&mut *tx, &payment).await?;

        let totals = settled(&invoice).with_payment(payment.amount());
        InvoiceRepository::apply_totals(&mut *tx, &invoice.id, &totals, now).await?;

        let event = BillingEvent::PaymentCaptured {
            invoice_number: invoice.invoice_number.clone(),
            account: strategy.account_name().to_string(),
            reference: payment.reference.clone(),
            amount: payment.amount(),
        };
        post(&mut *tx, &event, now, payment.created_by.as_deref()).await?;

        tx.commit().await?;

        info!(
            payment_id = %payment.id,
            invoice_number = %invoice.invoice_number,
            balance = %totals.balance,
            status = %totals.status,
            "Payment recorded"
        );

        Ok(payment)
    }

    /// Refunds part of what was paid on an invoice, in cash.
    #[instrument(skip(self, request), fields(invoice_id = %request.invoice_id, amount = %request.amount))]
    pub async fn process_refund(&self, request: RefundRequest) -> BillingResult<Payment> {
        let mut tx = self.db.begin_write().await?;

        let invoice = InvoiceRepository::lock(&mut *tx, &request.invoice_id)
            .await?
            .ok_or_else(|| BillingError::InvoiceNotFound(request.invoice_id.clone()))?;

        if !request.amount.is_positive() {
            return Err(BillingError::AmountNonPositive(request.amount));
        }
        if request.amount > invoice.paid() {
            warn!(paid = %invoice.paid(), "Refund exceeds paid amount");
            return Err(BillingError::RefundExceedsPaid {
                amount: request.amount,
                paid: invoice.paid(),
            });
        }

        let now = Utc::now();
        let method = PaymentMethod::Cash;
        let refund = Payment {
            id: new_id(),
            invoice_id: Some(invoice.id.clone()),
            method,
            amount_cents: -request.amount.cents(),
            reference: Some(format!("REFUND-{}", now.timestamp_millis())),
            notes: Some(format!("Refund: {}", request.reason)),
            created_by: request.actor,
            created_at: now,
        };
        PaymentRepository::insert(&mut *tx, &refund).await?;

        let totals = settled(&invoice).with_payment(refund.amount());
        InvoiceRepository::apply_totals(&mut *tx, &invoice.id, &totals, now).await?;

        let event = BillingEvent::RefundIssued {
            invoice_number: invoice.invoice_number.clone(),
            account: self.strategies.account_name(method).to_string(),
            reference: refund.reference.clone(),
            amount: refund.amount(),
        };
        post(&mut *tx, &event, now, refund.created_by.as_deref()).await?;

        tx.commit().await?;

        info!(
            payment_id = %refund.id,
            invoice_number = %invoice.invoice_number,
            paid = %totals.paid,
            status = %totals.status,
            "Refund issued"
        );

        Ok(refund)
    }

    // -------------------------------------------------------------------------
    // Invoice queries
    // -------------------------------------------------------------------------

    pub async fn find_invoice(&self, id: &str) -> BillingResult<Invoice> {
        self.db
            .invoices()
            .get_by_id(id)
            .await?
            .ok_or_else(|| BillingError::InvoiceNotFound(id.to_string()))
    }

    pub async fn find_invoice_by_number(&self, invoice_number: &str) -> BillingResult<Invoice> {
        self.db
            .invoices()
            .get_by_number(invoice_number)
            .await?
            .ok_or_else(|| BillingError::InvoiceNotFound(invoice_number.to_string()))
    }

    pub async fn invoices_for_booking(&self, booking_id: &str) -> BillingResult<Vec<Invoice>> {
        Ok(self.db.invoices().list_by_booking(booking_id).await?)
    }

    /// Lines of an invoice in position order.
    pub async fn invoice_lines(&self, invoice_id: &str) -> BillingResult<Vec<InvoiceLine>> {
        Ok(self.db.invoices().get_lines(invoice_id).await?)
    }

    /// Captures and refunds of an invoice, oldest first.
    pub async fn invoice_payments(&self, invoice_id: &str) -> BillingResult<Vec<Payment>> {
        Ok(self.db.payments().list_by_invoice(invoice_id).await?)
    }

    pub async fn list_invoices(
        &self,
        page: u32,
        size: u32,
        sort: InvoiceSort,
        direction: SortDirection,
    ) -> BillingResult<Page<Invoice>> {
        Ok(self.db.invoices().list_page(page, size, sort, direction).await?)
    }

    /// Substring search over invoice number and booking id.
    pub async fn search_invoices(&self, query: &str) -> BillingResult<Vec<Invoice>> {
        let query = validate_search_query(query).map_err(|e| BillingError::ValidationFailed(e.to_string()))?;
        Ok(self.db.invoices().search(&query).await?)
    }

    pub async fn list_invoices_by_status(&self, status: InvoiceStatus) -> BillingResult<Vec<Invoice>> {
        Ok(self.db.invoices().list_by_status(status).await?)
    }

    pub async fn list_unpaid(&self) -> BillingResult<Vec<Invoice>> {
        Ok(self.db.invoices().list_unpaid().await?)
    }

    pub async fn list_overdue(&self, as_of: DateTime<Utc>) -> BillingResult<Vec<Invoice>> {
        Ok(self.db.invoices().list_overdue(as_of).await?)
    }

    pub async fn list_invoices_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BillingResult<Vec<Invoice>> {
        Ok(self.db.invoices().list_by_date_range(from, to).await?)
    }

    /// Deletes an invoice; payments stay as history without an invoice.
    #[instrument(skip(self))]
    pub async fn delete_invoice(&self, id: &str) -> BillingResult<()> {
        self.db.invoices().delete(id).await.map_err(|e| match e {
            crate::error::DbError::NotFound { .. } => BillingError::InvoiceNotFound(id.to_string()),
            other => other.into(),
        })?;
        info!(invoice_id = %id, "Invoice deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Payment queries
    // -------------------------------------------------------------------------

    /// Every payment, newest first.
    pub async fn list_payments(&self) -> BillingResult<Vec<Payment>> {
        Ok(self.db.payments().list_all().await?)
    }

    pub async fn payments_by_method(&self, method: PaymentMethod) -> BillingResult<Vec<Payment>> {
        Ok(self.db.payments().list_by_method(method).await?)
    }

    pub async fn payments_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BillingResult<Vec<Payment>> {
        Ok(self.db.payments().list_between(from, to).await?)
    }

    pub async fn search_payments(&self, reference: &str) -> BillingResult<Vec<Payment>> {
        let reference =
            validate_search_query(reference).map_err(|e| BillingError::ValidationFailed(e.to_string()))?;
        Ok(self.db.payments().search_reference(&reference).await?)
    }

    // -------------------------------------------------------------------------
    // Reports
    // -------------------------------------------------------------------------

    pub async fn billing_summary(&self) -> BillingResult<BillingSummary> {
        self.billing_summary_at(Utc::now()).await
    }

    /// Summary as seen at `as_of`.
    pub async fn billing_summary_at(&self, as_of: DateTime<Utc>) -> BillingResult<BillingSummary> {
        let invoices = self.db.invoices();
        let month_start = Utc
            .with_ymd_and_hms(as_of.year(), as_of.month(), 1, 0, 0, 0)
            .single()
            .unwrap_or(as_of);

        Ok(BillingSummary {
            total_invoices: invoices.count().await?,
            unpaid: invoices.count_open().await?,
            overdue: invoices.count_overdue(as_of).await?,
            total_outstanding: invoices.total_outstanding().await?,
            monthly_revenue: invoices.revenue_between(month_start, as_of).await?,
        })
    }

    /// Net payments per UTC day in `[from, to]`, refunds subtracted.
    /// Days without payments are omitted.
    pub async fn daily_payments(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BillingResult<Vec<DailyTotal>> {
        let payments = self.db.payments().list_between(from, to).await?;

        let mut by_day: BTreeMap<NaiveDate, Money> = BTreeMap::new();
        for payment in &payments {
            *by_day.entry(payment.created_at.date_naive()).or_default() += payment.amount();
        }

        Ok(by_day
            .into_iter()
            .map(|(date, amount)| DailyTotal { date, amount })
            .collect())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Totals re-derived from the locked row.
fn settled(invoice: &Invoice) -> InvoiceTotals {
    InvoiceTotals::derive(invoice.subtotal(), invoice.tax(), invoice.paid())
}

fn check_capture(amount: Money, balance: Money) -> BillingResult<()> {
    if !amount.is_positive() {
        return Err(BillingError::AmountNonPositive(amount));
    }
    if amount > balance {
        warn!(amount = %amount, balance = %balance, "Payment exceeds balance");
        return Err(BillingError::AmountExceedsBalance { amount, balance });
    }
    Ok(())
}

/// Writes the ledger pair for `event` on the open transaction.
async fn post(
    conn: &mut SqliteConnection,
    event: &BillingEvent,
    at: DateTime<Utc>,
    actor: Option<&str>,
) -> BillingResult<[LedgerEntry; 2]> {
    let event_id = new_id();
    let entries = event.posting().into_entries(&event_id, at, actor, new_id);
    LedgerRepository::insert_pair(conn, &entries).await?;
    Ok(entries)
}
