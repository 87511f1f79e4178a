//! # Domain Types
//!
//! Core domain types used throughout the billing core.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Invoice      │   │  InvoiceLine    │   │    Payment      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  invoice_number │   │  invoice_id(FK) │   │  invoice_id(FK?)│       │
//! │  │  booking_id?    │   │  kind           │   │  method         │       │
//! │  │  status         │   │  quantity       │   │  amount_cents ± │       │
//! │  │  total/paid/bal │   │  unit_price     │   │  reference      │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  LedgerEntry    │   │  InvoiceStatus  │   │ PaymentMethod   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  event_id       │   │  Unpaid         │   │  Cash           │       │
//! │  │  account        │   │  Partial        │   │  Card           │       │
//! │  │  side           │   │  Paid           │   │  Online         │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  Read-only inputs: Booking, ServiceType, InventoryItem                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every billing entity has:
//! - `id`: UUID v4 - immutable, used for relations
//! - Business ID: (invoice_number, payment reference) - human-readable

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::CoreError;
use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01%, so the shop's 15% VAT is 1500 bps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Standard VAT applied to every invoice (15%).
    pub const VAT: TaxRate = TaxRate(1500);

    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::VAT
    }
}

// =============================================================================
// Invoice Status
// =============================================================================

/// Settlement state of an invoice.
///
/// Never set from outside input; always derived from `paid` and `balance`
/// by [`crate::invoice::derive_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    /// Nothing paid yet.
    Unpaid,
    /// Something paid, balance still open.
    Partial,
    /// Balance is zero (or negative).
    Paid,
}

impl InvoiceStatus {
    /// Returns the stored tag, e.g. `"PARTIAL"`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "UNPAID",
            InvoiceStatus::Partial => "PARTIAL",
            InvoiceStatus::Paid => "PAID",
        }
    }
}

impl Default for InvoiceStatus {
    fn default() -> Self {
        InvoiceStatus::Unpaid
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UNPAID" => Ok(InvoiceStatus::Unpaid),
            "PARTIAL" => Ok(InvoiceStatus::Partial),
            "PAID" => Ok(InvoiceStatus::Paid),
            other => Err(CoreError::UnknownInvoiceStatus(other.to_string())),
        }
    }
}

// =============================================================================
// Invoice Line Kind
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineKind {
    /// Labour / service fee.
    Service,
    /// Parts, including fuel.
    Part,
}

// =============================================================================
// Payment Method
// =============================================================================

/// Payment method tag. Each tag has exactly one registered strategy.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Cash at the counter.
    Cash,
    /// Card on the shop terminal.
    Card,
    /// Bank transfer or wallet through a gateway.
    Online,
}

impl PaymentMethod {
    /// Every known method, in tag order.
    pub const ALL: [PaymentMethod; 3] = [PaymentMethod::Cash, PaymentMethod::Card, PaymentMethod::Online];

    /// Returns the method tag, e.g. `"CARD"`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Card => "CARD",
            PaymentMethod::Online => "ONLINE",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a method tag as sent by the HTTP layer.
///
/// ```rust
/// use forecourt_core::types::PaymentMethod;
///
/// assert_eq!("card".parse::<PaymentMethod>().unwrap(), PaymentMethod::Card);
/// assert!("CHEQUE".parse::<PaymentMethod>().is_err());
/// ```
impl FromStr for PaymentMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CASH" => Ok(PaymentMethod::Cash),
            "CARD" => Ok(PaymentMethod::Card),
            "ONLINE" => Ok(PaymentMethod::Online),
            _ => Err(CoreError::UnsupportedPaymentMethod(s.to_string())),
        }
    }
}

// =============================================================================
// Ledger Side
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntrySide {
    Debit,
    Credit,
}

impl EntrySide {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntrySide::Debit => "DEBIT",
            EntrySide::Credit => "CREDIT",
        }
    }
}

impl fmt::Display for EntrySide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntrySide {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBIT" => Ok(EntrySide::Debit),
            "CREDIT" => Ok(EntrySide::Credit),
            other => Err(CoreError::UnknownEntrySide(other.to_string())),
        }
    }
}

// =============================================================================
// Invoice
// =============================================================================

/// The settled bill for one booking.
///
/// Lines and payments are not embedded; they are queried by `invoice_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Invoice {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Human-readable number, unique across the store (`INV-<epoch-ms>`).
    pub invoice_number: String,

    /// Source booking. Nulled when the booking is removed.
    pub booking_id: Option<String>,

    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub balance_cents: i64,
    pub status: InvoiceStatus,

    pub notes: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub due_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    #[inline]
    pub fn tax(&self) -> Money {
        Money::from_cents(self.tax_cents)
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn paid(&self) -> Money {
        Money::from_cents(self.paid_cents)
    }

    #[inline]
    pub fn balance(&self) -> Money {
        Money::from_cents(self.balance_cents)
    }
}

// =============================================================================
// Invoice Line
// =============================================================================

/// One priced row on an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InvoiceLine {
    pub id: String,
    pub invoice_id: String,
    /// Zero-based order of the line on the invoice.
    pub position: i64,
    pub kind: LineKind,
    /// Service type or inventory item this line was priced from.
    pub reference_id: Option<String>,
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// `quantity × unit_price`.
    pub line_total_cents: i64,
}

impl InvoiceLine {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

// =============================================================================
// Payment
// =============================================================================

/// A signed money movement against an invoice.
///
/// Positive amounts are captures, negative amounts are refunds. Never
/// mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    /// Owning invoice. Nulled when the invoice is deleted.
    pub invoice_id: Option<String>,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    /// Gateway transaction id minted by the strategy, or `REFUND-<epoch-ms>`.
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    #[inline]
    pub fn is_refund(&self) -> bool {
        self.amount_cents < 0
    }
}

// =============================================================================
// Ledger Entry
// =============================================================================

/// One side of a double-entry posting. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LedgerEntry {
    pub id: String,
    /// Shared by the debit and credit rows of one billing event.
    pub event_id: String,
    #[ts(as = "String")]
    pub transaction_at: DateTime<Utc>,
    pub account: String,
    pub side: EntrySide,
    /// Always positive; the side carries the direction.
    pub amount_cents: i64,
    /// Invoice number or payment reference.
    pub reference: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Read-only Inputs
// =============================================================================

/// A customer booking. Owned by the booking module; read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Booking {
    pub id: String,
    pub customer_id: Option<String>,
    pub service_type_id: Option<String>,
    /// Fuel grade tag as entered, e.g. `PETROL_95`.
    pub fuel_type: Option<String>,
    pub liters_requested: Option<f64>,
    pub status: String,
    pub description: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// A booking requests fuel when it names a grade and a positive volume.
    pub fn requests_fuel(&self) -> bool {
        self.fuel_type.is_some() && self.liters_requested.map_or(false, |l| l > 0.0)
    }
}

/// A priced service offering (oil change, wash, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ServiceType {
    pub id: String,
    pub name: String,
    pub price_cents: Option<i64>,
}

impl ServiceType {
    /// Service price, zero when not set.
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents.unwrap_or(0))
    }
}

/// Stock-keeping item; only its valuation feeds billing reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryItem {
    pub id: String,
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub on_hand: i64,
    pub unit_price_cents: Option<i64>,
    pub is_active: bool,
}

// =============================================================================
// Paging
// =============================================================================

/// Sort direction for paged queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl Default for SortDirection {
    fn default() -> Self {
        SortDirection::Desc
    }
}

/// One page of results plus totals for pagination controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Zero-based page index.
    pub page: u32,
    pub size: u32,
    pub total_elements: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: u32, size: u32, total_elements: i64) -> Self {
        let total_pages = if size == 0 {
            0
        } else {
            (total_elements + size as i64 - 1) / size as i64
        };
        Page {
            items,
            page,
            size,
            total_elements,
            total_pages,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
