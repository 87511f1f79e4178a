//! # forecourt-core: Pure Billing Logic
//!
//! This crate holds the billing rules of the fuel-and-service shop as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Forecourt Billing Architecture                     │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 HTTP layer (external)                           │   │
//! │  │   invoices, payments, refunds, ledger, reports                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │         forecourt-db: BillingService, FinanceService            │   │
//! │  │         transactions, repositories, SQLite                      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ forecourt-core (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐   │   │
//! │  │  │  money  │ │  fuel   │ │ payment │ │ invoice │ │ ledger  │   │   │
//! │  │  │  Money  │ │ prices  │ │strategy │ │  lines  │ │postings │   │   │
//! │  │  └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Invoice, Payment, LedgerEntry, ...)
//! - [`money`] - Money type with integer arithmetic (LKR cents)
//! - [`fuel`] - Fuel grades and the price table
//! - [`payment`] - Payment strategies and their registry
//! - [`invoice`] - Line assembly and invoice derivation
//! - [`ledger`] - Double-entry posting rules
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation rules
//!
//! ## Example Usage
//!
//! ```rust
//! use forecourt_core::money::Money;
//! use forecourt_core::types::TaxRate;
//!
//! let subtotal = Money::from_major(7220); // 20 L of PETROL_95
//! let vat = subtotal.calculate_tax(TaxRate::VAT);
//! assert_eq!(vat, Money::from_major(1083));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod fuel;
pub mod invoice;
pub mod ledger;
pub mod money;
pub mod payment;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use fuel::{FuelGrade, FuelPriceTable};
pub use invoice::{AssemblyMode, InvoiceTotals, LineDraft};
pub use ledger::{accounts, BillingEvent};
pub use money::Money;
pub use payment::{PaymentAttempt, PaymentStrategy, ProcessingOutcome, StrategyRegistry};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Days between issue and due date unless configured otherwise.
pub const DEFAULT_DUE_DAYS: i64 = 30;

/// Largest page the list queries will return.
pub const MAX_PAGE_SIZE: u32 = 200;
