//! # forecourt-db: Storage and Services for Forecourt Billing
//!
//! This crate owns every database operation of the billing core and the
//! transaction boundaries around them. It uses SQLite with sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Forecourt Billing Data Flow                         │
//! │                                                                         │
//! │  HTTP handler (record payment)                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  forecourt-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌───────────────┐   ┌──────────────────┐ │   │
//! │  │   │   Services    │   │ Repositories  │   │    Database      │ │   │
//! │  │   │               │   │               │   │    (pool.rs)     │ │   │
//! │  │   │ BillingService│──►│ InvoiceRepo   │──►│ SqlitePool       │ │   │
//! │  │   │ FinanceService│   │ PaymentRepo   │   │ WAL, busy wait   │ │   │
//! │  │   │               │   │ LedgerRepo    │   │ migrations       │ │   │
//! │  │   └───────────────┘   └───────────────┘   └──────────────────┘ │   │
//! │  │          │                                                      │   │
//! │  │          ▼                                                      │   │
//! │  │   forecourt-core: pricing, strategies, postings (pure)          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (invoice, payment, ledger, ...)
//! - [`service`] - Billing and finance services
//! - [`config`] - Billing configuration from the environment
//!
//! ## Usage
//!
//! ```rust,ignore
//! use forecourt_db::{BillingConfig, BillingService, Database, PaymentRequest};
//! use forecourt_core::{Money, PaymentMethod};
//!
//! let config = BillingConfig::from_env()?;
//! let db = Database::new(config.db_config()).await?;
//! let prices = config.load_fuel_prices()?;
//! let billing = BillingService::new(db, config, prices);
//!
//! let invoice = billing.create_invoice_from_booking("booking-42").await?;
//! billing
//!     .record_payment(PaymentRequest::new(&invoice.id, Money::from_major(100), PaymentMethod::Cash))
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{BillingConfig, ConfigError};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use service::{
    BillingError, BillingResult, BillingService, BillingSummary, DailyTotal, ErrorCode,
    FinanceService, PaymentRequest, PeriodSummary, RefundRequest,
};

// Repository re-exports for convenience
pub use repository::booking::BookingRepository;
pub use repository::fuel_price::FuelPriceRepository;
pub use repository::inventory::InventoryRepository;
pub use repository::invoice::{InvoiceRepository, InvoiceSort};
pub use repository::ledger::{LedgerFilter, LedgerRepository, LedgerSort};
pub use repository::payment::{MethodTotal, PaymentRepository};
