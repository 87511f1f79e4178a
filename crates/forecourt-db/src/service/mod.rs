//! # Services
//!
//! Transaction boundaries for the billing core.
//!
//! - [`BillingService`](billing::BillingService) - invoices, payments, refunds, billing reports
//! - [`FinanceService`](finance::FinanceService) - ledger queries and export
//! - [`BillingError`](error::BillingError) - the error every operation returns

pub mod billing;
pub mod error;
pub mod finance;

pub use billing::{BillingService, BillingSummary, DailyTotal, PaymentRequest, RefundRequest};
pub use error::{BillingError, BillingResult, ErrorCode};
pub use finance::{FinanceService, PeriodSummary};
