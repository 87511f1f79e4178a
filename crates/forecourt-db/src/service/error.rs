//! # Billing Error
//!
//! The single error type returned by every billing and finance operation.
//!
//! ## Error Codes
//! ```text
//! ┌────────────────────────────────────┬──────────────────────────────────────┐
//! │ Code                               │ Raised when                          │
//! ├────────────────────────────────────┼──────────────────────────────────────┤
//! │ INVOICE_NOT_FOUND                  │ handle has no invoice                │
//! │ BOOKING_NOT_FOUND                  │ handle has no booking                │
//! │ INVOICE_ALREADY_EXISTS_FOR_BOOKING │ booking already invoiced             │
//! │ AMOUNT_NON_POSITIVE                │ payment / refund amount ≤ 0          │
//! │ AMOUNT_EXCEEDS_BALANCE             │ payment > balance                    │
//! │ REFUND_EXCEEDS_PAID                │ refund > paid                        │
//! │ VALIDATION_FAILED                  │ strategy or input rejection          │
//! │ PROCESSING_FAILED                  │ strategy process failure             │
//! │ UNSUPPORTED_PAYMENT_METHOD         │ no strategy for the tag              │
//! │ UNKNOWN_FUEL_GRADE                 │ booking names an unpriced grade      │
//! │ STORE_CONFLICT                     │ lock contention; retry the call      │
//! │ INTERNAL                           │ anything else                        │
//! └────────────────────────────────────┴──────────────────────────────────────┘
//! ```
//!
//! Every error drops the open transaction, so nothing the failed call wrote
//! survives.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::error::DbError;
use forecourt_core::{CoreError, Money};

/// Machine-readable error code, serialised as the SCREAMING_SNAKE_CASE tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvoiceNotFound,
    BookingNotFound,
    InvoiceAlreadyExistsForBooking,
    AmountNonPositive,
    AmountExceedsBalance,
    RefundExceedsPaid,
    ValidationFailed,
    ProcessingFailed,
    UnsupportedPaymentMethod,
    UnknownFuelGrade,
    StoreConflict,
    Internal,
}

/// Billing operation errors.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),

    #[error("Booking not found: {0}")]
    BookingNotFound(String),

    #[error("Invoice already exists for booking {0}")]
    InvoiceAlreadyExists(String),

    #[error("Amount must be positive, got {0}")]
    AmountNonPositive(Money),

    #[error("Payment amount {amount} exceeds invoice balance {balance}")]
    AmountExceedsBalance { amount: Money, balance: Money },

    #[error("Refund amount {amount} exceeds paid amount {paid}")]
    RefundExceedsPaid { amount: Money, paid: Money },

    /// Strategy or input rejection; the text is the reason.
    #[error("Payment validation failed: {0}")]
    ValidationFailed(String),

    #[error("Payment processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Unsupported payment method: {0}")]
    UnsupportedPaymentMethod(String),

    #[error("Unknown fuel grade: {0}")]
    UnknownFuelGrade(String),

    /// Another writer held the store past the busy timeout.
    #[error("Concurrent modification, retry: {0}")]
    StoreConflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillingError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BillingError::InvoiceNotFound(_) => ErrorCode::InvoiceNotFound,
            BillingError::BookingNotFound(_) => ErrorCode::BookingNotFound,
            BillingError::InvoiceAlreadyExists(_) => ErrorCode::InvoiceAlreadyExistsForBooking,
            BillingError::AmountNonPositive(_) => ErrorCode::AmountNonPositive,
            BillingError::AmountExceedsBalance { .. } => ErrorCode::AmountExceedsBalance,
            BillingError::RefundExceedsPaid { .. } => ErrorCode::RefundExceedsPaid,
            BillingError::ValidationFailed(_) => ErrorCode::ValidationFailed,
            BillingError::ProcessingFailed(_) => ErrorCode::ProcessingFailed,
            BillingError::UnsupportedPaymentMethod(_) => ErrorCode::UnsupportedPaymentMethod,
            BillingError::UnknownFuelGrade(_) => ErrorCode::UnknownFuelGrade,
            BillingError::StoreConflict(_) => ErrorCode::StoreConflict,
            BillingError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Only a store conflict is worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        self.code() == ErrorCode::StoreConflict
    }
}

/// Converts database errors to billing errors.
///
/// Lock contention and a clashing invoice number become
/// `STORE_CONFLICT`; everything else is `INTERNAL` and logged.
impl From<DbError> for BillingError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Conflict(msg) => BillingError::StoreConflict(msg),
            DbError::PoolExhausted => BillingError::StoreConflict("connection pool exhausted".to_string()),
            DbError::UniqueViolation { ref field, .. } if field == "invoices.invoice_number" => {
                BillingError::StoreConflict(err.to_string())
            }
            other => {
                error!(error = %other, "Database operation failed");
                BillingError::Internal(other.to_string())
            }
        }
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

/// Converts core errors to billing errors.
impl From<CoreError> for BillingError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnknownFuelGrade(grade) => BillingError::UnknownFuelGrade(grade),
            CoreError::UnsupportedPaymentMethod(tag) => BillingError::UnsupportedPaymentMethod(tag),
            CoreError::InvalidFuelQuantity { .. } | CoreError::AmountOutOfRange(_) => {
                BillingError::ValidationFailed(err.to_string())
            }
            CoreError::Validation(e) => BillingError::ValidationFailed(e.to_string()),
            other => BillingError::Internal(other.to_string()),
        }
    }
}

/// Result type for billing operations.
pub type BillingResult<T> = Result<T, BillingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use forecourt_core::ValidationError;

    #[test]
    fn test_codes_serialize_as_tags() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::InvoiceAlreadyExistsForBooking).unwrap(),
            "\"INVOICE_ALREADY_EXISTS_FOR_BOOKING\""
        );
        assert_eq!(serde_json::to_string(&ErrorCode::StoreConflict).unwrap(), "\"STORE_CONFLICT\"");
    }

    #[test]
    fn test_messages() {
        let err = BillingError::ValidationFailed("reference is required".to_string());
        assert_eq!(err.to_string(), "Payment validation failed: reference is required");

        let err = BillingError::from(CoreError::UnsupportedPaymentMethod("CHEQUE".to_string()));
        assert_eq!(err.code(), ErrorCode::UnsupportedPaymentMethod);
        assert_eq!(err.to_string(), "Unsupported payment method: CHEQUE");
    }

    #[test]
    fn test_db_error_mapping() {
        let err = BillingError::from(DbError::Conflict("database is locked".to_string()));
        assert_eq!(err.code(), ErrorCode::StoreConflict);
        assert!(err.is_retryable());

        let err = BillingError::from(DbError::duplicate("invoices.invoice_number", "INV-1"));
        assert_eq!(err.code(), ErrorCode::StoreConflict);

        let err = BillingError::from(DbError::QueryFailed("no such table".to_string()));
        assert_eq!(err.code(), ErrorCode::Internal);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_core_error_mapping() {
        let err = BillingError::from(CoreError::UnknownFuelGrade("KEROSENE".to_string()));
        assert_eq!(err.code(), ErrorCode::UnknownFuelGrade);

        let err = BillingError::from(CoreError::InvalidFuelQuantity { liters: 0.5 });
        assert_eq!(err.code(), ErrorCode::ValidationFailed);

        let err = BillingError::from(CoreError::AmountOutOfRange("Fuel - PETROL_95".to_string()));
        assert_eq!(err.code(), ErrorCode::ValidationFailed);

        let err = BillingError::from(CoreError::Validation(ValidationError::Required {
            field: "reference".to_string(),
        }));
        assert_eq!(err.to_string(), "Payment validation failed: reference is required");
    }
}
