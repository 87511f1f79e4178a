//! # Error Types
//!
//! Domain-specific error types for forecourt-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  forecourt-core errors (this file)                                      │
//! │  ├── CoreError        - Pricing / assembly / tag failures               │
//! │  └── ValidationError  - Payment input rejections (strategy reasons)     │
//! │                                                                         │
//! │  forecourt-db errors (separate crate)                                   │
//! │  ├── DbError          - Database operation failures                     │
//! │  └── BillingError     - What callers see, one kind per error code       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → BillingError → HTTP layer          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Booking names a fuel grade that is not in the price table.
    ///
    /// ## When This Occurs
    /// - Tag doesn't parse as a known grade (`"KEROSENE"`)
    /// - Tag parses but the loaded table prices it at zero
    #[error("Unknown fuel grade: {0}")]
    UnknownFuelGrade(String),

    /// Booking asks for less than one whole liter, or for a quantity that
    /// is not a finite number.
    ///
    /// Fuel lines are billed in whole liters, so `0.4 L` truncates to an
    /// empty line.
    #[error("Fuel quantity {liters} L is not billable")]
    InvalidFuelQuantity { liters: f64 },

    /// A line or invoice total does not fit in the money type.
    #[error("Amount out of range: {0}")]
    AmountOutOfRange(String),

    /// Method tag has no strategy.
    #[error("Unsupported payment method: {0}")]
    UnsupportedPaymentMethod(String),

    #[error("Unknown invoice status: {0}")]
    UnknownInvoiceStatus(String),

    #[error("Unknown ledger side: {0}")]
    UnknownEntrySide(String),

    /// A fuel price file could not be parsed.
    #[error("Invalid fuel price table: {0}")]
    InvalidPriceTable(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// The `Display` text of each variant is the human-readable reason returned
/// by payment strategies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value is under a method minimum.
    #[error("{field} must be at least {min}")]
    BelowMinimum { field: String, min: String },

    /// Invalid format (e.g., non-alphanumeric reference).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
