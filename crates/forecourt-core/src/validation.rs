//! # Validation Module
//!
//! Input validation for payments and billing queries.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP layer (external)                                         │
//! │  └── Deserialization, required params                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Payment recorder                                              │
//! │  ├── amount > 0, amount ≤ balance                                       │
//! │  └── Strategy validate() ← built from THIS MODULE                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  ├── CHECK constraints on quantities and amounts                        │
//! │  └── UNIQUE invoice_number, one invoice per booking                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use forecourt_core::validation::{validate_payment_amount, validate_reference};
//! use forecourt_core::Money;
//!
//! assert!(validate_payment_amount(Money::from_major(10)).is_ok());
//! assert!(validate_reference(Some("ABCDEFGHIJ"), 10).is_ok());
//! assert!(validate_reference(Some("short"), 10).is_err());
//! ```

use crate::error::ValidationError;
use crate::money::Money;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted free-text search.
pub const MAX_SEARCH_LEN: usize = 100;

// =============================================================================
// Amount Validators
// =============================================================================

/// Validates a payment amount.
///
/// ## Rules
/// - Must be positive (> 0)
pub fn validate_payment_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    Ok(())
}

/// Validates a payment amount against a method minimum.
///
/// ```rust
/// use forecourt_core::validation::validate_minimum_amount;
/// use forecourt_core::Money;
///
/// let min = Money::from_major(10);
/// assert!(validate_minimum_amount(Money::from_major(10), min).is_ok());
/// assert!(validate_minimum_amount(Money::from_major(5), min).is_err());
/// ```
pub fn validate_minimum_amount(amount: Money, min: Money) -> ValidationResult<()> {
    if amount < min {
        return Err(ValidationError::BelowMinimum {
            field: "amount".to_string(),
            min: min.to_decimal_string(),
        });
    }

    Ok(())
}

/// Validates a tax rate in basis points.
///
/// ## Rules
/// - Must be between 0 and 10000 (0% to 100%)
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

// =============================================================================
// Reference Validators
// =============================================================================

/// Validates that a gateway reference is present and long enough.
///
/// ## Rules
/// - Must be present and not blank
/// - Must be at least `min_len` characters (after trimming)
///
/// ## Returns
/// The trimmed reference.
pub fn validate_reference(reference: Option<&str>, min_len: usize) -> ValidationResult<&str> {
    let reference = reference.map(str::trim).unwrap_or_default();

    if reference.is_empty() {
        return Err(ValidationError::Required {
            field: "reference".to_string(),
        });
    }

    if reference.chars().count() < min_len {
        return Err(ValidationError::TooShort {
            field: "reference".to_string(),
            min: min_len,
        });
    }

    Ok(reference)
}

/// Requires ASCII letters and digits only (card terminal references).
pub fn validate_alphanumeric(reference: &str) -> ValidationResult<()> {
    if !reference.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidFormat {
            field: "reference".to_string(),
            reason: "must contain only letters and numbers".to_string(),
        });
    }

    Ok(())
}

/// Requires the gateway charset `[A-Za-z0-9_-]` (online references).
pub fn validate_gateway_charset(reference: &str) -> ValidationResult<()> {
    if !reference
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "reference".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Query Validators
// =============================================================================

/// Validates a search query.
///
/// ## Rules
/// - Can be empty (matches everything)
/// - Maximum 100 characters
///
/// ## Returns
/// The trimmed query string.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.len() > MAX_SEARCH_LEN {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: MAX_SEARCH_LEN,
        });
    }

    Ok(query.to_string())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_payment_amount() {
        assert!(validate_payment_amount(Money::from_cents(1)).is_ok());
        assert!(validate_payment_amount(Money::zero()).is_err());
        assert!(validate_payment_amount(Money::from_cents(-100)).is_err());
    }

    #[test]
    fn test_validate_minimum_amount_message() {
        let err = validate_minimum_amount(Money::from_major(5), Money::from_major(10)).unwrap_err();
        assert_eq!(err.to_string(), "amount must be at least 10.00");
    }

    #[test]
    fn test_validate_reference() {
        assert_eq!(validate_reference(Some("  ABCDEFGHIJ "), 10).unwrap(), "ABCDEFGHIJ");

        assert_eq!(
            validate_reference(None, 10).unwrap_err(),
            ValidationError::Required {
                field: "reference".to_string()
            }
        );
        assert!(validate_reference(Some("   "), 10).is_err());

        let err = validate_reference(Some("short"), 10).unwrap_err();
        assert!(err.to_string().contains("reference"));
    }

    #[test]
    fn test_validate_alphanumeric() {
        assert!(validate_alphanumeric("ABC123xyz0").is_ok());
        assert!(validate_alphanumeric("ABC-123").is_err());
        assert!(validate_alphanumeric("ÄBC1234567").is_err());
    }

    #[test]
    fn test_validate_gateway_charset() {
        assert!(validate_gateway_charset("txn_2024-abc").is_ok());
        assert!(validate_gateway_charset("txn 2024").is_err());
        assert!(validate_gateway_charset("txn#2024").is_err());
    }

    #[test]
    fn test_validate_tax_rate_bps() {
        assert!(validate_tax_rate_bps(0).is_ok());
        assert!(validate_tax_rate_bps(1500).is_ok());
        assert!(validate_tax_rate_bps(10000).is_ok());
        assert!(validate_tax_rate_bps(10001).is_err());
    }

    #[test]
    fn test_validate_search_query() {
        assert_eq!(validate_search_query("  INV-17 ").unwrap(), "INV-17");
        assert!(validate_search_query(&"x".repeat(101)).is_err());
    }
}
