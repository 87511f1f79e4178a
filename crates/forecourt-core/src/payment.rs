//! # Payment Strategies
//!
//! One strategy per payment method. A strategy knows which ledger account
//! receives the money, which inputs it accepts, and how to mint a
//! transaction id.
//!
//! ## Method Contracts
//! ```text
//! ┌────────┬─────────────────┬──────────────────────────────────┬──────────────────┐
//! │ Method │ Ledger account  │ Rejected when                    │ Transaction id   │
//! ├────────┼─────────────────┼──────────────────────────────────┼──────────────────┤
//! │ CASH   │ CASH            │ amount ≤ 0                       │ CASH-<epoch-ms>  │
//! │ CARD   │ CARD_PAYMENTS   │ amount ≤ 0, reference missing,   │ CARD-<epoch-ms>  │
//! │        │                 │ < 10 chars, not alphanumeric     │                  │
//! │ ONLINE │ ONLINE_PAYMENTS │ amount < 10.00, reference        │ ONLINE-<epoch-ms>│
//! │        │                 │ missing, < 8 chars, not [\w-]    │                  │
//! └────────┴─────────────────┴──────────────────────────────────┴──────────────────┘
//! ```
//!
//! Strategies are pure: `process` takes the clock as an argument and
//! reports the simulated gateway delay through [`PaymentStrategy::gateway_latency`]
//! so the async caller can await it outside any lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::{CoreError, ValidationError};
use crate::ledger::accounts;
use crate::money::Money;
use crate::types::PaymentMethod;
use crate::validation::{
    validate_alphanumeric, validate_gateway_charset, validate_minimum_amount,
    validate_payment_amount, validate_reference, ValidationResult,
};

/// Shortest card terminal reference.
pub const CARD_REFERENCE_MIN_LEN: usize = 10;

/// Shortest online gateway reference.
pub const ONLINE_REFERENCE_MIN_LEN: usize = 8;

/// Smallest amount the online gateway accepts (LKR 10.00).
pub const ONLINE_MIN_AMOUNT: Money = Money::from_major(10);

// =============================================================================
// Strategy Inputs / Outputs
// =============================================================================

/// What a strategy sees of a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub amount: Money,
    /// Terminal or gateway reference supplied by the cashier.
    pub reference: Option<String>,
}

impl PaymentAttempt {
    pub fn new(amount: Money, reference: Option<impl Into<String>>) -> Self {
        PaymentAttempt {
            amount,
            reference: reference.map(Into::into),
        }
    }
}

/// Result of running a payment through its strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    Success {
        message: String,
        transaction_id: String,
    },
    Failure {
        reason: String,
    },
}

impl ProcessingOutcome {
    pub fn success(message: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        ProcessingOutcome::Success {
            message: message.into(),
            transaction_id: transaction_id.into(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        ProcessingOutcome::Failure {
            reason: reason.into(),
        }
    }
}

fn transaction_id(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{}-{}", prefix, now.timestamp_millis())
}

// =============================================================================
// Strategy Trait
// =============================================================================

/// Per-method payment contract.
pub trait PaymentStrategy: Send + Sync + fmt::Debug {
    fn method(&self) -> PaymentMethod;

    /// Ledger account for the cash-side leg.
    fn account_name(&self) -> &'static str;

    /// Method-specific preconditions. The error's text is the reason.
    fn validate(&self, attempt: &PaymentAttempt) -> ValidationResult<()>;

    /// Mints the transaction id for an accepted attempt.
    fn process(&self, attempt: &PaymentAttempt, now: DateTime<Utc>) -> ProcessingOutcome;

    /// Simulated gateway round trip.
    fn gateway_latency(&self) -> Duration {
        Duration::ZERO
    }
}

// =============================================================================
// Cash
// =============================================================================

/// Counter cash. Settles immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct CashStrategy;

impl PaymentStrategy for CashStrategy {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Cash
    }

    fn account_name(&self) -> &'static str {
        accounts::CASH
    }

    fn validate(&self, attempt: &PaymentAttempt) -> ValidationResult<()> {
        validate_payment_amount(attempt.amount)
    }

    fn process(&self, _attempt: &PaymentAttempt, now: DateTime<Utc>) -> ProcessingOutcome {
        ProcessingOutcome::success(
            "Cash payment processed successfully",
            transaction_id("CASH", now),
        )
    }
}

// =============================================================================
// Card
// =============================================================================

/// Card on the shop terminal. The cashier keys in the terminal reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct CardStrategy;

impl CardStrategy {
    fn check_reference(reference: Option<&str>) -> ValidationResult<()> {
        let reference = validate_reference(reference, CARD_REFERENCE_MIN_LEN)?;
        validate_alphanumeric(reference)
    }
}

impl PaymentStrategy for CardStrategy {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Card
    }

    fn account_name(&self) -> &'static str {
        accounts::CARD_PAYMENTS
    }

    fn validate(&self, attempt: &PaymentAttempt) -> ValidationResult<()> {
        validate_payment_amount(attempt.amount)?;
        Self::check_reference(attempt.reference.as_deref())
    }

    fn process(&self, attempt: &PaymentAttempt, now: DateTime<Utc>) -> ProcessingOutcome {
        if Self::check_reference(attempt.reference.as_deref()).is_err() {
            return ProcessingOutcome::failure("Invalid card transaction reference");
        }
        ProcessingOutcome::success(
            "Card payment processed successfully",
            transaction_id("CARD", now),
        )
    }

    fn gateway_latency(&self) -> Duration {
        Duration::from_millis(100)
    }
}

// =============================================================================
// Online
// =============================================================================

/// Bank transfer or wallet payment confirmed by a gateway reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnlineStrategy;

impl OnlineStrategy {
    fn check_reference(reference: Option<&str>) -> ValidationResult<()> {
        let reference = validate_reference(reference, ONLINE_REFERENCE_MIN_LEN)?;
        validate_gateway_charset(reference)
    }
}

impl PaymentStrategy for OnlineStrategy {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Online
    }

    fn account_name(&self) -> &'static str {
        accounts::ONLINE_PAYMENTS
    }

    fn validate(&self, attempt: &PaymentAttempt) -> ValidationResult<()> {
        validate_minimum_amount(attempt.amount, ONLINE_MIN_AMOUNT)?;
        Self::check_reference(attempt.reference.as_deref())
    }

    fn process(&self, attempt: &PaymentAttempt, now: DateTime<Utc>) -> ProcessingOutcome {
        if Self::check_reference(attempt.reference.as_deref()).is_err() {
            return ProcessingOutcome::failure("Invalid online payment reference");
        }
        ProcessingOutcome::success(
            "Online payment processed successfully",
            transaction_id("ONLINE", now),
        )
    }

    fn gateway_latency(&self) -> Duration {
        Duration::from_millis(200)
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Method tag → strategy. Built once at startup, read-only afterwards.
///
/// ```rust
/// use forecourt_core::payment::StrategyRegistry;
/// use forecourt_core::types::PaymentMethod;
///
/// let registry = StrategyRegistry::standard();
/// assert_eq!(registry.account_name(PaymentMethod::Card), "CARD_PAYMENTS");
/// assert!(registry.has_strategy(PaymentMethod::Online));
/// ```
#[derive(Debug, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<PaymentMethod, Box<dyn PaymentStrategy>>,
}

impl StrategyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cash, card and online.
    pub fn standard() -> Self {
        Self::new()
            .with(CashStrategy)
            .with(CardStrategy)
            .with(OnlineStrategy)
    }

    /// Adds a strategy, replacing any earlier one for the same method.
    pub fn with(mut self, strategy: impl PaymentStrategy + 'static) -> Self {
        self.register(Box::new(strategy));
        self
    }

    pub fn register(&mut self, strategy: Box<dyn PaymentStrategy>) {
        self.strategies.insert(strategy.method(), strategy);
    }

    /// Looks up the strategy for a method.
    pub fn resolve(&self, method: PaymentMethod) -> Result<&dyn PaymentStrategy, CoreError> {
        self.strategies
            .get(&method)
            .map(|s| s.as_ref())
            .ok_or_else(|| CoreError::UnsupportedPaymentMethod(method.to_string()))
    }

    pub fn has_strategy(&self, method: PaymentMethod) -> bool {
        self.strategies.contains_key(&method)
    }

    /// Registered methods in tag order.
    pub fn supported_methods(&self) -> Vec<PaymentMethod> {
        let mut methods: Vec<_> = self.strategies.keys().copied().collect();
        methods.sort();
        methods
    }

    /// Ledger account for a method; the sentinel account when unregistered.
    pub fn account_name(&self, method: PaymentMethod) -> &'static str {
        self.strategies
            .get(&method)
            .map(|s| s.account_name())
            .unwrap_or(accounts::UNKNOWN_PAYMENT)
    }

    /// Validates an attempt with the method's strategy.
    ///
    /// Returns the rejection reason as text, including
    /// `Unsupported payment method: <tag>` for an unregistered method.
    pub fn validate(&self, method: PaymentMethod, attempt: &PaymentAttempt) -> Result<(), String> {
        let strategy = self.resolve(method).map_err(|e| e.to_string())?;
        strategy
            .validate(attempt)
            .map_err(|e: ValidationError| e.to_string())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
