//! # Money Module
//!
//! Provides the `Money` type for every amount the billing core touches:
//! line totals, tax, invoice balances, payments, refunds and ledger rows.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  With doubles:                                                          │
//! │    115.00 / 2 = 57.5, 57.5 + 57.5 = 115.00000000000001 (sometimes)     │
//! │    balance = total - paid  →  -1.4e-14  →  "PAID"? "PARTIAL"?          │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units (LKR cents)                          │
//! │    11500 / 2 = 5750, 5750 + 5750 = 11500                                │
//! │    balance comparisons are exact                                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use forecourt_core::money::Money;
//!
//! let service_fee = Money::from_major(100);       // LKR 100.00
//! let fuel = Money::from_cents(36100) * 20_i64;   // 20 L at LKR 361.00
//! assert_eq!((service_fee + fuel).cents(), 732_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents of LKR).
///
/// ## Design Decisions
/// - **i64 (signed)**: refunds are stored as negative payment amounts
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Derives**: full serde support; serialized as a bare integer
///
/// ## Where Money Flows
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  service price ──┐                                                      │
/// │                  ├──► line total ──► subtotal ──► tax ──► total        │
/// │  fuel price × L ─┘                                        │             │
/// │                                                           ▼             │
/// │  payment / refund ──► paid ──────────────────────────► balance         │
/// │         │                                                               │
/// │         └──► ledger debit + ledger credit                               │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    ///
    /// ```rust
    /// use forecourt_core::money::Money;
    ///
    /// let price = Money::from_cents(36100); // LKR 361.00
    /// assert_eq!(price.cents(), 36100);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from whole rupees.
    #[inline]
    pub const fn from_major(major: i64) -> Self {
        Money(major * 100)
    }

    /// Creates a Money value from major and minor units (rupees and cents).
    ///
    /// ```rust
    /// use forecourt_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(57, 50).cents(), 5750);
    /// assert_eq!(Money::from_major_minor(-40, 25).cents(), -4025);
    /// ```
    ///
    /// For negative amounts, only the major unit should be negative.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents (smallest currency unit).
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (rupees) portion, truncated toward zero.
    #[inline]
    pub const fn rupees(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit (cents) portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    ///
    /// ```rust
    /// use forecourt_core::money::Money;
    ///
    /// let refund = Money::from_cents(-4000);
    /// assert_eq!(refund.abs().cents(), 4000);
    /// ```
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Calculates tax at the given rate, rounding half up at the cent.
    ///
    /// ## Implementation
    /// Integer math: `(amount * bps + 5000) / 10000`.
    /// The +5000 provides rounding (5000/10000 = 0.5).
    ///
    /// ```rust
    /// use forecourt_core::money::Money;
    /// use forecourt_core::types::TaxRate;
    ///
    /// let subtotal = Money::from_major(100);
    /// let vat = subtotal.calculate_tax(TaxRate::from_bps(1500));
    /// assert_eq!(vat.cents(), 1500); // LKR 15.00
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        // i128 keeps large invoices from overflowing
        let tax_cents = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money::from_cents(tax_cents as i64)
    }

    /// [`Money::calculate_tax`], or `None` when the tax does not fit.
    pub fn checked_tax(&self, rate: TaxRate) -> Option<Money> {
        let tax_cents = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        i64::try_from(tax_cents).ok().map(Money::from_cents)
    }

    /// Multiplies money by a quantity.
    ///
    /// ```rust
    /// use forecourt_core::money::Money;
    ///
    /// let per_liter = Money::from_cents(36100);
    /// assert_eq!(per_liter.multiply_quantity(20).cents(), 722_000);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// `quantity × self`, or `None` on overflow.
    ///
    /// ```rust
    /// use forecourt_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(36100).checked_multiply_quantity(2), Some(Money::from_cents(72200)));
    /// assert_eq!(Money::from_cents(36100).checked_multiply_quantity(i64::MAX), None);
    /// ```
    #[inline]
    pub const fn checked_multiply_quantity(&self, qty: i64) -> Option<Self> {
        match self.0.checked_mul(qty) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Multiplies money by a fractional factor, rounding to the nearest cent.
    ///
    /// Only used for quotes (price × fractional liters); invoice lines always
    /// go through [`Money::multiply_quantity`].
    pub fn multiply_fractional(&self, factor: f64) -> Self {
        Money((self.0 as f64 * factor).round() as i64)
    }

    /// Renders the amount as a plain decimal with two places, e.g. `1234.50`.
    ///
    /// This is the format used in CSV exports and reports.
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{}{}.{:02}", sign, self.rupees().abs(), self.cents_part())
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Human-readable format, e.g. `LKR 115.00`.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LKR {}", self.to_decimal_string())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
