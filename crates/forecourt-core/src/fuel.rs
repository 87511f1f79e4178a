//! # Fuel Price Table
//!
//! Maps a fuel grade to its price per liter.
//!
//! ```text
//! ┌──────────────┬───────────────┐
//! │ Grade        │ LKR / liter   │
//! ├──────────────┼───────────────┤
//! │ PETROL_92    │ 299.00        │
//! │ PETROL_95    │ 361.00        │
//! │ DIESEL_AUTO  │ 277.00        │
//! │ DIESEL_SUPER │ 313.00        │
//! └──────────────┴───────────────┘
//! ```
//!
//! The table is built once at process start (defaults, a JSON file, or the
//! `fuel_prices` table) and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Fuel Grade
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum FuelGrade {
    #[serde(rename = "PETROL_92")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "PETROL_92"))]
    Petrol92,
    #[serde(rename = "PETROL_95")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "PETROL_95"))]
    Petrol95,
    #[serde(rename = "DIESEL_AUTO")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "DIESEL_AUTO"))]
    DieselAuto,
    #[serde(rename = "DIESEL_SUPER")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "DIESEL_SUPER"))]
    DieselSuper,
}

impl FuelGrade {
    pub const ALL: [FuelGrade; 4] = [
        FuelGrade::Petrol92,
        FuelGrade::Petrol95,
        FuelGrade::DieselAuto,
        FuelGrade::DieselSuper,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            FuelGrade::Petrol92 => "PETROL_92",
            FuelGrade::Petrol95 => "PETROL_95",
            FuelGrade::DieselAuto => "DIESEL_AUTO",
            FuelGrade::DieselSuper => "DIESEL_SUPER",
        }
    }
}

impl fmt::Display for FuelGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FuelGrade {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        FuelGrade::ALL
            .into_iter()
            .find(|grade| grade.as_str().eq_ignore_ascii_case(tag))
            .ok_or_else(|| CoreError::UnknownFuelGrade(tag.to_string()))
    }
}

// =============================================================================
// Price Table
// =============================================================================

/// Immutable grade → price-per-liter lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuelPriceTable {
    prices: BTreeMap<FuelGrade, Money>,
}

impl FuelPriceTable {
    /// Deployment default prices.
    pub fn standard() -> Self {
        Self::from_prices([
            (FuelGrade::Petrol92, Money::from_major(299)),
            (FuelGrade::Petrol95, Money::from_major(361)),
            (FuelGrade::DieselAuto, Money::from_major(277)),
            (FuelGrade::DieselSuper, Money::from_major(313)),
        ])
    }

    /// Builds a table from explicit rows. Later rows win on duplicates.
    pub fn from_prices(rows: impl IntoIterator<Item = (FuelGrade, Money)>) -> Self {
        FuelPriceTable {
            prices: rows.into_iter().collect(),
        }
    }

    /// Parses a JSON object of grade → minor units, e.g.
    /// `{"PETROL_92": 29900, "PETROL_95": 36100}`.
    ///
    /// Grades missing from the file keep no price and look up as zero.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let raw: BTreeMap<FuelGrade, i64> =
            serde_json::from_str(json).map_err(|e| CoreError::InvalidPriceTable(e.to_string()))?;

        if let Some((grade, cents)) = raw.iter().find(|(_, cents)| **cents < 0) {
            return Err(CoreError::InvalidPriceTable(format!(
                "negative price {} for {}",
                cents, grade
            )));
        }

        Ok(Self::from_prices(
            raw.into_iter().map(|(grade, cents)| (grade, Money::from_cents(cents))),
        ))
    }

    /// Price per liter. Zero for a grade the table does not carry.
    pub fn price_of(&self, grade: FuelGrade) -> Money {
        self.prices.get(&grade).copied().unwrap_or_default()
    }

    /// Price per liter for a raw tag; unknown tags price at zero.
    pub fn price_of_tag(&self, tag: &str) -> Money {
        tag.parse::<FuelGrade>()
            .map(|grade| self.price_of(grade))
            .unwrap_or_default()
    }

    /// Quote for a fractional volume, rounded to the cent.
    ///
    /// ```rust
    /// use forecourt_core::fuel::{FuelGrade, FuelPriceTable};
    ///
    /// let table = FuelPriceTable::standard();
    /// assert_eq!(table.fuel_cost(FuelGrade::Petrol95, 20.5).cents(), 740_050);
    /// ```
    pub fn fuel_cost(&self, grade: FuelGrade, liters: f64) -> Money {
        self.price_of(grade).multiply_fractional(liters)
    }

    /// Every priced grade, in grade order.
    pub fn all(&self) -> Vec<(FuelGrade, Money)> {
        self.prices.iter().map(|(g, p)| (*g, *p)).collect()
    }
}

impl Default for FuelPriceTable {
    fn default() -> Self {
        FuelPriceTable::standard()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
