//! Billing configuration.
//!
//! Loaded from environment variables with fallback to defaults.
//!
//! | Variable | Default |
//! |---|---|
//! | `FORECOURT_DB_PATH` | `forecourt.db` |
//! | `FORECOURT_DB_MAX_CONNECTIONS` | `5` |
//! | `FORECOURT_VAT_BPS` | `1500` |
//! | `FORECOURT_INVOICE_DUE_DAYS` | `30` |
//! | `FORECOURT_SIMULATE_GATEWAY_LATENCY` | `true` |
//! | `FORECOURT_FUEL_PRICES_PATH` | unset (standard prices) |

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::pool::DbConfig;
use forecourt_core::validation::validate_tax_rate_bps;
use forecourt_core::{FuelPriceTable, TaxRate, DEFAULT_DUE_DAYS};

/// Billing core configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Pool size
    pub max_connections: u32,

    /// VAT applied to every invoice
    pub vat_rate: TaxRate,

    /// Days from issue to due date
    pub due_days: i64,

    /// Await the card/online gateway delay before committing
    pub simulate_gateway_latency: bool,

    /// JSON map of grade → price per liter in cents
    pub fuel_prices_path: Option<PathBuf>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        BillingConfig {
            database_path: PathBuf::from("forecourt.db"),
            max_connections: 5,
            vat_rate: TaxRate::VAT,
            due_days: DEFAULT_DUE_DAYS,
            simulate_gateway_latency: true,
            fuel_prices_path: None,
        }
    }
}

impl BillingConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = BillingConfig::default();

        let vat_bps: u32 = parse_or(&lookup, "FORECOURT_VAT_BPS", defaults.vat_rate.bps())?;
        validate_tax_rate_bps(vat_bps).map_err(|e| ConfigError::InvalidValue {
            key: "FORECOURT_VAT_BPS".to_string(),
            reason: e.to_string(),
        })?;

        let due_days: i64 = parse_or(&lookup, "FORECOURT_INVOICE_DUE_DAYS", defaults.due_days)?;
        if due_days < 0 {
            return Err(ConfigError::InvalidValue {
                key: "FORECOURT_INVOICE_DUE_DAYS".to_string(),
                reason: "must not be negative".to_string(),
            });
        }

        let max_connections: u32 =
            parse_or(&lookup, "FORECOURT_DB_MAX_CONNECTIONS", defaults.max_connections)?;
        if max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                key: "FORECOURT_DB_MAX_CONNECTIONS".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(BillingConfig {
            database_path: lookup("FORECOURT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            max_connections,
            vat_rate: TaxRate::from_bps(vat_bps),
            due_days,
            simulate_gateway_latency: parse_or(
                &lookup,
                "FORECOURT_SIMULATE_GATEWAY_LATENCY",
                defaults.simulate_gateway_latency,
            )?,
            fuel_prices_path: lookup("FORECOURT_FUEL_PRICES_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    /// Settings for tests: no gateway delay.
    pub fn for_tests() -> Self {
        BillingConfig {
            simulate_gateway_latency: false,
            ..Default::default()
        }
    }

    /// Database settings derived from this configuration.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database_path).max_connections(self.max_connections)
    }

    /// The price table: the configured file, or the standard prices.
    pub fn load_fuel_prices(&self) -> Result<FuelPriceTable, ConfigError> {
        match &self.fuel_prices_path {
            None => Ok(FuelPriceTable::standard()),
            Some(path) => {
                let json = std::fs::read_to_string(path).map_err(|e| ConfigError::FuelPrices {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                FuelPriceTable::from_json(&json).map_err(|e| ConfigError::FuelPrices {
                    path: path.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("cannot parse '{}'", raw),
        }),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Cannot load fuel prices from {path:?}: {reason}")]
    FuelPrices { path: PathBuf, reason: String },
}
