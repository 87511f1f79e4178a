//! # Repository Module
//!
//! Database repository implementations for the billing core.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Billing service                                                        │
//! │       │                                                                 │
//! │       │  reads:  db.invoices().list_unpaid()      (pool)                │
//! │       │  writes: InvoiceRepository::lock(&mut tx) (transaction)         │
//! │       ▼                                                                 │
//! │  InvoiceRepository / PaymentRepository / LedgerRepository               │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Read methods take `&self` and use the pool. Methods that must join a
//! caller's transaction are associated functions taking
//! `&mut SqliteConnection`, so the service decides where the transaction
//! begins and ends.
//!
//! ## Available Repositories
//!
//! - [`InvoiceRepository`](invoice::InvoiceRepository) - Invoices, lines, row lock
//! - [`PaymentRepository`](payment::PaymentRepository) - Payments and refunds
//! - [`LedgerRepository`](ledger::LedgerRepository) - Append-only finance ledger
//! - [`BookingRepository`](booking::BookingRepository) - Bookings and service types (read-only)
//! - [`InventoryRepository`](inventory::InventoryRepository) - Stock valuation (read-only)
//! - [`FuelPriceRepository`](fuel_price::FuelPriceRepository) - Externalised fuel prices

pub mod booking;
pub mod fuel_price;
pub mod inventory;
pub mod invoice;
pub mod ledger;
pub mod payment;

use forecourt_core::MAX_PAGE_SIZE;

/// Clamps a page request to `(limit, offset)`.
pub(crate) fn page_bounds(page: u32, size: u32) -> (i64, i64) {
    let size = size.clamp(1, MAX_PAGE_SIZE) as i64;
    (size, page as i64 * size)
}

/// Wraps a search term for a substring `LIKE`.
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds() {
        assert_eq!(page_bounds(0, 20), (20, 0));
        assert_eq!(page_bounds(3, 20), (20, 60));
        assert_eq!(page_bounds(0, 0), (1, 0));
        assert_eq!(page_bounds(1, 10_000), (MAX_PAGE_SIZE as i64, MAX_PAGE_SIZE as i64));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("INV-1"), "%INV-1%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
