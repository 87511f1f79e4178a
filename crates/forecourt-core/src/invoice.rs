//! # Invoice Assembly
//!
//! Turns a booking into priced invoice lines and derives the money fields.
//!
//! ## Assembly Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Booking ──► service type? ──► SERVICE line (qty 1, service price)     │
//! │     │                                                                   │
//! │     └─────► fuel requested? ─► PART line (qty ⌊liters⌋, price/L)       │
//! │                                                                         │
//! │  lines ──► subtotal ──► tax (VAT) ──► total                             │
//! │                                                                         │
//! │  total, paid ──► balance ──► status                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`InvoiceTotals`] is the only way the store computes balance and status,
//! so the settlement invariants hold after every write.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::fuel::{FuelGrade, FuelPriceTable};
use crate::money::Money;
use crate::types::{Booking, InvoiceStatus, LineKind, ServiceType, TaxRate};

// =============================================================================
// Assembly Mode
// =============================================================================

/// Which lines to build from a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyMode {
    /// Service fee and fuel.
    Full,
    /// Fuel only; the service line is skipped even if a service type is set.
    FuelOnly,
}

// =============================================================================
// Line Draft
// =============================================================================

/// An invoice line before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDraft {
    pub kind: LineKind,
    pub reference_id: Option<String>,
    pub description: String,
    pub quantity: i64,
    pub unit_price: Money,
}

impl LineDraft {
    /// `quantity × unit_price`.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

/// Builds the service line for a booking's service type.
pub fn service_line(service: &ServiceType) -> LineDraft {
    LineDraft {
        kind: LineKind::Service,
        reference_id: Some(service.id.clone()),
        description: service.name.clone(),
        quantity: 1,
        unit_price: service.price(),
    }
}

/// Builds the fuel line for `liters` of `grade_tag`.
///
/// Quantity is the whole-liter part of the request. A tag the table does not
/// price fails with [`CoreError::UnknownFuelGrade`]; a request under one liter
/// or not finite fails with [`CoreError::InvalidFuelQuantity`]; a line total
/// past the money range fails with [`CoreError::AmountOutOfRange`].
pub fn fuel_line(grade_tag: &str, liters: f64, prices: &FuelPriceTable) -> CoreResult<LineDraft> {
    let grade: FuelGrade = grade_tag.parse()?;
    let unit_price = prices.price_of(grade);
    if unit_price.is_zero() {
        return Err(CoreError::UnknownFuelGrade(grade.to_string()));
    }

    if !liters.is_finite() || liters < 1.0 {
        return Err(CoreError::InvalidFuelQuantity { liters });
    }

    let description = format!("Fuel - {}", grade);
    let quantity = liters.floor() as i64;
    if unit_price.checked_multiply_quantity(quantity).is_none() {
        return Err(CoreError::AmountOutOfRange(description));
    }

    Ok(LineDraft {
        kind: LineKind::Part,
        reference_id: None,
        description,
        quantity,
        unit_price,
    })
}

/// Builds every line for a booking.
///
/// `service` is the booking's service type, already loaded by the caller.
pub fn assemble_lines(
    booking: &Booking,
    service: Option<&ServiceType>,
    prices: &FuelPriceTable,
    mode: AssemblyMode,
) -> CoreResult<Vec<LineDraft>> {
    let mut lines = Vec::with_capacity(2);

    if mode == AssemblyMode::Full {
        if let Some(service) = service {
            lines.push(service_line(service));
        }
    }

    if booking.requests_fuel() {
        if let (Some(tag), Some(liters)) = (booking.fuel_type.as_deref(), booking.liters_requested) {
            lines.push(fuel_line(tag, liters, prices)?);
        }
    }

    Ok(lines)
}

// =============================================================================
// Totals
// =============================================================================

/// Derived money fields of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub paid: Money,
    pub balance: Money,
    pub status: InvoiceStatus,
}

impl InvoiceTotals {
    /// Totals for a fresh invoice: nothing paid.
    ///
    /// ```rust
    /// use forecourt_core::invoice::InvoiceTotals;
    /// use forecourt_core::{InvoiceStatus, Money, TaxRate};
    ///
    /// let totals = InvoiceTotals::issue(Money::from_major(100), TaxRate::VAT);
    /// assert_eq!(totals.total, Money::from_major(115));
    /// assert_eq!(totals.status, InvoiceStatus::Unpaid);
    /// ```
    pub fn issue(subtotal: Money, rate: TaxRate) -> Self {
        let tax = subtotal.calculate_tax(rate);
        Self::derive(subtotal, tax, Money::zero())
    }

    /// Totals over a set of lines.
    ///
    /// Fails with [`CoreError::AmountOutOfRange`] when a line, the subtotal
    /// or the taxed total overflows.
    pub fn from_lines(lines: &[LineDraft], rate: TaxRate) -> CoreResult<Self> {
        let mut subtotal = Money::zero();
        for line in lines {
            subtotal = line
                .unit_price
                .checked_multiply_quantity(line.quantity)
                .and_then(|total| subtotal.checked_add(total))
                .ok_or_else(|| CoreError::AmountOutOfRange(line.description.clone()))?;
        }

        let tax = subtotal.checked_tax(rate).ok_or_else(|| out_of_range("tax"))?;
        subtotal.checked_add(tax).ok_or_else(|| out_of_range("total"))?;
        Ok(Self::derive(subtotal, tax, Money::zero()))
    }

    /// Re-derives total, balance and status from the stored inputs.
    pub fn derive(subtotal: Money, tax: Money, paid: Money) -> Self {
        let total = subtotal + tax;
        let balance = total - paid;
        InvoiceTotals {
            subtotal,
            tax,
            total,
            paid,
            balance,
            status: derive_status(paid, balance),
        }
    }

    /// Same invoice with `delta` added to paid (negative for refunds).
    pub fn with_payment(&self, delta: Money) -> Self {
        Self::derive(self.subtotal, self.tax, self.paid + delta)
    }
}

fn out_of_range(what: &str) -> CoreError {
    CoreError::AmountOutOfRange(format!("invoice {}", what))
}

/// Settlement status from paid and balance.
///
/// A non-positive balance is PAID first, so a zero-total invoice is PAID
/// the moment it is issued.
pub fn derive_status(paid: Money, balance: Money) -> InvoiceStatus {
    if !balance.is_positive() {
        InvoiceStatus::Paid
    } else if paid.is_positive() {
        InvoiceStatus::Partial
    } else {
        InvoiceStatus::Unpaid
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn booking(fuel: Option<&str>, liters: Option<f64>, service: Option<&str>) -> Booking {
        Booking {
            id: "b-1".to_string(),
            customer_id: Some("c-1".to_string()),
            service_type_id: service.map(str::to_string),
            fuel_type: fuel.map(str::to_string),
            liters_requested: liters,
            status: "COMPLETED".to_string(),
            description: None,
            created_at: Utc::now(),
        }
    }

    fn oil_change() -> ServiceType {
        ServiceType {
            id: "st-1".to_string(),
            name: "Oil Change".to_string(),
            price_cents: Some(10_000),
        }
    }

    #[test]
    fn test_service_booking_lines() {
        let service = oil_change();
        let lines = assemble_lines(
            &booking(None, None, Some("st-1")),
            Some(&service),
            &FuelPriceTable::standard(),
            AssemblyMode::Full,
        )
        .unwrap();

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].kind, LineKind::Service);
        assert_eq!(lines[0].quantity, 1);
        assert_eq!(lines[0].description, "Oil Change");

        let totals = InvoiceTotals::from_lines(&lines, TaxRate::VAT).unwrap();
        assert_eq!(totals.subtotal.cents(), 10_000);
        assert_eq!(totals.tax.cents(), 1_500);
        assert_eq!(totals.total.cents(), 11_500);
        assert_eq!(totals.balance.cents(), 11_500);
        assert_eq!(totals.status, InvoiceStatus::Unpaid);
    }

    #[test]
    fn test_unpriced_service_bills_zero() {
        let service = ServiceType {
            price_cents: None,
            ..oil_change()
        };
        let line = service_line(&service);
        assert!(line.unit_price.is_zero());
        assert!(line.line_total().is_zero());
    }

    #[test]
    fn test_fuel_booking_lines() {
        let lines = assemble_lines(
            &booking(Some("PETROL_95"), Some(20.0), None),
            None,
            &FuelPriceTable::standard(),
            AssemblyMode::Full,
        )
        .unwrap();

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].kind, LineKind::Part);
        assert_eq!(lines[0].quantity, 20);
        assert_eq!(lines[0].description, "Fuel - PETROL_95");

        let totals = InvoiceTotals::from_lines(&lines, TaxRate::VAT).unwrap();
        assert_eq!(totals.subtotal.cents(), 722_000);
        assert_eq!(totals.tax.cents(), 108_300);
        assert_eq!(totals.total.cents(), 830_300);
    }

    #[test]
    fn test_fractional_liters_truncate() {
        let line = fuel_line("DIESEL_AUTO", 12.9, &FuelPriceTable::standard()).unwrap();
        assert_eq!(line.quantity, 12);
        assert_eq!(line.line_total(), Money::from_major(277 * 12));
    }

    #[test]
    fn test_sub_liter_request_rejected() {
        let err = fuel_line("DIESEL_AUTO", 0.4, &FuelPriceTable::standard()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidFuelQuantity { .. }));
    }

    #[test]
    fn test_unbounded_fuel_request_rejected() {
        let prices = FuelPriceTable::standard();

        let err = fuel_line("PETROL_95", 1.0e15, &prices).unwrap_err();
        assert!(matches!(err, CoreError::AmountOutOfRange(_)));

        for liters in [f64::INFINITY, f64::NAN] {
            let err = fuel_line("PETROL_95", liters, &prices).unwrap_err();
            assert!(matches!(err, CoreError::InvalidFuelQuantity { .. }));
        }
    }

    #[test]
    fn test_totals_overflow_rejected() {
        let line = LineDraft {
            kind: LineKind::Service,
            reference_id: None,
            description: "Fleet contract".to_string(),
            quantity: 1,
            unit_price: Money::from_cents(i64::MAX / 2 + 1),
        };

        let err = InvoiceTotals::from_lines(&[line.clone(), line.clone()], TaxRate::VAT).unwrap_err();
        assert!(matches!(err, CoreError::AmountOutOfRange(what) if what == "Fleet contract"));

        let near_max = LineDraft {
            unit_price: Money::from_cents(i64::MAX - 100),
            ..line
        };
        let err = InvoiceTotals::from_lines(&[near_max], TaxRate::VAT).unwrap_err();
        assert!(matches!(err, CoreError::AmountOutOfRange(what) if what == "invoice total"));
    }

    #[test]
    fn test_unknown_grade_rejected() {
        let err = fuel_line("KEROSENE", 10.0, &FuelPriceTable::standard()).unwrap_err();
        assert!(matches!(err, CoreError::UnknownFuelGrade(_)));

        let partial = FuelPriceTable::from_prices([(FuelGrade::Petrol92, Money::from_major(299))]);
        let err = fuel_line("PETROL_95", 10.0, &partial).unwrap_err();
        assert!(matches!(err, CoreError::UnknownFuelGrade(tag) if tag == "PETROL_95"));
    }

    #[test]
    fn test_fuel_only_skips_service() {
        let service = oil_change();
        let source = booking(Some("PETROL_92"), Some(10.0), Some("st-1"));
        let prices = FuelPriceTable::standard();

        let full = assemble_lines(&source, Some(&service), &prices, AssemblyMode::Full).unwrap();
        let fuel_only = assemble_lines(&source, Some(&service), &prices, AssemblyMode::FuelOnly).unwrap();

        assert_eq!(full.len(), 2);
        assert_eq!(full[0].kind, LineKind::Service);
        assert_eq!(fuel_only.len(), 1);
        assert_eq!(fuel_only[0].kind, LineKind::Part);
    }

    #[test]
    fn test_zero_line_invoice_is_paid() {
        let totals = InvoiceTotals::from_lines(&[], TaxRate::VAT).unwrap();
        assert!(totals.total.is_zero());
        assert!(totals.tax.is_zero());
        assert_eq!(totals.status, InvoiceStatus::Paid);
    }

    #[test]
    fn test_status_through_payments() {
        let issued = InvoiceTotals::issue(Money::from_major(100), TaxRate::VAT);
        let partial = issued.with_payment(Money::from_cents(5750));
        assert_eq!(partial.status, InvoiceStatus::Partial);
        assert_eq!(partial.balance.cents(), 5750);

        let paid = partial.with_payment(Money::from_cents(5750));
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert!(paid.balance.is_zero());

        let refunded = paid.with_payment(Money::from_cents(-4000));
        assert_eq!(refunded.status, InvoiceStatus::Partial);
        assert_eq!(refunded.paid.cents(), 7500);
    }

    proptest! {
        #[test]
        fn prop_derived_fields_hold(
            subtotal in 0i64..100_000_000,
            payments in prop::collection::vec(-50_000i64..50_000, 0..12),
        ) {
            let mut totals = InvoiceTotals::issue(Money::from_cents(subtotal), TaxRate::VAT);
            for delta in payments {
                totals = totals.with_payment(Money::from_cents(delta));

                prop_assert_eq!(totals.total, totals.subtotal + totals.tax);
                prop_assert_eq!(totals.balance, totals.total - totals.paid);
                prop_assert_eq!(totals.status == InvoiceStatus::Paid, !totals.balance.is_positive());
                prop_assert_eq!(
                    totals.status == InvoiceStatus::Partial,
                    totals.paid.is_positive() && totals.balance.is_positive()
                );
            }
        }
    }
}
