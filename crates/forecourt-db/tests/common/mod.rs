//! Shared fixtures for the billing integration tests.

#![allow(dead_code)]

use chrono::Utc;
use uuid::Uuid;

use forecourt_core::{Booking, FuelPriceTable, Invoice, Money, ServiceType};
use forecourt_db::{BillingConfig, BillingService, Database, DbConfig, FinanceService};

pub struct Harness {
    pub db: Database,
    pub billing: BillingService,
    pub finance: FinanceService,
}

/// Fresh in-memory database with the standard prices and strategies.
pub async fn harness() -> Harness {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    harness_on(db)
}

pub fn harness_on(db: Database) -> Harness {
    Harness {
        billing: BillingService::new(db.clone(), BillingConfig::for_tests(), FuelPriceTable::standard()),
        finance: FinanceService::new(db.clone()),
        db,
    }
}

pub async fn service_type(db: &Database, name: &str, price: Money) -> ServiceType {
    let service = ServiceType {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        price_cents: Some(price.cents()),
    };
    db.bookings().insert_service_type(&service).await.unwrap();
    service
}

pub async fn booking(db: &Database, service: Option<&ServiceType>, fuel: Option<(&str, f64)>) -> Booking {
    let booking = Booking {
        id: Uuid::new_v4().to_string(),
        customer_id: Some("CUST-0001".to_string()),
        service_type_id: service.map(|s| s.id.clone()),
        fuel_type: fuel.map(|(grade, _)| grade.to_string()),
        liters_requested: fuel.map(|(_, liters)| liters),
        status: "COMPLETED".to_string(),
        description: None,
        created_at: Utc::now(),
    };
    db.bookings().insert(&booking).await.unwrap();
    booking
}

/// Invoice for a single service priced 100.00: total 115.00.
pub async fn service_invoice(h: &Harness) -> Invoice {
    let service = service_type(&h.db, "Oil Change", Money::from_major(100)).await;
    let booking = booking(&h.db, Some(&service), None).await;
    h.billing.create_invoice_from_booking(&booking.id).await.unwrap()
}

pub async fn ledger_rows(db: &Database) -> i64 {
    db.ledger().count(&Default::default()).await.unwrap()
}

pub async fn payment_rows(db: &Database) -> usize {
    db.payments().list_all().await.unwrap().len()
}
