//! # Seed Data Generator
//!
//! Populates a database with service types, inventory and bookings so the
//! billing core can be exercised locally.
//!
//! ## Usage
//! ```bash
//! # 50 bookings (default) into FORECOURT_DB_PATH or ./forecourt.db
//! cargo run -p forecourt-db --bin seed
//!
//! # Custom amount, and issue an invoice for every booking
//! cargo run -p forecourt-db --bin seed -- --bookings 200 --invoice
//!
//! # Specify database path
//! cargo run -p forecourt-db --bin seed -- --db ./data/forecourt.db
//! ```
//!
//! Booking mix: every third booking is fuel only, every fifth is service
//! only, the rest are both.

use chrono::{Duration, Utc};
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use forecourt_core::{Booking, FuelGrade, InventoryItem, ServiceType};
use forecourt_db::{BillingConfig, BillingService, Database};

/// Service catalogue: (name, price in LKR).
const SERVICES: &[(&str, i64)] = &[
    ("Oil Change", 100),
    ("Full Service", 8_500),
    ("Wheel Alignment", 3_200),
    ("Body Wash", 1_500),
    ("Brake Inspection", 2_400),
];

/// Stock: (sku, name, category, on hand, unit price in LKR).
const INVENTORY: &[(&str, &str, &str, i64, i64)] = &[
    ("OIL-5W30-4L", "Engine Oil 5W-30 4L", "Lubricants", 40, 6_800),
    ("FLT-OIL-01", "Oil Filter", "Filters", 60, 1_250),
    ("FLT-AIR-01", "Air Filter", "Filters", 35, 2_100),
    ("BRK-PAD-FR", "Front Brake Pads", "Brakes", 20, 7_400),
    ("WPR-22IN", "Wiper Blade 22in", "Accessories", 50, 950),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let mut config = BillingConfig::from_env()?;
    config.simulate_gateway_latency = false;

    let args: Vec<String> = env::args().collect();
    let mut bookings: usize = 50;
    let mut issue_invoices = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bookings" | "-b" => {
                if i + 1 < args.len() {
                    bookings = args[i + 1].parse().unwrap_or(50);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    config.database_path = args[i + 1].clone().into();
                    i += 1;
                }
            }
            "--invoice" | "-i" => issue_invoices = true,
            "--help" | "-h" => {
                println!("Forecourt Billing Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -b, --bookings <N>  Number of bookings to generate (default: 50)");
                println!("  -d, --db <PATH>     Database file path (default: FORECOURT_DB_PATH or ./forecourt.db)");
                println!("  -i, --invoice       Issue an invoice for every generated booking");
                println!("  -h, --help          Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(path = %config.database_path.display(), bookings, "Seeding database");

    let db = Database::new(config.db_config()).await?;
    let prices = config.load_fuel_prices()?;

    let existing = db.bookings().list_service_types().await?;
    if !existing.is_empty() {
        warn!(
            service_types = existing.len(),
            "Database already seeded; delete the file to regenerate"
        );
        return Ok(());
    }

    let now = Utc::now();
    db.fuel_prices().store_table(&prices, now).await?;

    let mut services = Vec::with_capacity(SERVICES.len());
    for (name, price) in SERVICES {
        let service = ServiceType {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            price_cents: Some(price * 100),
        };
        db.bookings().insert_service_type(&service).await?;
        services.push(service);
    }
    info!(count = services.len(), "Service types created");

    for (sku, name, category, on_hand, price) in INVENTORY {
        db.inventory()
            .insert(&InventoryItem {
                id: Uuid::new_v4().to_string(),
                sku: sku.to_string(),
                name: name.to_string(),
                category: Some(category.to_string()),
                on_hand: *on_hand,
                unit_price_cents: Some(price * 100),
                is_active: true,
            })
            .await?;
    }
    info!(
        count = INVENTORY.len(),
        value = %db.inventory().total_value().await?,
        "Inventory created"
    );

    let start = std::time::Instant::now();
    let mut booking_ids = Vec::with_capacity(bookings);
    for n in 0..bookings {
        let booking = generate_booking(n, &services, now - Duration::hours(n as i64));
        db.bookings().insert(&booking).await?;
        booking_ids.push(booking.id);
    }
    info!(count = bookings, elapsed = ?start.elapsed(), "Bookings created");

    if issue_invoices {
        let billing = BillingService::from_stored_prices(db.clone(), config).await?;
        let mut issued = 0;
        for booking_id in &booking_ids {
            match billing.create_invoice_from_booking(booking_id).await {
                Ok(_) => issued += 1,
                Err(e) => warn!(booking_id = %booking_id, error = %e, code = ?e.code(), "Invoice not issued"),
            }
        }
        info!(issued, outstanding = %db.invoices().total_outstanding().await?, "Invoices issued");
    }

    info!("Seed complete");
    Ok(())
}

/// Generates one booking from its index.
fn generate_booking(n: usize, services: &[ServiceType], created_at: chrono::DateTime<Utc>) -> Booking {
    let fuel_only = n % 3 == 0;
    let service_only = !fuel_only && n % 5 == 0;

    let service_type_id = if fuel_only {
        None
    } else {
        Some(services[n % services.len()].id.clone())
    };

    let (fuel_type, liters_requested) = if service_only {
        (None, None)
    } else {
        let grade = FuelGrade::ALL[n % FuelGrade::ALL.len()];
        // 5.0 L to 44.5 L in half-liter steps
        let liters = 5.0 + (n * 7 % 80) as f64 / 2.0;
        (Some(grade.as_str().to_string()), Some(liters))
    };

    Booking {
        id: Uuid::new_v4().to_string(),
        customer_id: Some(format!("CUST-{:04}", n % 37)),
        service_type_id,
        fuel_type,
        liters_requested,
        status: "COMPLETED".to_string(),
        description: None,
        created_at,
    }
}
