//! # Booking Repository
//!
//! Bookings and service types belong to the booking module. Billing only
//! reads them; the insert helpers exist for the seed binary and tests.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use forecourt_core::{Booking, ServiceType};

const BOOKING_COLUMNS: &str = r#"
    id, customer_id, service_type_id, fuel_type, liters_requested,
    status, description, created_at
"#;

/// Read access to bookings and their service types.
#[derive(Debug, Clone)]
pub struct BookingRepository {
    pool: SqlitePool,
}

impl BookingRepository {
    /// Creates a new BookingRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BookingRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE id = ?1", BOOKING_COLUMNS);
        let booking = sqlx::query_as::<_, Booking>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(booking)
    }

    /// Loads a booking on the caller's transaction.
    pub async fn find(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE id = ?1", BOOKING_COLUMNS);
        let booking = sqlx::query_as::<_, Booking>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(booking)
    }

    /// Loads a service type on the caller's transaction.
    pub async fn find_service_type(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<ServiceType>> {
        let service = sqlx::query_as::<_, ServiceType>(
            "SELECT id, name, price_cents FROM service_types WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(service)
    }

    pub async fn list_service_types(&self) -> DbResult<Vec<ServiceType>> {
        let services = sqlx::query_as::<_, ServiceType>(
            "SELECT id, name, price_cents FROM service_types ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(services)
    }

    pub async fn insert_service_type(&self, service: &ServiceType) -> DbResult<()> {
        debug!(id = %service.id, name = %service.name, "Inserting service type");

        sqlx::query("INSERT INTO service_types (id, name, price_cents) VALUES (?1, ?2, ?3)")
            .bind(&service.id)
            .bind(&service.name)
            .bind(service.price_cents)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn insert(&self, booking: &Booking) -> DbResult<()> {
        debug!(id = %booking.id, "Inserting booking");

        sqlx::query(
            r#"
            INSERT INTO bookings (
                id, customer_id, service_type_id, fuel_type, liters_requested,
                status, description, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&booking.id)
        .bind(&booking.customer_id)
        .bind(&booking.service_type_id)
        .bind(&booking.fuel_type)
        .bind(booking.liters_requested)
        .bind(&booking.status)
        .bind(&booking.description)
        .bind(booking.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Removes a booking. Its invoice survives with `booking_id` nulled.
    pub async fn delete(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM bookings WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
