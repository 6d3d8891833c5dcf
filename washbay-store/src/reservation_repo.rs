use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use washbay_core::repository::ReservationLedger;
use washbay_core::{
    BookingError, NewReservation, Reservation, ReservationStatus, ScheduleRules, VehicleDescriptor,
};

use crate::capacity_repo::db_err;

pub struct PgReservationLedger {
    pool: PgPool,
    rules: ScheduleRules,
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    slot_date: NaiveDate,
    phone: String,
    plate: String,
    size_class: Option<String>,
    services: serde_json::Value,
    price_cents: i64,
    status: String,
    verification_code: String,
    notes: Option<String>,
    cancel_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ReservationRow {
    fn into_reservation(self) -> Result<Reservation, BookingError> {
        let status = ReservationStatus::parse(&self.status).ok_or_else(|| {
            BookingError::Unavailable(format!("unknown reservation status: {}", self.status))
        })?;
        let services: Vec<String> = serde_json::from_value(self.services)
            .map_err(|e| BookingError::Unavailable(format!("bad services column: {}", e)))?;

        Ok(Reservation {
            id: self.id,
            slot_date: self.slot_date,
            phone: self.phone,
            vehicle: VehicleDescriptor {
                plate: self.plate,
                size_class: self.size_class,
            },
            services,
            price_cents: self.price_cents,
            status,
            verification_code: self.verification_code,
            notes: self.notes,
            cancel_reason: self.cancel_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_COLS: &str = "id, slot_date, phone, plate, size_class, services, price_cents, \
                           status, verification_code, notes, cancel_reason, created_at, updated_at";

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

impl PgReservationLedger {
    pub fn new(pool: PgPool, rules: ScheduleRules) -> Self {
        Self { pool, rules }
    }
}

#[async_trait]
impl ReservationLedger for PgReservationLedger {
    async fn insert_with_decrement(
        &self,
        new: NewReservation,
    ) -> Result<(Reservation, i32), BookingError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            "INSERT INTO capacity_slots (slot_date, total, available) VALUES ($1, $2, $2) \
             ON CONFLICT (slot_date) DO NOTHING",
        )
        .bind(new.slot_date)
        .bind(self.rules.default_capacity)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        // Decrement and insert commit together or not at all; rolling back on
        // any later failure returns the unit automatically.
        let decremented: Option<(i32,)> = sqlx::query_as(
            "UPDATE capacity_slots SET available = available - 1, last_updated = NOW() \
             WHERE slot_date = $1 AND available > 0 RETURNING available",
        )
        .bind(new.slot_date)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some((remaining,)) = decremented else {
            return Err(BookingError::InsufficientCapacity);
        };

        let now = Utc::now();
        let reservation = Reservation {
            id: Uuid::new_v4(),
            slot_date: new.slot_date,
            phone: new.phone,
            vehicle: new.vehicle,
            services: new.services,
            price_cents: new.price_cents,
            status: ReservationStatus::Pending,
            verification_code: new.verification_code,
            notes: new.notes,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        };

        let services = serde_json::to_value(&reservation.services)
            .map_err(|e| BookingError::Unavailable(e.to_string()))?;

        sqlx::query(
            "INSERT INTO reservations \
             (id, slot_date, phone, plate, size_class, services, price_cents, status, \
              verification_code, notes, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(reservation.id)
        .bind(reservation.slot_date)
        .bind(&reservation.phone)
        .bind(&reservation.vehicle.plate)
        .bind(&reservation.vehicle.size_class)
        .bind(&services)
        .bind(reservation.price_cents)
        .bind(reservation.status.as_str())
        .bind(&reservation.verification_code)
        .bind(&reservation.notes)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            // The partial unique index backstops the duplicate pre-check.
            if is_unique_violation(&e) {
                BookingError::DuplicateReservation
            } else {
                db_err(e)
            }
        })?;

        tx.commit().await.map_err(db_err)?;

        Ok((reservation, remaining))
    }

    async fn find_active(
        &self,
        phone: &str,
        date: NaiveDate,
    ) -> Result<Option<Reservation>, BookingError> {
        let row: Option<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLS} FROM reservations \
             WHERE phone = $1 AND slot_date = $2 AND status IN ('pending', 'confirmed') LIMIT 1"
        ))
        .bind(phone)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(ReservationRow::into_reservation).transpose()
    }

    async fn find_by_code(
        &self,
        phone: &str,
        code: &str,
    ) -> Result<Option<Reservation>, BookingError> {
        let row: Option<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLS} FROM reservations \
             WHERE phone = $1 AND verification_code = $2 AND status <> 'cancelled' \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(phone)
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(ReservationRow::into_reservation).transpose()
    }

    async fn get(&self, id: Uuid) -> Result<Option<Reservation>, BookingError> {
        let row: Option<ReservationRow> =
            sqlx::query_as(&format!("SELECT {SELECT_COLS} FROM reservations WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        row.map(ReservationRow::into_reservation).transpose()
    }

    async fn list_for_date(&self, date: NaiveDate) -> Result<Vec<Reservation>, BookingError> {
        let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLS} FROM reservations WHERE slot_date = $1 ORDER BY created_at"
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(ReservationRow::into_reservation)
            .collect()
    }

    async fn mark_confirmed(&self, id: Uuid) -> Result<Reservation, BookingError> {
        let row: Option<ReservationRow> = sqlx::query_as(&format!(
            "UPDATE reservations SET status = 'confirmed', updated_at = NOW() \
             WHERE id = $1 AND status = 'pending' RETURNING {SELECT_COLS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => row.into_reservation(),
            None => Err(BookingError::NotFound),
        }
    }

    async fn cancel_with_release(
        &self,
        id: Uuid,
        reason: Option<&str>,
    ) -> Result<(Reservation, i32), BookingError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Row lock serializes concurrent transitions on the same id, so a
        // retried cancel sees 'cancelled' here before any second increment.
        let row: Option<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLS} FROM reservations WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Err(BookingError::NotFound);
        };
        let reservation = row.into_reservation()?;
        if reservation.status == ReservationStatus::Cancelled {
            return Err(BookingError::AlreadyCancelled);
        }

        let row: Option<ReservationRow> = sqlx::query_as(&format!(
            "UPDATE reservations SET status = 'cancelled', cancel_reason = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {SELECT_COLS}"
        ))
        .bind(id)
        .bind(reason)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Err(BookingError::NotFound);
        };
        let cancelled = row.into_reservation()?;

        let (available,): (i32,) = sqlx::query_as(
            "UPDATE capacity_slots SET available = LEAST(available + 1, total), last_updated = NOW() \
             WHERE slot_date = $1 RETURNING available",
        )
        .bind(cancelled.slot_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        Ok((cancelled, available))
    }
}
