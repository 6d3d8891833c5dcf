use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use washbay_core::repository::CapacityStore;
use washbay_core::{BookingError, CapacityReset, CapacitySlot, ScheduleRules, SlotAvailability};

pub struct PgCapacityStore {
    pool: PgPool,
    rules: ScheduleRules,
}

#[derive(sqlx::FromRow)]
struct SlotRow {
    slot_date: NaiveDate,
    total: i32,
    available: i32,
    last_updated: DateTime<Utc>,
}

impl From<SlotRow> for CapacitySlot {
    fn from(row: SlotRow) -> Self {
        CapacitySlot {
            slot_date: row.slot_date,
            total: row.total,
            available: row.available,
            last_updated: row.last_updated,
        }
    }
}

pub(crate) fn db_err(e: sqlx::Error) -> BookingError {
    BookingError::Unavailable(e.to_string())
}

impl PgCapacityStore {
    pub fn new(pool: PgPool, rules: ScheduleRules) -> Self {
        Self { pool, rules }
    }

    /// Lazy init: a no-op when the row already exists, so concurrent first
    /// references race harmlessly on the INSERT.
    async fn ensure_slot(&self, date: NaiveDate) -> Result<(), BookingError> {
        if !self.rules.is_allowed_weekday(date) {
            return Err(BookingError::InvalidDate(format!(
                "{} does not fall on a serviced weekday",
                date
            )));
        }
        sqlx::query(
            "INSERT INTO capacity_slots (slot_date, total, available) VALUES ($1, $2, $2) \
             ON CONFLICT (slot_date) DO NOTHING",
        )
        .bind(date)
        .bind(self.rules.default_capacity)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl CapacityStore for PgCapacityStore {
    async fn get_or_init_slot(&self, date: NaiveDate) -> Result<CapacitySlot, BookingError> {
        self.ensure_slot(date).await?;

        let row: SlotRow = sqlx::query_as(
            "SELECT slot_date, total, available, last_updated FROM capacity_slots WHERE slot_date = $1",
        )
        .bind(date)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.into())
    }

    async fn decrement_if_available(&self, date: NaiveDate) -> Result<i32, BookingError> {
        self.ensure_slot(date).await?;

        // The `available > 0` guard makes this a storage-level
        // compare-and-decrement: exactly one of N racing callers takes the
        // last unit, the rest match zero rows.
        let row: Option<(i32,)> = sqlx::query_as(
            "UPDATE capacity_slots SET available = available - 1, last_updated = NOW() \
             WHERE slot_date = $1 AND available > 0 RETURNING available",
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some((available,)) => Ok(available),
            None => Err(BookingError::InsufficientCapacity),
        }
    }

    async fn increment_up_to(&self, date: NaiveDate) -> Result<i32, BookingError> {
        self.ensure_slot(date).await?;

        let (available,): (i32,) = sqlx::query_as(
            "UPDATE capacity_slots SET available = LEAST(available + 1, total), last_updated = NOW() \
             WHERE slot_date = $1 RETURNING available",
        )
        .bind(date)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(available)
    }

    async fn snapshot_from(&self, from: NaiveDate) -> Result<Vec<SlotAvailability>, BookingError> {
        let until = from + Duration::days(self.rules.snapshot_horizon_days as i64);
        let rows: Vec<SlotRow> = sqlx::query_as(
            "SELECT slot_date, total, available, last_updated FROM capacity_slots \
             WHERE slot_date >= $1 AND slot_date < $2 ORDER BY slot_date",
        )
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        // Dates never referenced have no row yet; they still appear in the
        // snapshot at the deployment default so every bookable date is shown.
        let by_date: std::collections::HashMap<NaiveDate, SlotRow> =
            rows.into_iter().map(|r| (r.slot_date, r)).collect();

        let out = self
            .rules
            .serviced_dates_from(from)
            .into_iter()
            .map(|date| match by_date.get(&date) {
                Some(row) => SlotAvailability {
                    slot_date: date,
                    available: row.available,
                    total: row.total,
                },
                None => SlotAvailability {
                    slot_date: date,
                    available: self.rules.default_capacity,
                    total: self.rules.default_capacity,
                },
            })
            .collect();
        Ok(out)
    }

    async fn reset_capacity(
        &self,
        date: NaiveDate,
        new_available: i32,
        actor: &str,
    ) -> Result<CapacityReset, BookingError> {
        self.ensure_slot(date).await?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let (total, before): (i32, i32) = sqlx::query_as(
            "SELECT total, available FROM capacity_slots WHERE slot_date = $1 FOR UPDATE",
        )
        .bind(date)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        let after = new_available.clamp(0, total);

        sqlx::query(
            "UPDATE capacity_slots SET available = $2, last_updated = NOW() WHERE slot_date = $1",
        )
        .bind(date)
        .bind(after)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let reset = CapacityReset {
            id: Uuid::new_v4(),
            slot_date: date,
            available_before: before,
            available_after: after,
            actor: actor.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO capacity_resets (id, slot_date, available_before, available_after, actor, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(reset.id)
        .bind(reset.slot_date)
        .bind(reset.available_before)
        .bind(reset.available_after)
        .bind(&reset.actor)
        .bind(reset.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        tracing::info!(
            slot_date = %date,
            before,
            after,
            actor,
            "capacity reset applied"
        );

        Ok(reset)
    }
}
