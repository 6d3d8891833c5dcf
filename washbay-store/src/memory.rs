use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use washbay_core::repository::{CapacityStore, ReservationLedger};
use washbay_core::{
    BookingError, CapacityReset, CapacitySlot, NewReservation, Reservation, ReservationStatus,
    ScheduleRules, SlotAvailability,
};

/// In-memory engine implementing both storage traits behind a single mutex,
/// which makes every compound operation trivially atomic. Used as the
/// non-Postgres deployment engine and as the test double.
pub struct MemoryStore {
    rules: ScheduleRules,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<NaiveDate, CapacitySlot>,
    reservations: HashMap<Uuid, Reservation>,
    resets: Vec<CapacityReset>,
}

impl MemoryStore {
    pub fn new(rules: ScheduleRules) -> Self {
        Self {
            rules,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn rules(&self) -> &ScheduleRules {
        &self.rules
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, BookingError> {
        self.inner
            .lock()
            .map_err(|_| BookingError::Unavailable("memory store mutex poisoned".to_string()))
    }

    fn slot_mut<'a>(
        &self,
        inner: &'a mut Inner,
        date: NaiveDate,
    ) -> Result<&'a mut CapacitySlot, BookingError> {
        if !self.rules.is_allowed_weekday(date) {
            return Err(BookingError::InvalidDate(format!(
                "{} does not fall on a serviced weekday",
                date
            )));
        }
        let total = self.rules.default_capacity;
        Ok(inner.slots.entry(date).or_insert_with(|| CapacitySlot {
            slot_date: date,
            total,
            available: total,
            last_updated: Utc::now(),
        }))
    }

    /// Audit rows recorded by `reset_capacity`, oldest first.
    pub fn reset_audit(&self) -> Result<Vec<CapacityReset>, BookingError> {
        Ok(self.lock()?.resets.clone())
    }
}

#[async_trait]
impl CapacityStore for MemoryStore {
    async fn get_or_init_slot(&self, date: NaiveDate) -> Result<CapacitySlot, BookingError> {
        let mut inner = self.lock()?;
        Ok(self.slot_mut(&mut inner, date)?.clone())
    }

    async fn decrement_if_available(&self, date: NaiveDate) -> Result<i32, BookingError> {
        let mut inner = self.lock()?;
        let slot = self.slot_mut(&mut inner, date)?;
        if slot.available == 0 {
            return Err(BookingError::InsufficientCapacity);
        }
        slot.available -= 1;
        slot.last_updated = Utc::now();
        Ok(slot.available)
    }

    async fn increment_up_to(&self, date: NaiveDate) -> Result<i32, BookingError> {
        let mut inner = self.lock()?;
        let slot = self.slot_mut(&mut inner, date)?;
        slot.available = (slot.available + 1).min(slot.total);
        slot.last_updated = Utc::now();
        Ok(slot.available)
    }

    async fn snapshot_from(&self, from: NaiveDate) -> Result<Vec<SlotAvailability>, BookingError> {
        let inner = self.lock()?;
        Ok(self
            .rules
            .serviced_dates_from(from)
            .into_iter()
            .map(|date| match inner.slots.get(&date) {
                Some(slot) => SlotAvailability {
                    slot_date: date,
                    available: slot.available,
                    total: slot.total,
                },
                None => SlotAvailability {
                    slot_date: date,
                    available: self.rules.default_capacity,
                    total: self.rules.default_capacity,
                },
            })
            .collect())
    }

    async fn reset_capacity(
        &self,
        date: NaiveDate,
        new_available: i32,
        actor: &str,
    ) -> Result<CapacityReset, BookingError> {
        let mut inner = self.lock()?;
        let slot = self.slot_mut(&mut inner, date)?;
        let before = slot.available;
        let after = new_available.clamp(0, slot.total);
        slot.available = after;
        slot.last_updated = Utc::now();

        let reset = CapacityReset {
            id: Uuid::new_v4(),
            slot_date: date,
            available_before: before,
            available_after: after,
            actor: actor.to_string(),
            created_at: Utc::now(),
        };
        inner.resets.push(reset.clone());
        Ok(reset)
    }
}

#[async_trait]
impl ReservationLedger for MemoryStore {
    async fn insert_with_decrement(
        &self,
        new: NewReservation,
    ) -> Result<(Reservation, i32), BookingError> {
        let mut inner = self.lock()?;

        // Backstop for the coordinator's duplicate pre-check, same as the
        // partial unique index on the Postgres engine: under one lock with
        // the decrement, so racing creates cannot both pass.
        let duplicate = inner
            .reservations
            .values()
            .any(|r| {
                r.phone == new.phone
                    && r.slot_date == new.slot_date
                    && r.status.holds_capacity()
            });
        if duplicate {
            return Err(BookingError::DuplicateReservation);
        }

        let slot = self.slot_mut(&mut inner, new.slot_date)?;
        if slot.available == 0 {
            return Err(BookingError::InsufficientCapacity);
        }
        slot.available -= 1;
        slot.last_updated = Utc::now();
        let remaining = slot.available;

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
        inner.reservations.insert(reservation.id, reservation.clone());

        Ok((reservation, remaining))
    }

    async fn find_active(
        &self,
        phone: &str,
        date: NaiveDate,
    ) -> Result<Option<Reservation>, BookingError> {
        let inner = self.lock()?;
        Ok(inner
            .reservations
            .values()
            .find(|r| r.phone == phone && r.slot_date == date && r.status.holds_capacity())
            .cloned())
    }

    async fn find_by_code(
        &self,
        phone: &str,
        code: &str,
    ) -> Result<Option<Reservation>, BookingError> {
        let inner = self.lock()?;
        Ok(inner
            .reservations
            .values()
            .filter(|r| {
                r.phone == phone
                    && r.verification_code == code
                    && r.status != ReservationStatus::Cancelled
            })
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Reservation>, BookingError> {
        Ok(self.lock()?.reservations.get(&id).cloned())
    }

    async fn list_for_date(&self, date: NaiveDate) -> Result<Vec<Reservation>, BookingError> {
        let inner = self.lock()?;
        let mut out: Vec<Reservation> = inner
            .reservations
            .values()
            .filter(|r| r.slot_date == date)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    async fn mark_confirmed(&self, id: Uuid) -> Result<Reservation, BookingError> {
        let mut inner = self.lock()?;
        let reservation = inner
            .reservations
            .get_mut(&id)
            .filter(|r| r.status == ReservationStatus::Pending)
            .ok_or(BookingError::NotFound)?;
        reservation.status = ReservationStatus::Confirmed;
        reservation.updated_at = Utc::now();
        Ok(reservation.clone())
    }

    async fn cancel_with_release(
        &self,
        id: Uuid,
        reason: Option<&str>,
    ) -> Result<(Reservation, i32), BookingError> {
        let mut inner = self.lock()?;

        let reservation = inner.reservations.get_mut(&id).ok_or(BookingError::NotFound)?;
        if reservation.status == ReservationStatus::Cancelled {
            return Err(BookingError::AlreadyCancelled);
        }
        reservation.status = ReservationStatus::Cancelled;
        reservation.cancel_reason = reason.map(|s| s.to_string());
        reservation.updated_at = Utc::now();
        let cancelled = reservation.clone();

        // Same lock scope as the status flip: release is exactly-once.
        let slot = self.slot_mut(&mut inner, cancelled.slot_date)?;
        slot.available = (slot.available + 1).min(slot.total);
        slot.last_updated = Utc::now();
        let available = slot.available;

        Ok((cancelled, available))
    }
}
