use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::BookingError;
use crate::models::{CapacityReset, CapacitySlot, NewReservation, Reservation, SlotAvailability};

/// Per-date capacity pool. Implementations must make `decrement_if_available`
/// and `increment_up_to` atomic at the storage layer: multiple service
/// instances may call them concurrently and no interleaving may drive
/// `available` outside `0..=total`.
#[async_trait]
pub trait CapacityStore: Send + Sync {
    /// Returns the slot for `date`, creating it with `available = total` on
    /// first reference. Fails `InvalidDate` if the weekday is not serviced.
    async fn get_or_init_slot(&self, date: NaiveDate) -> Result<CapacitySlot, BookingError>;

    /// Atomic compare-and-decrement. With N callers racing on `available = 1`
    /// exactly one succeeds; the rest observe `InsufficientCapacity`.
    async fn decrement_if_available(&self, date: NaiveDate) -> Result<i32, BookingError>;

    /// Atomic bounded increment; never raises `available` above `total`.
    /// Calling it without a matching outstanding decrement is a caller bug
    /// this primitive does not guard against.
    async fn increment_up_to(&self, date: NaiveDate) -> Result<i32, BookingError>;

    /// Availability for serviced dates at or after `from`, ascending, bounded
    /// by the deployment's snapshot horizon. Dates never referenced report
    /// the default capacity without being materialized.
    async fn snapshot_from(&self, from: NaiveDate) -> Result<Vec<SlotAvailability>, BookingError>;

    /// Administrative reset: force `available` to `new_available` (clamped to
    /// `0..=total`) and record an audit row with the before/after values.
    async fn reset_capacity(
        &self,
        date: NaiveDate,
        new_available: i32,
        actor: &str,
    ) -> Result<CapacityReset, BookingError>;
}

/// Durable reservation ledger. The two compound operations pair a status
/// write with its capacity counterpart inside one storage transaction, so no
/// state exists where capacity moved without a matching ledger row.
#[async_trait]
pub trait ReservationLedger: Send + Sync {
    /// Decrement capacity for `new.slot_date` and insert the reservation as
    /// one transaction. `InsufficientCapacity` leaves the ledger untouched.
    async fn insert_with_decrement(
        &self,
        new: NewReservation,
    ) -> Result<(Reservation, i32), BookingError>;

    /// Pending or Confirmed reservation for `(phone, date)`, if any.
    async fn find_active(
        &self,
        phone: &str,
        date: NaiveDate,
    ) -> Result<Option<Reservation>, BookingError>;

    /// Non-cancelled reservation matching `(phone, code)`, if any.
    async fn find_by_code(
        &self,
        phone: &str,
        code: &str,
    ) -> Result<Option<Reservation>, BookingError>;

    async fn get(&self, id: Uuid) -> Result<Option<Reservation>, BookingError>;

    async fn list_for_date(&self, date: NaiveDate) -> Result<Vec<Reservation>, BookingError>;

    /// Pending -> Confirmed. Fails `NotFound` if the row is missing or no
    /// longer Pending; idempotent verify is handled a level up.
    async fn mark_confirmed(&self, id: Uuid) -> Result<Reservation, BookingError>;

    /// Transition to Cancelled and apply the bounded increment in one
    /// transaction. Concurrent calls on the same id are serialized by the
    /// storage layer so a retry observes `AlreadyCancelled` before any
    /// second increment can happen.
    async fn cancel_with_release(
        &self,
        id: Uuid,
        reason: Option<&str>,
    ) -> Result<(Reservation, i32), BookingError>;
}

/// Sliding-window attempt counter keyed by requesting origin.
#[async_trait]
pub trait RateGuard: Send + Sync {
    /// Records an attempt and returns whether the origin is still within its
    /// budget.
    async fn check(&self, origin: &str) -> Result<bool, BookingError>;
}

/// Outbound verification/confirmation messages. Best-effort: failures are
/// logged by the caller and never alter a committed reservation.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, phone: &str, message: &str) -> Result<(), BookingError>;
}
