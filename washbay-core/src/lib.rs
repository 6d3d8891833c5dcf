pub mod error;
pub mod models;
pub mod repository;
pub mod schedule;
pub mod validation;

pub use error::BookingError;
pub use models::{
    CapacityReset, CapacitySlot, CreateOutcome, CreateReservationRequest, NewReservation,
    Reservation, ReservationStatus, SlotAvailability, VehicleDescriptor,
};
pub use schedule::ScheduleRules;
