use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Capacity pool for one calendar date. Lazily created on first reference
/// with `available = total`, never deleted afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacitySlot {
    pub slot_date: NaiveDate,
    pub total: i32,
    pub available: i32,
    pub last_updated: DateTime<Utc>,
}

/// One row of a capacity snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotAvailability {
    pub slot_date: NaiveDate,
    pub available: i32,
    pub total: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReservationStatus::Pending),
            "confirmed" => Some(ReservationStatus::Confirmed),
            "cancelled" => Some(ReservationStatus::Cancelled),
            _ => None,
        }
    }

    /// Pending and Confirmed reservations hold one unit of capacity.
    pub fn holds_capacity(&self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleDescriptor {
    pub plate: String,
    #[serde(default)]
    pub size_class: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub slot_date: NaiveDate,
    pub phone: String,
    pub vehicle: VehicleDescriptor,
    pub services: Vec<String>,
    pub price_cents: i64,
    pub status: ReservationStatus,
    /// Held server-side only; API responses never include it.
    pub verification_code: String,
    pub notes: Option<String>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Incoming create payload, pre-validation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateReservationRequest {
    pub slot_date: NaiveDate,
    pub phone: String,
    pub vehicle: VehicleDescriptor,
    pub services: Vec<String>,
    pub price_cents: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Validated reservation ready for the ledger, code already generated.
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub slot_date: NaiveDate,
    pub phone: String,
    pub vehicle: VehicleDescriptor,
    pub services: Vec<String>,
    pub price_cents: i64,
    pub notes: Option<String>,
    pub verification_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOutcome {
    pub reservation_id: Uuid,
    pub remaining: i32,
    /// Whether a verification message was handed to the dispatcher. Delivery
    /// itself is fire-and-forget and never affects the committed reservation.
    pub notification_queued: bool,
}

/// Audit record written by the administrative capacity reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityReset {
    pub id: Uuid,
    pub slot_date: NaiveDate,
    pub available_before: i32,
    pub available_after: i32,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}
