use chrono::NaiveDate;
use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct CapacityChangedEvent {
    pub slot_date: NaiveDate,
    pub available: i32,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ReservationCreatedEvent {
    pub reservation_id: Uuid,
    pub slot_date: NaiveDate,
    pub remaining: i32,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct CapacityResetEvent {
    pub slot_date: NaiveDate,
    pub available_before: i32,
    pub available_after: i32,
    pub actor: String,
    pub timestamp: i64,
}
