use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use washbay_core::{CreateReservationRequest, Reservation, ReservationStatus};
use washbay_shared::models::events::CapacityChangedEvent;
use washbay_shared::Masked;

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CreateReservationResponse {
    pub success: bool,
    pub reservation_id: Uuid,
    pub remaining_capacity: i32,
    pub notification_queued: bool,
}

#[derive(Debug, Deserialize)]
pub struct VerifyReservationRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyReservationResponse {
    pub success: bool,
    pub reservation: ReservationView,
}

#[derive(Debug, Deserialize)]
pub struct CancelReservationRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CancelReservationResponse {
    pub success: bool,
    pub spaces_available: i32,
}

/// Client-facing projection of a reservation. The verification code never
/// appears here; the phone is wrapped so it cannot leak through debug logs.
#[derive(Debug, Serialize)]
pub struct ReservationView {
    pub id: Uuid,
    pub slot_date: NaiveDate,
    pub phone: Masked<String>,
    pub plate: String,
    pub services: Vec<String>,
    pub price_cents: i64,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Reservation> for ReservationView {
    fn from(r: Reservation) -> Self {
        ReservationView {
            id: r.id,
            slot_date: r.slot_date,
            phone: Masked(r.phone),
            plate: r.vehicle.plate,
            services: r.services,
            price_cents: r.price_cents,
            status: r.status,
            created_at: r.created_at,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/reservations
pub async fn create_reservation(
    State(state): State<AppState>,
    Json(req): Json<CreateReservationRequest>,
) -> Result<Json<CreateReservationResponse>, ApiError> {
    let slot_date = req.slot_date;
    let outcome = state.coordinator.create(req).await?;

    let _ = state.capacity_tx.send(CapacityChangedEvent {
        slot_date,
        available: outcome.remaining,
        timestamp: Utc::now().timestamp(),
    });

    Ok(Json(CreateReservationResponse {
        success: true,
        reservation_id: outcome.reservation_id,
        remaining_capacity: outcome.remaining,
        notification_queued: outcome.notification_queued,
    }))
}

/// POST /v1/reservations/verify
/// Confirm-on-verify: the client submits a guess, the comparison happens
/// server-side only. Repeating a correct verify returns success again
/// without re-transitioning.
pub async fn verify_reservation(
    State(state): State<AppState>,
    Json(req): Json<VerifyReservationRequest>,
) -> Result<Json<VerifyReservationResponse>, ApiError> {
    let reservation = state.coordinator.verify(&req.phone, &req.code).await?;

    Ok(Json(VerifyReservationResponse {
        success: true,
        reservation: reservation.into(),
    }))
}

/// POST /v1/reservations/{id}/cancel
pub async fn cancel_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelReservationRequest>>,
) -> Result<Json<CancelReservationResponse>, ApiError> {
    let reason = body.as_ref().and_then(|b| b.reason.as_deref());
    let (cancelled, available) = state.coordinator.cancel(id, reason).await?;

    let _ = state.capacity_tx.send(CapacityChangedEvent {
        slot_date: cancelled.slot_date,
        available,
        timestamp: Utc::now().timestamp(),
    });

    Ok(Json(CancelReservationResponse {
        success: true,
        spaces_available: available,
    }))
}
