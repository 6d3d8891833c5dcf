use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use washbay_shared::models::events::CapacityChangedEvent;
use washbay_sync::CapacitySnapshot;

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SnapshotQuery {
    pub from: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ResetCapacityRequest {
    pub available: i32,
    pub actor: String,
}

#[derive(Debug, Serialize)]
pub struct ResetCapacityResponse {
    pub audit_id: Uuid,
    pub slot_date: NaiveDate,
    pub available_before: i32,
    pub available_after: i32,
    pub actor: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /v1/capacity?from=YYYY-MM-DD
/// Authoritative snapshot for the sync protocol. The content hash is computed
/// with the same function the client-side differ uses, so both sides agree on
/// what "changed" means.
pub async fn get_snapshot(
    State(state): State<AppState>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<CapacitySnapshot>, ApiError> {
    let from = query.from.unwrap_or_else(|| Utc::now().date_naive());
    let rows = state.capacity.snapshot_from(from).await?;
    Ok(Json(CapacitySnapshot::from_rows(&rows, Utc::now())))
}

/// POST /v1/admin/capacity/{date}/reset
/// Audited administrative reset: records before/after values and the acting
/// operator. This is the only sanctioned way to force a capacity value;
/// clients can never trigger it.
pub async fn reset_capacity(
    State(state): State<AppState>,
    Path(date): Path<NaiveDate>,
    headers: HeaderMap,
    Json(req): Json<ResetCapacityRequest>,
) -> Result<Json<ResetCapacityResponse>, ApiError> {
    require_admin(&state, &headers)?;

    let reset = state
        .capacity
        .reset_capacity(date, req.available, &req.actor)
        .await?;

    let _ = state.capacity_tx.send(CapacityChangedEvent {
        slot_date: reset.slot_date,
        available: reset.available_after,
        timestamp: Utc::now().timestamp(),
    });

    Ok(Json(ResetCapacityResponse {
        audit_id: reset.id,
        slot_date: reset.slot_date,
        available_before: reset.available_before,
        available_after: reset.available_after,
        actor: reset.actor,
    }))
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let authorized = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == state.admin_token);

    if authorized {
        Ok(())
    } else {
        Err(ApiError::Unauthorized(
            "admin token required".to_string(),
        ))
    }
}
