use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use washbay_core::BookingError;

#[derive(Debug)]
pub enum ApiError {
    Booking(BookingError),
    Unauthorized(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Booking(err) => {
                let status = match &err {
                    BookingError::Validation(_) | BookingError::InvalidDate(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    BookingError::InvalidVerificationCode => StatusCode::BAD_REQUEST,
                    BookingError::InsufficientCapacity
                    | BookingError::DuplicateReservation
                    | BookingError::AlreadyCancelled => StatusCode::CONFLICT,
                    BookingError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                    BookingError::NotFound => StatusCode::NOT_FOUND,
                    BookingError::Unavailable(detail) => {
                        tracing::error!("storage unavailable: {}", detail);
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                };
                (status, err.kind(), err.to_string())
            }
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        ApiError::Booking(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Anyhow(err)
    }
}
