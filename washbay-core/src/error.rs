use thiserror::Error;

/// Error taxonomy for the allocation core. Validation and business-rule
/// failures are terminal for the request; `Unavailable` means storage could
/// not give the write a definite outcome and the caller should retry.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("date is not bookable: {0}")]
    InvalidDate(String),

    #[error("no capacity remaining for the requested date")]
    InsufficientCapacity,

    #[error("an active reservation already exists for this client and date")]
    DuplicateReservation,

    #[error("too many reservation attempts in the current window")]
    RateLimited,

    #[error("verification code does not match an active reservation")]
    InvalidVerificationCode,

    #[error("reservation not found")]
    NotFound,

    #[error("reservation is already cancelled")]
    AlreadyCancelled,

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl BookingError {
    /// Stable machine-readable kind, surfaced in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::Validation(_) => "validation_error",
            BookingError::InvalidDate(_) => "invalid_date",
            BookingError::InsufficientCapacity => "insufficient_capacity",
            BookingError::DuplicateReservation => "duplicate_reservation",
            BookingError::RateLimited => "rate_limited",
            BookingError::InvalidVerificationCode => "invalid_verification_code",
            BookingError::NotFound => "not_found",
            BookingError::AlreadyCancelled => "already_cancelled",
            BookingError::Unavailable(_) => "system_unavailable",
        }
    }
}
