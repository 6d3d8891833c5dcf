use chrono::{NaiveDate, Utc};
use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;

use washbay_core::repository::{NotificationDispatcher, RateGuard, ReservationLedger};
use washbay_core::validation::validate_create;
use washbay_core::{
    BookingError, CreateOutcome, CreateReservationRequest, NewReservation, Reservation,
    ScheduleRules,
};
use washbay_shared::pii::mask_phone;

/// Orchestrates validated, duplicate-free, rate-guarded slot consumption.
/// Atomicity of the capacity/ledger pair lives in the storage layer; this
/// type owns the ordering of the guards around it.
pub struct BookingCoordinator {
    ledger: Arc<dyn ReservationLedger>,
    rate_guard: Arc<dyn RateGuard>,
    notifier: Arc<dyn NotificationDispatcher>,
    rules: ScheduleRules,
}

impl BookingCoordinator {
    pub fn new(
        ledger: Arc<dyn ReservationLedger>,
        rate_guard: Arc<dyn RateGuard>,
        notifier: Arc<dyn NotificationDispatcher>,
        rules: ScheduleRules,
    ) -> Self {
        Self {
            ledger,
            rate_guard,
            notifier,
            rules,
        }
    }

    pub async fn create(
        &self,
        request: CreateReservationRequest,
    ) -> Result<CreateOutcome, BookingError> {
        self.create_at(request, Utc::now().date_naive()).await
    }

    /// `today` is injected so callers (and tests) control the future-date
    /// check deterministically.
    pub async fn create_at(
        &self,
        request: CreateReservationRequest,
        today: NaiveDate,
    ) -> Result<CreateOutcome, BookingError> {
        validate_create(&request, &self.rules, today)?;

        if self
            .ledger
            .find_active(&request.phone, request.slot_date)
            .await?
            .is_some()
        {
            return Err(BookingError::DuplicateReservation);
        }

        match self.rate_guard.check(&request.phone).await {
            Ok(true) => {}
            Ok(false) => return Err(BookingError::RateLimited),
            Err(e) => {
                // A broken limiter must not take bookings down. Fail open.
                tracing::warn!("rate guard unavailable, allowing request: {}", e);
            }
        }

        let code = generate_verification_code();
        let new = NewReservation {
            slot_date: request.slot_date,
            phone: request.phone,
            vehicle: request.vehicle,
            services: request.services,
            price_cents: request.price_cents,
            notes: request.notes,
            verification_code: code.clone(),
        };

        let (reservation, remaining) = self.ledger.insert_with_decrement(new).await?;

        tracing::info!(
            reservation_id = %reservation.id,
            slot_date = %reservation.slot_date,
            phone = %mask_phone(&reservation.phone),
            remaining,
            "reservation created"
        );

        // Fire-and-forget: delivery failure never rolls back the committed
        // reservation or its capacity decrement.
        let notifier = self.notifier.clone();
        let phone = reservation.phone.clone();
        let message = format!(
            "Washbay: your reservation for {} is pending. Reply with code {} to confirm.",
            reservation.slot_date, code
        );
        tokio::spawn(async move {
            if let Err(e) = notifier.send(&phone, &message).await {
                tracing::warn!(
                    phone = %mask_phone(&phone),
                    "verification notification failed: {}",
                    e
                );
            }
        });

        Ok(CreateOutcome {
            reservation_id: reservation.id,
            remaining,
            notification_queued: true,
        })
    }

    /// Confirm-on-verify: a reservation stays Pending until the client echoes
    /// its code back. The expected code is compared here, server-side only;
    /// repeating a correct verify is a no-op success.
    pub async fn verify(&self, phone: &str, code: &str) -> Result<Reservation, BookingError> {
        let found = self
            .ledger
            .find_by_code(phone, code)
            .await?
            .ok_or(BookingError::InvalidVerificationCode)?;

        match found.status {
            washbay_core::ReservationStatus::Confirmed => Ok(found),
            washbay_core::ReservationStatus::Pending => {
                let confirmed = self.ledger.mark_confirmed(found.id).await.map_err(|e| {
                    match e {
                        // Lost a race with another transition; to the caller
                        // the code simply no longer matches a pending row.
                        BookingError::NotFound => BookingError::InvalidVerificationCode,
                        other => other,
                    }
                })?;
                tracing::info!(
                    reservation_id = %confirmed.id,
                    phone = %mask_phone(phone),
                    "reservation confirmed"
                );
                Ok(confirmed)
            }
            washbay_core::ReservationStatus::Cancelled => {
                Err(BookingError::InvalidVerificationCode)
            }
        }
    }

    /// Idempotent under retries: the storage layer rejects a second cancel
    /// with `AlreadyCancelled` before any second increment can happen.
    pub async fn cancel(
        &self,
        id: Uuid,
        reason: Option<&str>,
    ) -> Result<(Reservation, i32), BookingError> {
        let (cancelled, available) = self.ledger.cancel_with_release(id, reason).await?;
        tracing::info!(
            reservation_id = %cancelled.id,
            slot_date = %cancelled.slot_date,
            available,
            "reservation cancelled"
        );
        Ok((cancelled, available))
    }
}

fn generate_verification_code() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..1_000_000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_code_is_six_digits() {
        for _ in 0..100 {
            let code = generate_verification_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
