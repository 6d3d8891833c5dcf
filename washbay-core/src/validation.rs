use chrono::NaiveDate;

use crate::error::BookingError;
use crate::models::CreateReservationRequest;
use crate::schedule::ScheduleRules;

/// Phone identity: optional leading '+', then 9 to 15 digits.
pub fn is_valid_phone(phone: &str) -> bool {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    (9..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

/// Validate a create request against the deployment rules. All violations are
/// collected so the caller sees the full list, not just the first one.
pub fn validate_create(
    req: &CreateReservationRequest,
    rules: &ScheduleRules,
    today: NaiveDate,
) -> Result<(), BookingError> {
    let mut violations = Vec::new();

    if !rules.is_bookable(req.slot_date, today) {
        if !rules.is_allowed_weekday(req.slot_date) {
            violations.push(format!(
                "{} does not fall on a serviced weekday",
                req.slot_date
            ));
        } else {
            violations.push(format!("{} is not strictly in the future", req.slot_date));
        }
    }

    if !is_valid_phone(&req.phone) {
        violations.push("phone must be 9-15 digits with an optional leading '+'".to_string());
    }

    if req.vehicle.plate.trim().is_empty() {
        violations.push("vehicle plate is required".to_string());
    }

    if req.services.is_empty() {
        violations.push("at least one service must be selected".to_string());
    } else if req.services.iter().any(|s| s.trim().is_empty()) {
        violations.push("service codes must be non-empty".to_string());
    }

    if req.price_cents <= 0 {
        violations.push("price must be positive".to_string());
    } else if req.price_cents > rules.max_price_cents {
        violations.push(format!(
            "price exceeds the maximum of {} cents",
            rules.max_price_cents
        ));
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(BookingError::Validation(violations))
    }
}
