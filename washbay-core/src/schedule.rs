use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Deployment-wide scheduling rules: which weekdays are serviced, how many
/// units each serviced date starts with, and the guard rails the coordinator
/// applies to incoming requests.
#[derive(Debug, Clone)]
pub struct ScheduleRules {
    pub allowed_weekdays: Vec<Weekday>,
    pub default_capacity: i32,
    pub snapshot_horizon_days: u32,
    pub max_price_cents: i64,
    pub rate_limit_max: u32,
    pub rate_limit_window_secs: u64,
}

impl Default for ScheduleRules {
    fn default() -> Self {
        Self {
            allowed_weekdays: vec![Weekday::Wed],
            default_capacity: 8,
            snapshot_horizon_days: 56,
            max_price_cents: 50_000,
            rate_limit_max: 10,
            rate_limit_window_secs: 3600,
        }
    }
}

impl ScheduleRules {
    pub fn is_allowed_weekday(&self, date: NaiveDate) -> bool {
        self.allowed_weekdays.contains(&date.weekday())
    }

    /// A date is bookable when it falls on a serviced weekday and lies
    /// strictly in the future.
    pub fn is_bookable(&self, date: NaiveDate, today: NaiveDate) -> bool {
        self.is_allowed_weekday(date) && date > today
    }

    /// Serviced dates in `[from, from + snapshot_horizon_days)`, ascending.
    pub fn serviced_dates_from(&self, from: NaiveDate) -> Vec<NaiveDate> {
        (0..self.snapshot_horizon_days as i64)
            .map(|offset| from + Duration::days(offset))
            .filter(|d| self.is_allowed_weekday(*d))
            .collect()
    }
}
