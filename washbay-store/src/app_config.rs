use serde::Deserialize;
use std::env;
use std::str::FromStr;

use chrono::Weekday;
use washbay_core::ScheduleRules;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub admin: AdminConfig,
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    pub token: String,
}

/// Deployment schedule, deserialized with weekdays as strings ("wed",
/// "saturday", ...) and converted into `ScheduleRules` after load.
#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_weekdays")]
    pub allowed_weekdays: Vec<String>,
    #[serde(default = "default_capacity")]
    pub default_capacity: i32,
    #[serde(default = "default_horizon")]
    pub snapshot_horizon_days: u32,
    #[serde(default = "default_max_price")]
    pub max_price_cents: i64,
    #[serde(default = "default_rate_max")]
    pub rate_limit_max: u32,
    #[serde(default = "default_rate_window")]
    pub rate_limit_window_secs: u64,
}

fn default_weekdays() -> Vec<String> {
    vec!["wed".to_string()]
}
fn default_capacity() -> i32 {
    8
}
fn default_horizon() -> u32 {
    56
}
fn default_max_price() -> i64 {
    50_000
}
fn default_rate_max() -> u32 {
    10
}
fn default_rate_window() -> u64 {
    3600
}

impl ScheduleConfig {
    pub fn rules(&self) -> Result<ScheduleRules, config::ConfigError> {
        let mut allowed = Vec::with_capacity(self.allowed_weekdays.len());
        for name in &self.allowed_weekdays {
            let day = Weekday::from_str(name).map_err(|_| {
                config::ConfigError::Message(format!("unknown weekday: {}", name))
            })?;
            allowed.push(day);
        }
        if allowed.is_empty() {
            return Err(config::ConfigError::Message(
                "schedule.allowed_weekdays must not be empty".to_string(),
            ));
        }
        Ok(ScheduleRules {
            allowed_weekdays: allowed,
            default_capacity: self.default_capacity,
            snapshot_horizon_days: self.snapshot_horizon_days,
            max_price_cents: self.max_price_cents,
            rate_limit_max: self.rate_limit_max,
            rate_limit_window_secs: self.rate_limit_window_secs,
        })
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file
            // Default to 'development' env
            // Note that this file is _optional_
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked in to git
            .add_source(config::File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of WASHBAY)
            // Eg.. `WASHBAY__SERVER__PORT=8080` would set the server port
            .add_source(config::Environment::with_prefix("WASHBAY").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weekday_parsing() {
        let schedule = ScheduleConfig {
            allowed_weekdays: vec!["wed".to_string(), "saturday".to_string()],
            default_capacity: 8,
            snapshot_horizon_days: 56,
            max_price_cents: 50_000,
            rate_limit_max: 10,
            rate_limit_window_secs: 3600,
        };
        let rules = schedule.rules().unwrap();
        assert_eq!(rules.allowed_weekdays, vec![Weekday::Wed, Weekday::Sat]);
    }

    #[test]
    fn test_unknown_weekday_rejected() {
        let schedule = ScheduleConfig {
            allowed_weekdays: vec!["noday".to_string()],
            default_capacity: default_capacity(),
            snapshot_horizon_days: default_horizon(),
            max_price_cents: default_max_price(),
            rate_limit_max: default_rate_max(),
            rate_limit_window_secs: default_rate_window(),
        };
        assert!(schedule.rules().is_err());
    }
}
