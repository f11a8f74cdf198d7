use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::models::location::TrackingOptions;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub confirmation_queue_size: usize,
    pub tracking: TrackingOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            confirmation_queue_size: 64,
            tracking: TrackingOptions::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let tracking = TrackingOptions {
            high_accuracy: parse_or_default("TRACKING_HIGH_ACCURACY", defaults.tracking.high_accuracy)?,
            max_fix_age: Duration::from_millis(parse_or_default(
                "TRACKING_MAX_AGE_MS",
                defaults.tracking.max_fix_age.as_millis() as u64,
            )?),
            fix_timeout: Duration::from_millis(parse_or_default(
                "TRACKING_TIMEOUT_MS",
                defaults.tracking.fix_timeout.as_millis() as u64,
            )?),
            poll_interval_seconds: parse_or_default(
                "TRACKING_INTERVAL_SECS",
                defaults.tracking.poll_interval_seconds,
            )?,
            adapt_to_low_battery: parse_or_default(
                "TRACKING_SAVE_BATTERY",
                defaults.tracking.adapt_to_low_battery,
            )?,
        };
        tracking
            .validate()
            .map_err(|err| AppError::Internal(format!("invalid tracking settings: {err}")))?;

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            confirmation_queue_size: parse_or_default(
                "CONFIRMATION_QUEUE_SIZE",
                defaults.confirmation_queue_size,
            )?,
            tracking,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
