use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub matching_interval_ms: u64,
    pub matching_batch_size: usize,
    pub event_buffer_size: usize,
    pub base_fare: u64,
    pub fare_per_distance: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            matching_interval_ms: parse_or_default("MATCHING_INTERVAL_MS", 500)?,
            matching_batch_size: parse_or_default("MATCHING_BATCH_SIZE", 30)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            base_fare: parse_or_default("BASE_FARE", 500)?,
            fare_per_distance: parse_or_default("FARE_PER_DISTANCE", 100)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.matching_interval_ms == 0 {
            return Err(AppError::Internal(
                "MATCHING_INTERVAL_MS must be > 0".to_string(),
            ));
        }
        if self.matching_batch_size == 0 {
            return Err(AppError::Internal(
                "MATCHING_BATCH_SIZE must be > 0".to_string(),
            ));
        }
        if self.event_buffer_size == 0 {
            return Err(AppError::Internal(
                "EVENT_BUFFER_SIZE must be > 0".to_string(),
            ));
        }

        Ok(())
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
