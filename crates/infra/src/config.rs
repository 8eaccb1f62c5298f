//! Environment configuration.

use std::time::Duration;

use tablepos_export::chunker::MAX_PAGE_SIZE;

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Process-wide settings for the sequence and export pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Postgres connection string; `None` selects in-memory stores.
    pub database_url: Option<String>,
    pub export_page_size: u64,
    pub sequence_width: usize,
    pub daily_sequence_width: usize,
    pub rollover_hour: u32,
    pub utc_offset_minutes: i32,
    pub request_timeout: Duration,
    /// How long completed export pages stay readable in the job queue.
    pub job_retention: Duration,
    pub bind_addr: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            export_page_size: 5_000,
            sequence_width: 6,
            daily_sequence_width: 4,
            rollover_hour: 0,
            utc_offset_minutes: 0,
            request_timeout: Duration::from_millis(3_000),
            job_retention: Duration::from_secs(24 * 60 * 60),
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let export_page_size = parse(&get, "EXPORT_PAGE_SIZE", defaults.export_page_size)?;
        if export_page_size == 0 || export_page_size > MAX_PAGE_SIZE {
            return Err(invalid("EXPORT_PAGE_SIZE", export_page_size));
        }

        let sequence_width = parse(&get, "SEQUENCE_WIDTH", defaults.sequence_width)?;
        if sequence_width == 0 {
            return Err(invalid("SEQUENCE_WIDTH", sequence_width));
        }

        let daily_sequence_width =
            parse(&get, "DAILY_SEQUENCE_WIDTH", defaults.daily_sequence_width)?;
        if daily_sequence_width == 0 {
            return Err(invalid("DAILY_SEQUENCE_WIDTH", daily_sequence_width));
        }

        let rollover_hour = parse(&get, "BUSINESS_DAY_ROLLOVER_HOUR", defaults.rollover_hour)?;
        if rollover_hour > 23 {
            return Err(invalid("BUSINESS_DAY_ROLLOVER_HOUR", rollover_hour));
        }

        let utc_offset_minutes =
            parse(&get, "BUSINESS_UTC_OFFSET_MINUTES", defaults.utc_offset_minutes)?;
        if utc_offset_minutes.abs() >= 24 * 60 {
            return Err(invalid("BUSINESS_UTC_OFFSET_MINUTES", utc_offset_minutes));
        }

        let timeout_ms: u64 = parse(
            &get,
            "REQUEST_TIMEOUT_MS",
            defaults.request_timeout.as_millis() as u64,
        )?;
        if timeout_ms == 0 {
            return Err(invalid("REQUEST_TIMEOUT_MS", timeout_ms));
        }

        let retention_secs: u64 = parse(
            &get,
            "JOB_RETENTION_SECS",
            defaults.job_retention.as_secs(),
        )?;

        Ok(Self {
            database_url: get("DATABASE_URL"),
            export_page_size,
            sequence_width,
            daily_sequence_width,
            rollover_hour,
            utc_offset_minutes,
            request_timeout: Duration::from_millis(timeout_ms),
            job_retention: Duration::from_secs(retention_secs),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
        })
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

fn invalid(key: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
    }
}
