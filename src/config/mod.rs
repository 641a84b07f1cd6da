use std::env;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;

/// A JWT lifetime longer than this is a typo, not a policy.
const MAX_JWT_EXPIRATION_HOURS: u64 = 24 * 365 * 10;
const MAX_RETENTION_DAYS: i64 = 365 * 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub hmac_secret: String,
    pub signature_max_age_secs: i64,
    pub signature_max_skew_secs: i64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub auth_rate_limit_window_secs: u64,
    pub auth_rate_limit_requests: u32,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub allow_unlock_override: bool,
    pub spring_festival_dates: Vec<NaiveDate>,
    pub onboarding_bot_user_id: Option<String>,
    pub onboarding_bot_nickname: Option<String>,
    pub notification_retention_days: i64,
    pub notification_purge_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let jwt_expiration_secs = match env::var("JWT_EXPIRATION") {
            Ok(value) => parse_hours(&value)
                .and_then(hours_to_secs)
                .ok_or(ConfigError::Invalid {
                    name: "JWT_EXPIRATION",
                    value,
                })?,
            Err(_) => 24 * 7 * 3600,
        };

        let notification_retention_days =
            retention_days(optional("NOTIFICATION_RETENTION_DAYS", 90)?)?;
        let notification_purge_interval_secs =
            purge_interval(optional("NOTIFICATION_PURGE_INTERVAL_SECS", 3600)?)?;

        let spring_festival_dates = match env::var("SPRING_FESTIVAL_DATES") {
            Ok(value) => parse_festival_dates(&value).ok_or(ConfigError::Invalid {
                name: "SPRING_FESTIVAL_DATES",
                value,
            })?,
            Err(_) => Vec::new(),
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            redis_url: required("REDIS_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiration_secs,
            hmac_secret: required("HMAC_SECRET")?,
            signature_max_age_secs: optional("SIGNATURE_MAX_AGE_SECS", 120)?,
            signature_max_skew_secs: optional("SIGNATURE_MAX_SKEW_SECS", 5)?,
            rate_limit_window_secs: optional("RATE_LIMIT_WINDOW", 60)?,
            rate_limit_requests: optional("RATE_LIMIT_REQUESTS", 100)?,
            auth_rate_limit_window_secs: optional("AUTH_RATE_LIMIT_WINDOW", 3600)?,
            auth_rate_limit_requests: optional("AUTH_RATE_LIMIT_REQUESTS", 5)?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            server_port: optional("SERVER_PORT", 3000)?,
            api_base_uri: env::var("API_BASE_URI").unwrap_or_else(|_| "/api".into()),
            allow_unlock_override: optional("ALLOW_UNLOCK_OVERRIDE", false)?,
            spring_festival_dates,
            onboarding_bot_user_id: non_empty("ONBOARDING_BOT_USER_ID"),
            onboarding_bot_nickname: non_empty("ONBOARDING_BOT_NICKNAME"),
            notification_retention_days,
            notification_purge_interval_secs,
        })
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn auth_rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.auth_rate_limit_window_secs)
    }

    pub fn notification_purge_interval(&self) -> Duration {
        Duration::from_secs(self.notification_purge_interval_secs)
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn optional<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

/// Accepts `24` or `24h`.
fn parse_hours(value: &str) -> Option<u64> {
    value.trim().trim_end_matches('h').parse().ok()
}

fn retention_days(days: i64) -> Result<i64, ConfigError> {
    if (0..=MAX_RETENTION_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(ConfigError::Invalid {
            name: "NOTIFICATION_RETENTION_DAYS",
            value: days.to_string(),
        })
    }
}

/// A zero interval would make the purge ticker panic.
fn purge_interval(secs: u64) -> Result<u64, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Invalid {
            name: "NOTIFICATION_PURGE_INTERVAL_SECS",
            value: secs.to_string(),
        });
    }
    Ok(secs)
}

fn hours_to_secs(hours: u64) -> Option<u64> {
    if hours == 0 || hours > MAX_JWT_EXPIRATION_HOURS {
        return None;
    }
    hours.checked_mul(3600)
}

/// Parses `2028-01-26,2029-02-13`. Empty input yields an empty table.
fn parse_festival_dates(value: &str) -> Option<Vec<NaiveDate>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| NaiveDate::parse_from_str(entry, "%Y-%m-%d").ok())
        .collect()
}
