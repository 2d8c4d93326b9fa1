use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;

use crate::models::FallbackCodePolicy;

/// Application-level constants
pub const APP_NAME: &str = "Medicine Dispenser";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Identity-document numbers are 12 digits.
pub const DEFAULT_IDENTITY_LENGTH: usize = 12;

/// One-time passcode lifetime (5 minutes).
pub const DEFAULT_OTP_TTL_SECS: u64 = 300;

/// Well-known code accepted while delivery runs in demo mode.
pub const DEFAULT_FALLBACK_CODE: &str = "123456";

/// First-run recognition can take close to a minute.
pub const DEFAULT_RECOGNITION_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 10;

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,medicine_dispenser=debug"
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

/// Runtime settings for the dispenser core.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispenserConfig {
    pub identity_length: usize,
    pub otp_ttl_secs: u64,
    pub fallback_code: String,
    pub fallback_policy: FallbackCodePolicy,
    pub recognition_timeout_secs: u64,
    /// Notification relay; `None` runs delivery in demo mode.
    pub delivery_webhook_url: Option<String>,
    pub delivery_timeout_secs: u64,
}

impl Default for DispenserConfig {
    fn default() -> Self {
        Self {
            identity_length: DEFAULT_IDENTITY_LENGTH,
            otp_ttl_secs: DEFAULT_OTP_TTL_SECS,
            fallback_code: DEFAULT_FALLBACK_CODE.to_string(),
            fallback_policy: FallbackCodePolicy::default(),
            recognition_timeout_secs: DEFAULT_RECOGNITION_TIMEOUT_SECS,
            delivery_webhook_url: None,
            delivery_timeout_secs: DEFAULT_DELIVERY_TIMEOUT_SECS,
        }
    }
}

impl DispenserConfig {
    /// Defaults overridden by `DISPENSER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = lookup("DISPENSER_IDENTITY_LENGTH") {
            config.identity_length = parse_var("DISPENSER_IDENTITY_LENGTH", &v)?;
        }
        if let Some(v) = lookup("DISPENSER_OTP_TTL_SECS") {
            config.otp_ttl_secs = parse_var("DISPENSER_OTP_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("DISPENSER_FALLBACK_CODE") {
            config.fallback_code = v;
        }
        if let Some(v) = lookup("DISPENSER_FALLBACK_POLICY") {
            config.fallback_policy = parse_var("DISPENSER_FALLBACK_POLICY", &v)?;
        }
        if let Some(v) = lookup("DISPENSER_RECOGNITION_TIMEOUT_SECS") {
            config.recognition_timeout_secs = parse_var("DISPENSER_RECOGNITION_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("DISPENSER_DELIVERY_WEBHOOK_URL") {
            config.delivery_webhook_url = Some(v).filter(|url| !url.trim().is_empty());
        }
        if let Some(v) = lookup("DISPENSER_DELIVERY_TIMEOUT_SECS") {
            config.delivery_timeout_secs = parse_var("DISPENSER_DELIVERY_TIMEOUT_SECS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot be used, such as a passcode
    /// lifetime too long to represent as a time span.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if checked_otp_ttl(self.otp_ttl_secs).is_none() {
            return Err(ConfigError::InvalidValue {
                var: "DISPENSER_OTP_TTL_SECS",
                value: self.otp_ttl_secs.to_string(),
            });
        }
        Ok(())
    }

    /// Passcode lifetime. An unrepresentable value (only reachable by
    /// skipping `validate`) falls back to the default.
    pub fn otp_ttl(&self) -> TimeDelta {
        checked_otp_ttl(self.otp_ttl_secs).unwrap_or_else(|| {
            tracing::warn!(
                otp_ttl_secs = self.otp_ttl_secs,
                "Passcode lifetime out of range, using default"
            );
            TimeDelta::seconds(DEFAULT_OTP_TTL_SECS as i64)
        })
    }

    pub fn recognition_timeout(&self) -> Duration {
        Duration::from_secs(self.recognition_timeout_secs)
    }
}

fn checked_otp_ttl(secs: u64) -> Option<TimeDelta> {
    i64::try_from(secs).ok().and_then(TimeDelta::try_seconds)
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
    })
}
