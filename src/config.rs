//! Settings read from the environment (after `.env` is loaded)

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::services::pipeline_service::PipelineConfig;
use crate::utils::retry::RetryPolicy;

const MAX_BURN_RATE_WINDOW_DAYS: u32 = 365;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub openai_api_key: Option<String>,
    pub database_url: Option<String>,
    pub meta_access_token: String,
    pub meta_phone_number_id: String,
    pub meta_webhook_verify_token: String,
    pub meta_app_id: Option<String>,
    pub meta_app_secret: Option<String>,
    pub host: String,
    pub port: u16,
    pub minimum_balance_alert: Decimal,
    pub default_currency: String,
    pub commit_threshold: f64,
    pub model_confidence_threshold: f64,
    pub pending_timeout_secs: u64,
    pub burn_rate_window_days: u32,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub whatsapp_rate_limit_per_sec: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let settings = Settings {
            openai_api_key: get("OPENAI_API_KEY"),
            database_url: get("DATABASE_URL"),
            meta_access_token: required("META_ACCESS_TOKEN")?,
            meta_phone_number_id: required("META_PHONE_NUMBER_ID")?,
            meta_webhook_verify_token: required("META_WEBHOOK_VERIFY_TOKEN")?,
            meta_app_id: get("META_APP_ID"),
            meta_app_secret: get("META_APP_SECRET"),
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(get("PORT"), "PORT", 8000)?,
            minimum_balance_alert: parse_or(get("MINIMUM_BALANCE_ALERT"), "MINIMUM_BALANCE_ALERT", Decimal::from(500))?,
            default_currency: get("DEFAULT_CURRENCY")
                .unwrap_or_else(|| "MXN".to_string())
                .to_uppercase(),
            commit_threshold: parse_or(get("COMMIT_THRESHOLD"), "COMMIT_THRESHOLD", 0.8)?,
            model_confidence_threshold: parse_or(get("MODEL_CONFIDENCE_THRESHOLD"), "MODEL_CONFIDENCE_THRESHOLD", 0.6)?,
            pending_timeout_secs: parse_or(get("PENDING_TIMEOUT_SECS"), "PENDING_TIMEOUT_SECS", 120)?,
            burn_rate_window_days: parse_or(get("BURN_RATE_WINDOW_DAYS"), "BURN_RATE_WINDOW_DAYS", 7)?,
            retry_max_attempts: parse_or(get("RETRY_MAX_ATTEMPTS"), "RETRY_MAX_ATTEMPTS", 3)?,
            retry_base_delay_ms: parse_or(get("RETRY_BASE_DELAY_MS"), "RETRY_BASE_DELAY_MS", 250)?,
            whatsapp_rate_limit_per_sec: parse_or(get("WHATSAPP_RATE_LIMIT_PER_SEC"), "WHATSAPP_RATE_LIMIT_PER_SEC", 20)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("COMMIT_THRESHOLD", self.commit_threshold),
            ("MODEL_CONFIDENCE_THRESHOLD", self.model_confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(key, value, "must be between 0 and 1"));
            }
        }
        if self.default_currency.len() != 3 || !self.default_currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(invalid("DEFAULT_CURRENCY", &self.default_currency, "must be a 3-letter code"));
        }
        if self.retry_max_attempts == 0 {
            return Err(invalid("RETRY_MAX_ATTEMPTS", self.retry_max_attempts, "must be at least 1"));
        }
        if !(1..=MAX_BURN_RATE_WINDOW_DAYS).contains(&self.burn_rate_window_days) {
            return Err(invalid(
                "BURN_RATE_WINDOW_DAYS",
                self.burn_rate_window_days,
                "must be between 1 and 365",
            ));
        }
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            commit_threshold: self.commit_threshold,
            pending_timeout: chrono::Duration::seconds(self.pending_timeout_secs as i64),
            currency: self.default_currency.clone(),
            ..PipelineConfig::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match raw {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

fn invalid(key: &'static str, value: impl Display, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let mut env: HashMap<String, String> = [
            ("META_ACCESS_TOKEN", "token"),
            ("META_PHONE_NUMBER_ID", "12345"),
            ("META_WEBHOOK_VERIFY_TOKEN", "verify"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in pairs {
            env.insert(k.to_string(), v.to_string());
        }
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = settings(&[]).unwrap();
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.minimum_balance_alert, Decimal::from(500));
        assert_eq!(settings.default_currency, "MXN");
        assert_eq!(settings.commit_threshold, 0.8);
        assert_eq!(settings.pending_timeout_secs, 120);
        assert_eq!(settings.openai_api_key, None);
        assert_eq!(settings.bind_address(), "0.0.0.0:8000");

        let pipeline = settings.pipeline_config();
        assert_eq!(pipeline.pending_timeout, chrono::Duration::minutes(2));
        assert_eq!(settings.retry_policy().max_attempts, 3);
    }

    #[test]
    fn test_overrides() {
        let settings = settings(&[
            ("PORT", "9000"),
            ("MINIMUM_BALANCE_ALERT", "250.50"),
            ("DEFAULT_CURRENCY", "usd"),
            ("DATABASE_URL", "mysql://localhost/lanabot"),
        ])
        .unwrap();
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.minimum_balance_alert, Decimal::new(25050, 2));
        assert_eq!(settings.default_currency, "USD");
        assert_eq!(settings.database_url.as_deref(), Some("mysql://localhost/lanabot"));
    }

    #[test]
    fn test_missing_required_value() {
        let result = Settings::from_lookup(|_| None);
        assert_eq!(result.unwrap_err(), ConfigError::Missing("META_ACCESS_TOKEN"));

        let blank = settings(&[("META_WEBHOOK_VERIFY_TOKEN", "  ")]);
        assert_eq!(blank.unwrap_err(), ConfigError::Missing("META_WEBHOOK_VERIFY_TOKEN"));
    }

    #[test]
    fn test_malformed_values() {
        assert!(matches!(
            settings(&[("PORT", "ochenta")]),
            Err(ConfigError::Invalid { key: "PORT", .. })
        ));
        assert!(matches!(
            settings(&[("COMMIT_THRESHOLD", "1.5")]),
            Err(ConfigError::Invalid { key: "COMMIT_THRESHOLD", .. })
        ));
        assert!(matches!(
            settings(&[("DEFAULT_CURRENCY", "pesos")]),
            Err(ConfigError::Invalid { key: "DEFAULT_CURRENCY", .. })
        ));
        assert!(matches!(
            settings(&[("BURN_RATE_WINDOW_DAYS", "4000000000")]),
            Err(ConfigError::Invalid { key: "BURN_RATE_WINDOW_DAYS", .. })
        ));
        assert!(settings(&[("BURN_RATE_WINDOW_DAYS", "365")]).is_ok());
    }
}
