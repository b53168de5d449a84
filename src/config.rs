//! Payment-link configuration.
//!
//! Every field has a default, so a partial JSON document is enough:
//!
//! ```json
//! {
//!   "link_origin": "https://pay.example.ph",
//!   "default_expiry": 14,
//!   "active_link_policy": "supersede",
//!   "operation": { "retry_count": 5 },
//!   "fee_schedule": [
//!     { "method": "gcash", "gateway_fee_percent": "1.5", "gateway_fee_fixed": "0",
//!       "service_fee_percent": "0.75", "service_fee_fixed": "200" }
//!   ]
//! }
//! ```
//!
//! Decimal amounts are written as strings.

use crate::error::{Error, Result};
use crate::fee::FeeSchedule;
use crate::link::token::MIN_TOKEN_LENGTH;
use crate::strategy::{ActiveLinkPolicy, ExpiryWindow};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry behaviour for link transitions that lose a compare-and-swap race.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationConfig {
    /// Number of retry attempts after the first (0 = no retry).
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Base delay for exponential backoff between attempts, in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl OperationConfig {
    /// Set retry count.
    ///
    /// ```
    /// use billpay_kit::config::OperationConfig;
    ///
    /// let config = OperationConfig::default().with_retry(5);
    /// assert_eq!(config.retry_count, 5);
    /// ```
    pub fn with_retry(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// Top-level configuration for [`PaymentLinkService`](crate::service::PaymentLinkService).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentsConfig {
    /// Origin customer URLs are built on: `<origin>/pay/<token>`
    #[serde(default = "default_link_origin")]
    pub link_origin: String,

    /// Expiry used when the caller does not pick one
    #[serde(default)]
    pub default_expiry: ExpiryWindow,

    /// Random characters per token
    #[serde(default = "default_token_length")]
    pub token_length: usize,

    #[serde(default)]
    pub active_link_policy: ActiveLinkPolicy,

    #[serde(default)]
    pub operation: OperationConfig,

    #[serde(default)]
    pub fee_schedule: FeeSchedule,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            link_origin: default_link_origin(),
            default_expiry: ExpiryWindow::default(),
            token_length: default_token_length(),
            active_link_policy: ActiveLinkPolicy::default(),
            operation: OperationConfig::default(),
            fee_schedule: FeeSchedule::default(),
        }
    }
}

impl PaymentsConfig {
    /// Parse and validate a JSON document.
    ///
    /// # Errors
    ///
    /// `Error::ConfigError` for malformed JSON, invalid fee rules or settings
    /// rejected by [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PaymentsConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let origin = self.link_origin.trim();
        if !(origin.starts_with("https://") || origin.starts_with("http://")) {
            return Err(Error::ConfigError(format!(
                "link_origin must be an http(s) origin, got {:?}",
                self.link_origin
            )));
        }

        if self.token_length < MIN_TOKEN_LENGTH {
            return Err(Error::ConfigError(format!(
                "token_length must be at least {}, got {}",
                MIN_TOKEN_LENGTH, self.token_length
            )));
        }

        if self.fee_schedule.enabled().next().is_none() {
            return Err(Error::ConfigError(
                "fee schedule has no enabled payment method".to_string(),
            ));
        }

        Ok(())
    }
}

fn default_link_origin() -> String {
    "http://localhost:5173".to_string()
}

fn default_token_length() -> usize {
    24
}

fn default_retry_count() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fee::PaymentMethod;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_are_valid() {
        let config = PaymentsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_expiry, ExpiryWindow::Week);
        assert_eq!(config.active_link_policy, ActiveLinkPolicy::Reject);
        assert_eq!(config.operation.retry_count, 3);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = PaymentsConfig::from_json("{}").expect("Failed to parse");
        assert_eq!(config, PaymentsConfig::default());
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{
            "link_origin": "https://pay.example.ph",
            "default_expiry": 14,
            "active_link_policy": "supersede",
            "operation": { "retry_count": 5 },
            "fee_schedule": [
                { "method": "gcash", "gateway_fee_percent": "1.5", "gateway_fee_fixed": "0",
                  "service_fee_percent": "0.75", "service_fee_fixed": "200",
                  "description": "GCash" }
            ]
        }"#;

        let config = PaymentsConfig::from_json(json).expect("Failed to parse");
        assert_eq!(config.default_expiry, ExpiryWindow::TwoWeeks);
        assert_eq!(config.active_link_policy, ActiveLinkPolicy::Supersede);
        assert_eq!(config.operation.retry_count, 5);
        assert_eq!(config.operation.backoff_ms, 10);
        assert_eq!(config.fee_schedule.rules().len(), 1);
        let gcash = config.fee_schedule.get(PaymentMethod::GCash).unwrap();
        assert_eq!(gcash.gateway_fee_percent, dec!(1.5));
        assert!(gcash.enabled);
    }

    #[test]
    fn test_rejects_negative_fee() {
        let json = r#"{ "fee_schedule": [
            { "method": "maya", "gateway_fee_percent": "-1", "gateway_fee_fixed": "0",
              "service_fee_percent": "0", "service_fee_fixed": "0", "description": "" }
        ] }"#;
        assert!(matches!(
            PaymentsConfig::from_json(json),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_rejects_bad_settings() {
        let mut config = PaymentsConfig::default();
        config.token_length = 8;
        assert!(config.validate().is_err());

        let mut config = PaymentsConfig::default();
        config.link_origin = "pay.example.ph".to_string();
        assert!(config.validate().is_err());

        assert!(PaymentsConfig::from_json(r#"{ "default_expiry": 10 }"#).is_err());
    }

    #[test]
    fn test_backoff_doubles() {
        let op = OperationConfig::default().with_backoff(Duration::from_millis(5));
        assert_eq!(op.backoff(1), Duration::from_millis(5));
        assert_eq!(op.backoff(3), Duration::from_millis(20));
    }
}
