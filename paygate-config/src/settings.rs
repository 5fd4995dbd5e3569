//! Typed settings for the payment layer.
//!
//! ```toml
//! [security]
//! internal_api_key = "change-me"
//! internal_path_prefix = "/api/internal"
//!
//! [retry]
//! max_attempts = 3
//! initial_delay_ms = 100
//!
//! [breakers.default]
//! failure_threshold = 5
//!
//! [breakers.overrides.stripe-payments]
//! failure_threshold = 3
//!
//! [gateways]
//! default = "razorpay"
//!
//! [gateways.razorpay]
//! key_id = "rzp_test_123"
//! key_secret = "..."
//! webhook_secret = "..."
//! ```
//!
//! Every key can be overridden from the environment, e.g.
//! `PAYGATE_GATEWAYS__RAZORPAY__KEY_SECRET`.

use crate::{ConfigService, ConfigValidator, ENV_PREFIX, Result, Validate, ValidationReport};
use paygate_core::resilience::{
    BackoffStrategy, CircuitBreakerConfig, CircuitBreakerRegistry, RetryConfig,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_INTERNAL_PATH_PREFIX: &str = "/api/internal";
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;

/// Gateway names accepted in `gateways.default`.
pub const GATEWAY_NAMES: [&str; 3] = ["razorpay", "stripe", "upi"];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PaygateSettings {
    pub security: SecuritySettings,
    pub retry: RetrySettings,
    pub breakers: BreakersSettings,
    pub gateways: GatewaysSettings,
}

impl PaygateSettings {
    /// Bind and validate settings from a built configuration service.
    pub fn from_service(service: &ConfigService) -> Result<Self> {
        service.bind()
    }

    /// Optional `.env`, then `PAYGATE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let service = ConfigService::builder()
            .with_prefix(ENV_PREFIX)
            .load_dotenv(None)
            .load_env()
            .build()?;
        Self::from_service(&service)
    }
}

impl Validate for PaygateSettings {
    fn validate(&self) -> Result<()> {
        let mut report = ValidationReport::new();
        self.security.check(&mut report);
        self.retry.check(&mut report);
        self.breakers.check(&mut report);
        self.gateways.check(&mut report);
        report.finish()
    }
}

/// Internal API-key gate.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    /// Requests to internal paths are refused when unset.
    #[serde(deserialize_with = "lenient::opt_secret")]
    pub internal_api_key: Option<SecretString>,
    pub internal_path_prefix: String,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            internal_api_key: None,
            internal_path_prefix: DEFAULT_INTERNAL_PATH_PREFIX.to_string(),
        }
    }
}

impl SecuritySettings {
    fn check(&self, report: &mut ValidationReport) {
        report.check(ConfigValidator::is_path(
            &self.internal_path_prefix,
            "security.internal_path_prefix",
        ));
        if let Some(key) = &self.internal_api_key {
            report.check(ConfigValidator::not_blank(
                key.expose_secret(),
                "security.internal_api_key",
            ));
        }
    }
}

/// Retry policy for idempotent provider reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
        }
    }
}

impl RetrySettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Uncapped doubling backoff starting at `initial_delay`.
    pub fn to_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_attempts)
            .backoff(BackoffStrategy::exponential(self.initial_delay()).with_max(Duration::MAX))
    }

    fn check(&self, report: &mut ValidationReport) {
        report
            .check(ConfigValidator::in_range(self.max_attempts, 0, 10, "retry.max_attempts"))
            .check(ConfigValidator::in_range(
                self.initial_delay_ms,
                0,
                60_000,
                "retry.initial_delay_ms",
            ));
    }
}

/// Thresholds for one circuit breaker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub failure_rate_threshold: f64,
    pub minimum_calls: u32,
    pub success_threshold: u32,
    pub half_open_requests: u32,
    pub reset_timeout_ms: u64,
    pub window_ms: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            failure_threshold: defaults.failure_threshold,
            failure_rate_threshold: defaults.failure_rate_threshold,
            minimum_calls: defaults.minimum_calls,
            success_threshold: defaults.success_threshold,
            half_open_requests: defaults.half_open_requests,
            reset_timeout_ms: defaults.reset_timeout.as_millis() as u64,
            window_ms: defaults.failure_window.as_millis() as u64,
        }
    }
}

impl BreakerSettings {
    pub fn to_config(&self, name: &str) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new(name)
            .failure_threshold(self.failure_threshold)
            .failure_rate_threshold(self.failure_rate_threshold)
            .minimum_calls(self.minimum_calls)
            .success_threshold(self.success_threshold)
            .half_open_requests(self.half_open_requests)
            .reset_timeout(Duration::from_millis(self.reset_timeout_ms))
            .failure_window(Duration::from_millis(self.window_ms))
    }

    fn check(&self, field: &str, report: &mut ValidationReport) {
        report
            .require(
                self.failure_threshold >= 1,
                format!("{}.failure_threshold must be at least 1", field),
            )
            .check(ConfigValidator::in_range(
                self.failure_rate_threshold,
                0.0,
                1.0,
                &format!("{}.failure_rate_threshold", field),
            ))
            .require(
                self.success_threshold >= 1,
                format!("{}.success_threshold must be at least 1", field),
            )
            .require(
                self.half_open_requests >= self.success_threshold,
                format!(
                    "{}.half_open_requests must be at least success_threshold",
                    field
                ),
            )
            .require(self.window_ms > 0, format!("{}.window_ms must be positive", field));
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BreakersSettings {
    /// Used for every breaker without an override.
    pub default: BreakerSettings,
    /// Per-breaker settings keyed by breaker name, e.g. `stripe-payments`.
    pub overrides: HashMap<String, BreakerSettings>,
}

impl BreakersSettings {
    pub fn for_name(&self, name: &str) -> CircuitBreakerConfig {
        self.overrides
            .get(name)
            .unwrap_or(&self.default)
            .to_config(name)
    }

    /// Install the default and every override into `registry`.
    pub fn apply(&self, registry: &CircuitBreakerRegistry) {
        registry.set_default_config(self.default.to_config("default"));
        for (name, settings) in &self.overrides {
            registry.configure(settings.to_config(name));
        }
    }

    fn check(&self, report: &mut ValidationReport) {
        self.default.check("breakers.default", report);
        for (name, settings) in &self.overrides {
            settings.check(&format!("breakers.overrides.{}", name), report);
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GatewaysSettings {
    /// Gateway used when a request carries no explicit choice.
    pub default: Option<String>,
    pub stripe: Option<StripeSettings>,
    pub razorpay: Option<RazorpaySettings>,
    pub upi: Option<UpiSettings>,
}

impl GatewaysSettings {
    pub fn configured(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.razorpay.is_some() {
            names.push("razorpay");
        }
        if self.stripe.is_some() {
            names.push("stripe");
        }
        if self.upi.is_some() {
            names.push("upi");
        }
        names
    }

    fn check(&self, report: &mut ValidationReport) {
        if let Some(default) = &self.default {
            let name = default.to_ascii_lowercase();
            report.check(ConfigValidator::one_of(
                &name.as_str(),
                &GATEWAY_NAMES,
                "gateways.default",
            ));
            if GATEWAY_NAMES.contains(&name.as_str()) {
                report.require(
                    self.configured().contains(&name.as_str()),
                    format!("gateways.default is {} but gateways.{} is not configured", name, name),
                );
            }
        }

        if let Some(stripe) = &self.stripe {
            report.check(ConfigValidator::not_blank(
                stripe.secret_key.expose_secret(),
                "gateways.stripe.secret_key",
            ));
            check_optional_url(report, stripe.base_url.as_deref(), "gateways.stripe.base_url");
        }
        if let Some(razorpay) = &self.razorpay {
            report
                .check(ConfigValidator::not_blank(&razorpay.key_id, "gateways.razorpay.key_id"))
                .check(ConfigValidator::not_blank(
                    razorpay.key_secret.expose_secret(),
                    "gateways.razorpay.key_secret",
                ));
            check_optional_url(report, razorpay.base_url.as_deref(), "gateways.razorpay.base_url");
        }
        if let Some(upi) = &self.upi {
            report
                .check(ConfigValidator::not_blank(
                    upi.api_key.expose_secret(),
                    "gateways.upi.api_key",
                ))
                .check(ConfigValidator::is_url(&upi.base_url, "gateways.upi.base_url"));
        }
    }
}

fn check_optional_url(report: &mut ValidationReport, url: Option<&str>, field: &str) {
    if let Some(url) = url {
        report.check(ConfigValidator::is_url(url, field));
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeSettings {
    #[serde(deserialize_with = "lenient::secret")]
    pub secret_key: SecretString,
    #[serde(default, deserialize_with = "lenient::opt_secret")]
    pub webhook_secret: Option<SecretString>,
    /// Overrides `https://api.stripe.com/v1`.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct RazorpaySettings {
    #[serde(deserialize_with = "lenient::string")]
    pub key_id: String,
    #[serde(deserialize_with = "lenient::secret")]
    pub key_secret: SecretString,
    #[serde(default, deserialize_with = "lenient::opt_secret")]
    pub webhook_secret: Option<SecretString>,
    /// Overrides `https://api.razorpay.com/v1`.
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpiSettings {
    #[serde(deserialize_with = "lenient::secret")]
    pub api_key: SecretString,
    /// PSP API root; there is no public default.
    pub base_url: String,
    #[serde(default, deserialize_with = "lenient::opt_secret")]
    pub webhook_secret: Option<SecretString>,
    /// Payee VPA sent with collect requests.
    #[serde(default)]
    pub merchant_vpa: Option<String>,
}

fn default_webhook_tolerance() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}

/// Credentials read from the environment may look numeric; accept any
/// scalar where a string is expected.
mod lenient {
    use secrecy::SecretString;
    use serde::de::{Deserializer, Error};
    use serde::Deserialize;
    use serde_json::Value;

    fn scalar<E: Error>(value: Value) -> Result<String, E> {
        match value {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(E::custom(format!("expected a string, found {}", other))),
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        scalar(Value::deserialize(d)?)
    }

    pub fn secret<'de, D: Deserializer<'de>>(d: D) -> Result<SecretString, D::Error> {
        string(d).map(|s| SecretString::new(s.into()))
    }

    pub fn opt_secret<'de, D: Deserializer<'de>>(d: D) -> Result<Option<SecretString>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            value => scalar(value).map(|s| Some(SecretString::new(s.into()))),
        }
    }
}
