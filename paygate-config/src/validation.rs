// Configuration validation

use crate::{ConfigError, Result};
use std::fmt::Display;

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Field-level checks returning `ConfigError::ValidationError`.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Rejects empty and whitespace-only values.
    pub fn not_blank(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be blank",
                field
            )));
        }
        Ok(())
    }

    pub fn in_range<T: PartialOrd + Display>(value: T, min: T, max: T, field: &str) -> Result<()> {
        if value < min || value > max {
            return Err(ConfigError::ValidationError(format!(
                "{} must be between {} and {} (got {})",
                field, min, max, value
            )));
        }
        Ok(())
    }

    pub fn one_of<T: PartialEq + Display>(value: &T, allowed: &[T], field: &str) -> Result<()> {
        if !allowed.contains(value) {
            let allowed: Vec<String> = allowed.iter().map(|a| a.to_string()).collect();
            return Err(ConfigError::ValidationError(format!(
                "{} must be one of [{}] (got {})",
                field,
                allowed.join(", "),
                value
            )));
        }
        Ok(())
    }

    /// Requires an absolute http(s) URL.
    pub fn is_url(value: &str, field: &str) -> Result<()> {
        match url::Url::parse(value) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
            _ => Err(ConfigError::ValidationError(format!(
                "{} must be a valid http(s) URL",
                field
            ))),
        }
    }

    /// Requires a path starting with `/`.
    pub fn is_path(value: &str, field: &str) -> Result<()> {
        if !value.starts_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "{} must start with '/'",
                field
            )));
        }
        Ok(())
    }
}

/// Runs many checks and reports every failure together.
#[derive(Debug, Default)]
pub struct ValidationReport {
    errors: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one check.
    pub fn check(&mut self, result: Result<()>) -> &mut Self {
        if let Err(e) = result {
            self.errors.extend(e.messages());
        }
        self
    }

    /// Record a plain condition.
    pub fn require(&mut self, condition: bool, message: impl Into<String>) -> &mut Self {
        if !condition {
            self.errors.push(message.into());
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_blank_validation() {
        assert!(ConfigValidator::not_blank("value", "field").is_ok());
        assert!(ConfigValidator::not_blank("", "field").is_err());
        assert!(ConfigValidator::not_blank("   ", "field").is_err());
    }

    #[test]
    fn test_range_validation() {
        assert!(ConfigValidator::in_range(5, 1, 10, "field").is_ok());
        assert!(ConfigValidator::in_range(0.5, 0.0, 1.0, "rate").is_ok());

        let err = ConfigValidator::in_range(11, 1, 10, "retry.max_attempts").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: retry.max_attempts must be between 1 and 10 (got 11)"
        );
    }

    #[test]
    fn test_one_of_validation() {
        let allowed = ["stripe", "razorpay", "upi"];
        assert!(ConfigValidator::one_of(&"upi", &allowed, "gateways.default").is_ok());
        assert!(ConfigValidator::one_of(&"paypal", &allowed, "gateways.default").is_err());
    }

    #[test]
    fn test_url_validation() {
        assert!(ConfigValidator::is_url("https://api.stripe.com/v1", "field").is_ok());
        assert!(ConfigValidator::is_url("http://127.0.0.1:8080", "field").is_ok());
        assert!(ConfigValidator::is_url("api.stripe.com", "field").is_err());
        assert!(ConfigValidator::is_url("ftp://files.example.com", "field").is_err());
    }

    #[test]
    fn test_report_collects_everything() {
        let mut report = ValidationReport::new();
        report
            .check(ConfigValidator::not_blank("", "a"))
            .check(ConfigValidator::is_path("/ok", "b"))
            .require(false, "c is required");

        let err = report.finish().unwrap_err();
        assert_eq!(err.messages(), vec!["Validation error: a cannot be blank", "c is required"]);
    }
}
