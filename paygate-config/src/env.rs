// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;

/// Reads prefixed environment variables into dotted configuration keys.
///
/// With prefix `PAYGATE`, `PAYGATE_RETRY__MAX_ATTEMPTS` becomes
/// `retry.max_attempts`: the prefix and its separator are removed, the rest
/// is lowercased and each `__` marks one level of nesting.
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    /// Load matching variables from the process environment.
    pub fn load(&self) -> Result<HashMap<String, String>> {
        Ok(self.load_from(env::vars()))
    }

    /// Load matching variables from an explicit list.
    pub fn load_from<I>(&self, vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        vars.into_iter()
            .filter_map(|(key, value)| self.strip_prefix(&key).map(|k| (normalize_key(k), value)))
            .filter(|(key, _)| !key.is_empty())
            .collect()
    }

    fn strip_prefix<'a>(&self, key: &'a str) -> Option<&'a str> {
        match &self.prefix {
            Some(prefix) => key.strip_prefix(prefix.as_str())?.strip_prefix('_'),
            None => Some(key),
        }
    }

    /// Load a specific variable, e.g. `load_var("retry__max_attempts")`.
    pub fn load_var(&self, key: &str) -> Result<String> {
        let full_key = match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, key.to_uppercase()),
            None => key.to_uppercase(),
        };

        env::var(&full_key).map_err(ConfigError::EnvError)
    }

    /// Load with default value
    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(Some(crate::ENV_PREFIX.to_string()))
    }
}

/// `SECURITY__INTERNAL_API_KEY` -> `security.internal_api_key`
pub fn normalize_key(raw: &str) -> String {
    raw.split("__")
        .map(|part| part.trim_matches('_').to_lowercase())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_prefix_and_nesting() {
        let loader = EnvLoader::default();
        let loaded = loader.load_from(vars(&[
            ("PAYGATE_RETRY__MAX_ATTEMPTS", "4"),
            ("PAYGATE_SECURITY__INTERNAL_API_KEY", "k"),
            ("PAYGATE_LOG_LEVEL", "debug"),
            ("PAYGATEWAY_OTHER", "ignored"),
            ("HOME", "/root"),
        ]));

        assert_eq!(loaded.get("retry.max_attempts"), Some(&"4".to_string()));
        assert_eq!(
            loaded.get("security.internal_api_key"),
            Some(&"k".to_string())
        );
        assert_eq!(loaded.get("log_level"), Some(&"debug".to_string()));
        assert_eq!(loaded.len(), 3);
    }

    #[test]
    fn test_without_prefix() {
        let loader = EnvLoader::new(None);
        let loaded = loader.load_from(vars(&[("GATEWAYS__DEFAULT", "stripe")]));

        assert_eq!(loaded.get("gateways.default"), Some(&"stripe".to_string()));
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("BREAKERS__OVERRIDES__STRIPE-PAYMENTS__MINIMUM_CALLS"),
            "breakers.overrides.stripe-payments.minimum_calls");
        assert_eq!(normalize_key("__"), "");
    }

    #[test]
    fn test_env_loader_with_default() {
        let loader = EnvLoader::new(None);
        let value = loader.load_var_or("NONEXISTENT_VAR_12345", "default");

        assert_eq!(value, "default");
    }

    #[test]
    fn test_env_loader_missing_var() {
        let loader = EnvLoader::default();
        assert!(loader.load_var("MISSING_VAR_67890").is_err());
    }
}
