// Configuration management for the paygate payment layer

pub mod config_service;
pub mod env;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use config_service::{ConfigService, ConfigServiceBuilder};
pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use settings::*;
pub use validation::{ConfigValidator, Validate, ValidationReport};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

/// Prefix of every paygate environment variable.
pub const ENV_PREFIX: &str = "PAYGATE";

/// Thread-safe configuration tree addressed by dotted keys
/// (`retry.max_attempts`).
#[derive(Clone)]
pub struct ConfigManager {
    root: Arc<RwLock<Map<String, Value>>>,
    env_prefix: Option<String>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            root: Arc::new(RwLock::new(Map::new())),
            env_prefix: None,
        }
    }

    /// Create with environment variable prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            root: Arc::new(RwLock::new(Map::new())),
            env_prefix: Some(prefix.into()),
        }
    }

    /// Merge prefixed environment variables into the tree.
    pub fn load_env(&self) -> Result<()> {
        let loader = EnvLoader::new(self.env_prefix.clone());
        let vars = loader.load()?;
        paygate_log::debug!(target: "paygate::config", "Loaded {} environment variables", vars.len());
        self.merge_flat(vars);
        Ok(())
    }

    /// Merge already collected `key -> raw value` pairs (keys dotted).
    pub fn merge_flat<I: IntoIterator<Item = (String, String)>>(&self, vars: I) {
        let mut root = self.root.write();
        for (key, raw) in vars {
            insert_path(&mut root, &key, coerce_scalar(&raw));
        }
    }

    /// Load a `.env` file into the process environment, then [`load_env`].
    ///
    /// A missing default `.env` is not an error; a missing explicit path is.
    ///
    /// [`load_env`]: Self::load_env
    pub fn load_dotenv(&self, path: Option<&Path>) -> Result<()> {
        match path {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
            }
            None => {
                dotenvy::dotenv().ok();
            }
        }
        self.load_env()
    }

    pub fn load_file(&self, path: impl AsRef<Path>, format: FileFormat) -> Result<()> {
        let data = ConfigLoader::new(format).load_file(path.as_ref())?;
        paygate_log::debug!(target: "paygate::config", "Loaded {}", path.as_ref().display());
        self.merge_value(data);
        Ok(())
    }

    pub fn load_file_auto(&self, path: impl AsRef<Path>) -> Result<()> {
        let format = ConfigLoader::auto(path.as_ref())?;
        let data = format.load_file(path.as_ref())?;
        self.merge_value(data);
        Ok(())
    }

    /// Deep-merge a JSON object into the tree; later values win.
    pub fn merge_value(&self, value: Value) {
        if let Value::Object(map) = value {
            let mut root = self.root.write();
            deep_merge(&mut root, map);
        }
    }

    /// Set a configuration value
    pub fn set<T: serde::Serialize>(&self, key: &str, value: T) -> Result<()> {
        let json_value = serde_json::to_value(value)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;

        insert_path(&mut self.root.write(), key, json_value);
        Ok(())
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        let root = self.root.read();
        let mut parts = key.split('.');
        let mut current = root.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current.clone())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .lookup(key)
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        serde_json::from_value(value)
            .map_err(|e| ConfigError::DeserializationError(format!("{}: {}", key, e)))
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn has(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Top-level keys.
    pub fn keys(&self) -> Vec<String> {
        self.root.read().keys().cloned().collect()
    }

    /// Merge configuration from another manager
    pub fn merge(&self, other: &ConfigManager) {
        let snapshot = other.root.read().clone();
        deep_merge(&mut self.root.write(), snapshot);
    }

    /// Load and validate configuration
    pub fn load_validated<T: DeserializeOwned + Validate>(&self) -> Result<T> {
        let snapshot = Value::Object(self.root.read().clone());

        let validated: T = serde_json::from_value(snapshot)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;

        validated.validate()?;

        Ok(validated)
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Interpret a raw string from the environment: booleans and numbers become
/// JSON scalars, everything else stays a string.
pub fn coerce_scalar(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>()
        && f.is_finite()
        && raw.contains('.')
    {
        return Value::from(f);
    }
    Value::String(raw.to_string())
}

/// Set `a.b.c` inside `map`, creating (or replacing non-object) parents.
pub fn insert_path(map: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(child) = child {
                insert_path(child, rest, value);
            }
        }
    }
}

fn deep_merge(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        if let Value::Object(incoming) = value {
            if let Some(Value::Object(existing)) = target.get_mut(&key) {
                deep_merge(existing, incoming);
                continue;
            }
            target.insert(key, Value::Object(incoming));
        } else {
            target.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get_nested() {
        let manager = ConfigManager::new();
        manager.set("retry.max_attempts", 4).unwrap();

        assert_eq!(manager.get::<u32>("retry.max_attempts").unwrap(), 4);
        assert!(manager.has("retry"));
        assert!(!manager.has("retry.initial_delay_ms"));
        assert_eq!(manager.keys(), vec!["retry".to_string()]);
    }

    #[test]
    fn test_get_or_default() {
        let manager = ConfigManager::new();

        let value: String = manager.get_or("missing_key", "default_value".to_string());
        assert_eq!(value, "default_value");
        assert!(matches!(
            manager.get::<String>("missing_key"),
            Err(ConfigError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_merge_flat_coerces_values() {
        let manager = ConfigManager::new();
        manager.merge_flat(vec![
            ("retry.max_attempts".to_string(), "5".to_string()),
            ("breakers.default.failure_rate_threshold".to_string(), "0.25".to_string()),
            ("security.internal_api_key".to_string(), "abc".to_string()),
            ("feature.enabled".to_string(), "true".to_string()),
        ]);

        assert_eq!(manager.get::<u32>("retry.max_attempts").unwrap(), 5);
        assert_eq!(
            manager.get::<f64>("breakers.default.failure_rate_threshold").unwrap(),
            0.25
        );
        assert_eq!(manager.get::<String>("security.internal_api_key").unwrap(), "abc");
        assert!(manager.get::<bool>("feature.enabled").unwrap());
    }

    #[test]
    fn test_deep_merge_keeps_siblings() {
        let base = ConfigManager::new();
        base.merge_value(serde_json::json!({"retry": {"max_attempts": 3, "initial_delay_ms": 100}}));

        let overlay = ConfigManager::new();
        overlay.set("retry.max_attempts", 6).unwrap();
        base.merge(&overlay);

        assert_eq!(base.get::<u32>("retry.max_attempts").unwrap(), 6);
        assert_eq!(base.get::<u64>("retry.initial_delay_ms").unwrap(), 100);
    }

    #[test]
    fn test_coerce_scalar() {
        assert_eq!(coerce_scalar("42"), Value::from(42));
        assert_eq!(coerce_scalar("0.5"), Value::from(0.5));
        assert_eq!(coerce_scalar("false"), Value::Bool(false));
        assert_eq!(coerce_scalar("inf"), Value::String("inf".to_string()));
        assert_eq!(coerce_scalar("sk_test_1"), Value::String("sk_test_1".to_string()));
    }

    #[test]
    fn test_insert_path_replaces_scalar_parent() {
        let mut map = Map::new();
        insert_path(&mut map, "gateways", Value::from("flat"));
        insert_path(&mut map, "gateways.default", Value::from("stripe"));

        assert_eq!(map["gateways"]["default"], "stripe");
    }
}
