// Configuration file loaders

use crate::{ConfigError, Result, coerce_scalar, env::normalize_key, insert_path};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Json,
    Toml,
    Env,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            "env" => Some(FileFormat::Env),
            _ => None,
        }
    }
}

/// Configuration file loader. Every format is parsed into a JSON object.
pub struct ConfigLoader {
    format: FileFormat,
}

impl ConfigLoader {
    pub fn new(format: FileFormat) -> Self {
        Self { format }
    }

    /// Auto-detect format from file extension
    pub fn auto(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ConfigError::LoadError(format!("No file extension: {}", path.display())))?;

        let format = FileFormat::from_extension(ext)
            .ok_or_else(|| ConfigError::LoadError(format!("Unsupported format: {}", ext)))?;

        Ok(Self::new(format))
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::LoadError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        self.parse(&content)
    }

    /// Parse configuration from string
    pub fn parse(&self, content: &str) -> Result<Value> {
        let value = match self.format {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| ConfigError::ParseError(format!("JSON parse error: {}", e)))?,
            FileFormat::Toml => {
                let toml_value: toml::Value = toml::from_str(content)
                    .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;
                serde_json::to_value(toml_value)
                    .map_err(|e| ConfigError::SerializationError(e.to_string()))?
            }
            FileFormat::Env => self.parse_env(content),
        };

        if value.is_object() {
            Ok(value)
        } else {
            Err(ConfigError::ParseError(
                "Configuration root must be an object".to_string(),
            ))
        }
    }

    /// `KEY__NESTED=value` lines, `#` comments, optional quotes.
    fn parse_env(&self, content: &str) -> Value {
        let mut map = serde_json::Map::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);

            if let Some((key, value)) = line.split_once('=') {
                let key = normalize_key(key.trim());
                let raw = value.trim();
                let value = if raw.len() >= 2
                    && ((raw.starts_with('"') && raw.ends_with('"'))
                        || (raw.starts_with('\'') && raw.ends_with('\'')))
                {
                    Value::String(raw[1..raw.len() - 1].to_string())
                } else {
                    coerce_scalar(raw)
                };
                insert_path(&mut map, &key, value);
            }
        }

        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json() {
        let loader = ConfigLoader::new(FileFormat::Json);
        let result = loader
            .parse(r#"{"retry": {"max_attempts": 4}}"#)
            .unwrap();

        assert_eq!(result["retry"]["max_attempts"], 4);
    }

    #[test]
    fn test_parse_toml() {
        let loader = ConfigLoader::new(FileFormat::Toml);
        let toml = r#"
            [security]
            internal_api_key = "s3cret"

            [breakers.overrides.stripe-payments]
            failure_threshold = 2
        "#;

        let result = loader.parse(toml).unwrap();
        assert_eq!(result["security"]["internal_api_key"], "s3cret");
        assert_eq!(
            result["breakers"]["overrides"]["stripe-payments"]["failure_threshold"],
            2
        );
    }

    #[test]
    fn test_parse_env() {
        let loader = ConfigLoader::new(FileFormat::Env);
        let env = r#"
            RETRY__MAX_ATTEMPTS=5
            # Comment
            export GATEWAYS__DEFAULT=razorpay
            SECURITY__INTERNAL_API_KEY="12345"
        "#;

        let result = loader.parse(env).unwrap();
        assert_eq!(result["retry"]["max_attempts"], 5);
        assert_eq!(result["gateways"]["default"], "razorpay");
        assert_eq!(result["security"]["internal_api_key"], "12345");
    }

    #[test]
    fn test_non_object_root_rejected() {
        let loader = ConfigLoader::new(FileFormat::Json);
        assert!(matches!(
            loader.parse("[1, 2]"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(FileFormat::from_extension("JSON"), Some(FileFormat::Json));
        assert_eq!(FileFormat::from_extension("toml"), Some(FileFormat::Toml));
        assert_eq!(FileFormat::from_extension("env"), Some(FileFormat::Env));
        assert_eq!(FileFormat::from_extension("yaml"), None);
        assert!(ConfigLoader::auto("paygate.toml").is_ok());
        assert!(ConfigLoader::auto("paygate").is_err());
    }
}
