// ConfigService - High-level configuration service

use crate::{ConfigManager, FileFormat, Result, Validate};
use serde::de::DeserializeOwned;
use std::path::PathBuf;

/// High-level configuration service
#[derive(Clone, Default)]
pub struct ConfigService {
    manager: ConfigManager,
}

impl ConfigService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_manager(manager: ConfigManager) -> Self {
        Self { manager }
    }

    pub fn builder() -> ConfigServiceBuilder {
        ConfigServiceBuilder::new()
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.manager.get(key)
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.manager.get_or(key, default)
    }

    pub fn has(&self, key: &str) -> bool {
        self.manager.has(key)
    }

    /// Deserialize the whole tree into `T` and validate it.
    pub fn bind<T: DeserializeOwned + Validate>(&self) -> Result<T> {
        self.manager.load_validated()
    }

    pub fn manager(&self) -> &ConfigManager {
        &self.manager
    }
}

/// Builder for ConfigService.
///
/// Sources are applied in this order, later ones winning: files, `.env`,
/// process environment.
pub struct ConfigServiceBuilder {
    manager: ConfigManager,
    load_env: bool,
    load_dotenv: bool,
    dotenv_path: Option<PathBuf>,
    config_files: Vec<(PathBuf, Option<FileFormat>)>,
}

impl ConfigServiceBuilder {
    pub fn new() -> Self {
        Self {
            manager: ConfigManager::new(),
            load_env: false,
            load_dotenv: false,
            dotenv_path: None,
            config_files: Vec::new(),
        }
    }

    /// Set environment variable prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.manager = ConfigManager::with_prefix(prefix);
        self
    }

    /// Enable loading from environment variables
    pub fn load_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Enable loading from a .env file (the default location when `None`)
    pub fn load_dotenv(mut self, path: Option<PathBuf>) -> Self {
        self.load_dotenv = true;
        self.dotenv_path = path;
        self
    }

    /// Add a file, detecting the format from its extension.
    pub fn add_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_files.push((path.into(), None));
        self
    }

    pub fn add_file_with_format(mut self, path: impl Into<PathBuf>, format: FileFormat) -> Self {
        self.config_files.push((path.into(), Some(format)));
        self
    }

    /// Set a value before any source is loaded.
    pub fn set<T: serde::Serialize>(self, key: &str, value: T) -> Result<Self> {
        self.manager.set(key, value)?;
        Ok(self)
    }

    pub fn build(self) -> Result<ConfigService> {
        for (path, format) in &self.config_files {
            match format {
                Some(format) => self.manager.load_file(path, *format)?,
                None => self.manager.load_file_auto(path)?,
            }
        }

        if self.load_dotenv {
            self.manager.load_dotenv(self.dotenv_path.as_deref())?;
        }

        if self.load_env {
            self.manager.load_env()?;
        }

        Ok(ConfigService::from_manager(self.manager))
    }
}

impl Default for ConfigServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
