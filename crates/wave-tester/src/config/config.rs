//! Configuration management for wave-tester.
//!
//! Loads the TOML configuration file from the platform config directory.

use crate::{
    AppError, AppResult,
    config::{ClientConfig, SimulatorConfig},
};

use std::{
    fs,
    panic::Location,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use error_location::ErrorLocation;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use wave_tester_core::{ControllerConfig, RecipeId};

/// Main configuration struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Client identity and recipe list.
    #[serde(default)]
    pub client: ClientConfig,
    /// In-process sensor service behaviour.
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

impl Config {
    /// Load configuration from the platform config directory.
    ///
    /// A missing file yields the built-in defaults; nothing is written.
    #[track_caller]
    #[instrument]
    pub fn load() -> AppResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `config_path`, falling back to defaults when
    /// the file does not exist.
    #[track_caller]
    #[instrument]
    pub fn load_from(config_path: &Path) -> AppResult<Self> {
        if !config_path.exists() {
            info!(config_path = ?config_path, "No config found, using defaults");
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(config_path).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to read config: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let config = Self::parse(&contents)?;

        info!(config_path = ?config_path, "Configuration loaded");

        Ok(config)
    }

    /// Parse configuration from TOML text. Missing keys take their defaults.
    #[track_caller]
    pub fn parse(contents: &str) -> AppResult<Self> {
        toml::from_str(contents).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to parse config: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })
    }

    /// Reject configurations the client cannot run with.
    #[track_caller]
    #[instrument(skip(self))]
    pub fn validate(&self) -> AppResult<()> {
        if self.client.api_key.trim().is_empty() {
            return Err(AppError::ConfigError {
                reason: "client.api_key must not be empty".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if self.client.recipes.is_empty() {
            return Err(AppError::ConfigError {
                reason: "client.recipes must list at least one recipe".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if let Some(blank) = self.client.recipes.iter().position(|r| r.trim().is_empty()) {
            return Err(AppError::ConfigError {
                reason: format!("client.recipes[{}] is empty", blank),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(())
    }

    /// Run parameters handed to the controller.
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig::new(
            self.client.api_key.clone(),
            self.client
                .recipes
                .iter()
                .map(|recipe| RecipeId::from(recipe.as_str()))
                .collect(),
        )
    }

    #[track_caller]
    fn config_path() -> AppResult<PathBuf> {
        let proj_dirs =
            ProjectDirs::from("edu", "wave-tester", "Wave-Tester").ok_or_else(|| {
                AppError::ConfigError {
                    reason: "Failed to get config directory".to_string(),
                    location: ErrorLocation::from(Location::caller()),
                }
            })?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }
}
