//! Engine configuration.
//!
//! [`EngineConfig`] collects the process-wide defaults the source of
//! this design kept as mutable globals: default schema, default
//! transaction isolation, and the update-all-columns toggle. It is
//! constructed once, stays immutable, and is passed explicitly into the
//! traversal engine and command builder.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::backend::IsolationLevel;

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Schema applied to mappings that declare none.
    #[serde(default)]
    pub default_schema: Option<String>,
    /// Isolation level for transactions the engine opens itself.
    #[serde(default)]
    pub isolation: IsolationLevel,
    /// Write every mapped column on UPDATE instead of only the modified
    /// members.
    #[serde(default)]
    pub update_all_columns: bool,
}

impl EngineConfig {
    /// Load the engine configuration from `config/config.toml`, falling
    /// back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("config/config.toml").required(false))
            .add_source(Environment::with_prefix("TIDEROW").separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // A file that exists but fails to parse should not take
                // the process down; retry with env vars only.
                if std::path::Path::new("config/config.toml").exists() {
                    log::warn!("failed to load config file, falling back to env: {err}");
                }
                Config::builder()
                    .add_source(Environment::with_prefix("TIDEROW").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        // Missing section means defaults across the board.
        match settings.get::<EngineConfig>("engine") {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound(_)) => Ok(EngineConfig::default()),
            Err(err) => Err(ConfigError::Message(format!(
                "Engine configuration could not be loaded from file or environment: {err}"
            ))),
        }
    }
}
