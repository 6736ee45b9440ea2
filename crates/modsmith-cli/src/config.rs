use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use modsmith_apply::ValidatorOptions;
use modsmith_compile::DEFAULT_PRIORITY_PACKAGES;
use modsmith_introspect::ProbeOptions;
use modsmith_introspect::atomic::write_bytes_atomic;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config encoding error: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("config write failed: {0}")]
    Write(#[from] modsmith_introspect::CacheError),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileSettings {
    /// Modifier ids known to carry doubly-nested requirement lists.
    pub problem_modifiers: Vec<String>,
    /// Base package ids applied before all other base content.
    pub priority_packages: Vec<String>,
}

impl Default for CompileSettings {
    fn default() -> Self {
        Self {
            problem_modifiers: Vec::new(),
            priority_packages: DEFAULT_PRIORITY_PACKAGES
                .iter()
                .map(|id| id.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSettings {
    pub capacity: usize,
    pub fallback_log: Option<PathBuf>,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            capacity: 256,
            fallback_log: None,
        }
    }
}

/// Contents of `modsmith.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModsmithConfig {
    pub probe: ProbeOptions,
    pub compile: CompileSettings,
    pub apply: ValidatorOptions,
    pub status: StatusSettings,
}

pub fn load_or_create_config(path: &Path) -> ConfigResult<ModsmithConfig> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: ModsmithConfig = toml::from_str(&content)?;
        return Ok(config);
    }

    let config = ModsmithConfig::default();
    save_config(path, &config)?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &ModsmithConfig) -> ConfigResult<()> {
    let encoded = toml::to_string_pretty(config)?;
    write_bytes_atomic(path, encoded.as_bytes()).map_err(ConfigError::from)
}
