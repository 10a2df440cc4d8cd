#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! Every tunable of the raster pass, the patch drivers and logging lives in
//! one [`RuntimeConfig`], loadable from TOML or JSON.
//!
//! ```toml
//! # livetree.toml
//! [raster]
//! scale = 2.0
//! max_pages_per_pass = 4
//!
//! [log]
//! filter = "livetree=debug"
//! ```
//!
//! ```rust,ignore
//! let config = RuntimeConfig::from_toml_file("livetree.toml")?;
//! ```
//!
//! Missing sections and fields fall back to [`Default`].

#[cfg(feature = "config-file")]
use std::path::{Path, PathBuf};

#[cfg(feature = "config-file")]
use serde::{Deserialize, Serialize};

use livetree_render::patch::DEFAULT_MAX_DEPTH;

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "config-file", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config-file", serde(default))]
pub struct RuntimeConfig {
    pub raster: RasterConfig,
    pub patch: PatchConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config-file", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config-file", serde(default))]
pub struct RasterConfig {
    /// When off, page placeholders stay pending until surfaces are attached
    /// by hand.
    pub enabled: bool,
    /// Device pixels per document unit.
    pub scale: f32,
    pub max_pages_per_pass: usize,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scale: 1.0,
            max_pages_per_pass: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config-file", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config-file", serde(default))]
pub struct PatchConfig {
    /// Full renders bypass the equality verdict and walk every kept node.
    pub deep_on_full_render: bool,
    /// Deepest node level a render target may reach; the root is level 0.
    pub max_depth: usize,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            deep_on_full_render: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config-file", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config-file", serde(default))]
pub struct LogConfig {
    /// `EnvFilter` directives. `LIVETREE_LOG` takes precedence when set.
    pub filter: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            json: false,
        }
    }
}

impl RuntimeConfig {
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    #[cfg(feature = "config-file")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&read(path.as_ref())?)
    }

    #[cfg(feature = "config-file")]
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    #[cfg(feature = "config-file")]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&read(path.as_ref())?)
    }

    #[cfg(feature = "config-file")]
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate all parameters are within acceptable ranges.
    ///
    /// An empty list means the config is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !(self.raster.scale.is_finite() && self.raster.scale > 0.0) {
            errors.push(format!(
                "raster.scale must be a positive number, got {}",
                self.raster.scale
            ));
        }
        if self.raster.max_pages_per_pass == 0 {
            errors.push("raster.max_pages_per_pass must be at least 1".to_owned());
        }
        if self.patch.max_depth == 0 {
            errors.push("patch.max_depth must be at least 1".to_owned());
        }
        if self.log.filter.trim().is_empty() {
            errors.push("log.filter must not be empty".to_owned());
        }
        errors
    }

    /// `self` if [`validate`](Self::validate) finds nothing.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

#[cfg(feature = "config-file")]
fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Errors that can occur when loading a runtime configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[cfg(feature = "config-file")]
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[cfg(feature = "config-file")]
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[cfg(feature = "config-file")]
    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),
    #[cfg(feature = "config-file")]
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),
}
