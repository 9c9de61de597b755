//! Hasher configuration
//!
//! Stored as JSON. Every field is optional in the file; missing fields take
//! their defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::error::Result;
use crate::facade::HasherFactory;
use crate::runtime::NativeRuntime;

/// Default zero-bit threshold for CLI reductions
pub const DEFAULT_ZEROS: u32 = 16;

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Hasher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Artifact JSON to load instead of the bundled Keccak-256 module
    pub artifact: Option<PathBuf>,
    /// Zero-bit threshold used when none is given on the command line
    pub zeros: u32,
    /// Worker count for parallel reductions (default: number of CPU cores)
    pub threads: Option<usize>,
    /// Log level: error, warn, info, debug or trace
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            artifact: None,
            zeros: DEFAULT_ZEROS,
            threads: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Read a config file
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Read a config file if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the config as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Default config location: `<config dir>/keccak/config.json`
    #[cfg(feature = "cli")]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("keccak")
            .join("config.json")
    }

    /// The configured artifact, or the bundled one
    pub fn artifact(&self) -> Result<Artifact> {
        match &self.artifact {
            Some(path) => Artifact::load(path),
            None => Artifact::keccak256(),
        }
    }

    /// A factory for the configured artifact on the native runtime
    pub fn factory(&self) -> Result<HasherFactory> {
        Ok(HasherFactory::new(self.artifact()?, Arc::new(NativeRuntime)))
    }
}
