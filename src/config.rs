//! Global configuration and process-wide paths
//!
//! One `config.yaml` per operator home directory names the remote recipe
//! libraries to mirror:
//!
//! ```yaml
//! libraries:
//!   team-recipes:
//!     repo: https://github.com/acme/team-recipes.git
//!     ref: main
//! ```
//!
//! [`AppPaths`] is constructed once at process start and passed by parameter
//! into every component; there is no hidden global.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Operator-level directory under the home dir (`~/.recipes`).
pub const CONFIG_DIR: &str = ".recipes";
/// Config file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config.yaml";
/// Subdirectory of [`CONFIG_DIR`] holding local mirrors of remote libraries.
pub const LIBRARIES_DIR: &str = "libraries";

/// Environment override for the operator config directory, used by tests and
/// sandboxed environments.
pub const CONFIG_DIR_ENV: &str = "RECIPES_CONFIG_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine the home directory")]
    NoHomeDirectory,

    #[error("invalid config file {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One mirrored remote recipe source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigLibrary {
    pub repo: String,
    #[serde(rename = "ref")]
    pub reference: String,
}

/// The operator's global configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub libraries: BTreeMap<String, ConfigLibrary>,
}

impl GlobalConfig {
    /// Load from a config file; a missing file is an empty configuration.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io { path: path.to_path_buf(), source: e }),
        };
        serde_yaml::from_str(&text).map_err(|e| ConfigError::InvalidConfig {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Filesystem locations resolved once at startup.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Operator config directory (`~/.recipes` unless overridden).
    pub config_dir: PathBuf,
    /// `config.yaml` inside the config directory.
    pub config_file: PathBuf,
    /// Local mirrors of remote libraries, one subdirectory per library name.
    pub libraries_dir: PathBuf,
    /// Workspace root the commands operate on.
    pub workspace_root: PathBuf,
}

impl AppPaths {
    /// Resolve paths for a workspace root, honoring [`CONFIG_DIR_ENV`].
    pub fn discover(workspace_root: PathBuf) -> Result<Self, ConfigError> {
        let config_dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir().ok_or(ConfigError::NoHomeDirectory)?.join(CONFIG_DIR),
        };
        Ok(Self {
            config_file: config_dir.join(CONFIG_FILE),
            libraries_dir: config_dir.join(LIBRARIES_DIR),
            config_dir,
            workspace_root,
        })
    }
}
