//! Persisted key-value configuration.
//!
//! The store is a small TOML file under the user's configuration directory.
//! Every mutation goes through [`Config::update_at`], which re-reads the file,
//! applies the change and writes the result back, so two edits in one process
//! never clobber each other.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{CertgenError, Result};

pub const DEFAULT_LOG_FILE: &str = "certgen.log";
pub const DEFAULT_YAML_FILE: &str = "csr.yaml";

/// On-disk configuration, `[default]` and `[custom]` sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultSection,
    #[serde(default)]
    pub custom: CustomSection,
}

/// Fixed application defaults, present in every store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultSection {
    #[serde(default = "default_log_file")]
    pub log_file: String,
    /// Name of the YAML subject template looked up in the app folder.
    #[serde(default = "default_yaml_file")]
    pub yaml_file: String,
}

fn default_log_file() -> String {
    DEFAULT_LOG_FILE.to_string()
}

fn default_yaml_file() -> String {
    DEFAULT_YAML_FILE.to_string()
}

impl Default for DefaultSection {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            yaml_file: default_yaml_file(),
        }
    }
}

/// User overrides; an absent key means "use the derived default".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_directory: Option<PathBuf>,
    /// Custom CSV source. A bare name is resolved against the managed csv
    /// folder at use time; a path with separators is used as given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csvfile: Option<String>,
}

impl CustomSection {
    pub fn is_empty(&self) -> bool {
        self.cert_directory.is_none() && self.csvfile.is_none()
    }
}

impl Config {
    /// Location of the store: `<config_dir>/certgen/config.toml`.
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("certgen")
            .join("config.toml")
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path())
    }

    /// A missing store yields defaults (first run); an unreadable or
    /// malformed store is fatal.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("no config store at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|e| CertgenError::NoConfig {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| CertgenError::NoConfig {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })
    }

    pub fn store_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(self).map_err(|e| CertgenError::Encoding(e.to_string()))?;
        fs::write(path, raw)?;
        debug!("config written to {}", path.display());
        Ok(())
    }

    /// Scoped transaction: read the store fresh, apply `apply`, persist.
    pub fn update_at(path: &Path, apply: impl FnOnce(&mut Config)) -> Result<Config> {
        let mut config = Self::load_from(path)?;
        apply(&mut config);
        config.store_to(path)?;
        Ok(config)
    }

    pub fn update(apply: impl FnOnce(&mut Config)) -> Result<Config> {
        Self::update_at(&Self::path(), apply)
    }

    /// Forget custom options. With no flag set the whole `[custom]` section
    /// is cleared; otherwise only the named options. `[default]` is never
    /// touched.
    pub fn clear_custom_at(path: &Path, cert_directory: bool, csvfile: bool) -> Result<Config> {
        Self::update_at(path, |c| {
            if !cert_directory && !csvfile {
                c.custom = CustomSection::default();
            } else {
                if cert_directory {
                    c.custom.cert_directory = None;
                }
                if csvfile {
                    c.custom.csvfile = None;
                }
            }
        })
    }

    /// Human-readable rendering for `config read`.
    pub fn show(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_else(|_| String::from("<unreadable>"))
    }
}
