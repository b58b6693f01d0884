//! Configuration management for the job bundle builder
//!
//! Configuration is layered, later sources overriding earlier ones:
//!
//! 1. Built-in defaults
//! 2. System config: `/etc/openjob/config.toml`
//! 3. User config: `~/.config/openjob/config.toml`
//! 4. Project-local config: `./openjob.toml`
//! 5. Environment variables (`OPENJD_TEMPLATES_DIRECTORY`)
//!
//! Files are merged table by table, so a later file only needs the keys it
//! changes.

pub mod builder;
pub mod bundle;

pub use builder::{BuilderConfig, SUPPORTED_SPECIFICATION_VERSIONS};
pub use bundle::BundleConfig;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::open_job::entity::normalize_template_path;

/// Environment variable holding the templates directory
pub const TEMPLATES_DIRECTORY_ENV: &str = "OPENJD_TEMPLATES_DIRECTORY";

const LOG_LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

/// Locations configuration files are read from, lowest priority first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub system: PathBuf,
    pub user: Option<PathBuf>,
    pub local: PathBuf,
}

impl ConfigPaths {
    pub fn new() -> Self {
        Self {
            system: PathBuf::from("/etc/openjob/config.toml"),
            user: dirs::config_dir().map(|d| d.join("openjob").join("config.toml")),
            local: PathBuf::from("openjob.toml"),
        }
    }

    /// Directory of the user configuration file
    pub fn user_config_dir(&self) -> Option<&Path> {
        self.user.as_deref().and_then(Path::parent)
    }

    /// Paths that exist, in priority order
    pub fn existing_paths(&self) -> Vec<PathBuf> {
        std::iter::once(Some(self.system.clone()))
            .chain(std::iter::once(self.user.clone()))
            .chain(std::iter::once(Some(self.local.clone())))
            .flatten()
            .filter(|p| p.is_file())
            .collect()
    }
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::new()
    }
}

/// Complete builder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenJobConfig {
    /// Log level (off, error, warn, info, debug, trace)
    pub log_level: String,

    pub builder: BuilderConfig,

    pub bundle: BundleConfig,
}

impl Default for OpenJobConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            builder: BuilderConfig::default(),
            bundle: BundleConfig::default(),
        }
    }
}

impl OpenJobConfig {
    /// Load from the default locations and the environment
    pub fn load() -> Result<Self> {
        Self::load_with_paths(&ConfigPaths::new())
    }

    pub fn load_with_paths(paths: &ConfigPaths) -> Result<Self> {
        let mut config = Self::load_from_files(&paths.existing_paths())?;
        config.apply_env();
        Ok(config)
    }

    /// Merge the given files in order. Missing files are skipped.
    pub fn load_from_files(files: &[PathBuf]) -> Result<Self> {
        let mut merged = toml::Table::new();
        for file in files {
            if !file.is_file() {
                debug!("Config file {} not found, skipped", file.display());
                continue;
            }
            debug!("Loading config file {}", file.display());
            let table: toml::Table = toml::from_str(&fs::read_to_string(file)?)?;
            merge_tables(&mut merged, table);
        }
        Ok(toml::Value::Table(merged).try_into()?)
    }

    /// Apply environment variable overrides
    pub fn apply_env(&mut self) {
        if let Ok(dir) = env::var(TEMPLATES_DIRECTORY_ENV)
            && !dir.is_empty()
        {
            debug!("Templates directory from {}: {}", TEMPLATES_DIRECTORY_ENV, dir);
            self.builder.templates_directory = Some(PathBuf::from(dir));
        }
    }

    /// Report every invalid setting
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            errors.push(format!(
                "log_level must be one of {}, got \"{}\"",
                LOG_LEVELS.join(", "),
                self.log_level
            ));
        }
        if !SUPPORTED_SPECIFICATION_VERSIONS.contains(&self.builder.specification_version.as_str())
        {
            errors.push(format!(
                "builder.specification_version \"{}\" is not supported",
                self.builder.specification_version
            ));
        }
        if self.bundle.output_dir.as_os_str().is_empty() {
            errors.push("bundle.output_dir must not be empty".to_string());
        }
        if self.bundle.bundle_prefix.trim().is_empty() {
            errors.push("bundle.bundle_prefix must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Commented default configuration file
    pub fn generate_default_config() -> String {
        let defaults = Self::default();
        format!(
            r#"# Job bundle builder configuration
# Locations, later overriding earlier:
#   /etc/openjob/config.toml
#   ~/.config/openjob/config.toml
#   ./openjob.toml

# Log level (off, error, warn, info, debug, trace)
log_level = "{log_level}"

[builder]
# Root directory relative template paths are resolved against.
# The {env} environment variable overrides it.
# templates_directory = "/path/to/templates"

# Specification version of built job templates
specification_version = "{version}"

[bundle]
# Directory job bundles are written to
output_dir = "{output_dir}"

# Prefix of bundle directory names
bundle_prefix = "{prefix}"
"#,
            log_level = defaults.log_level,
            env = TEMPLATES_DIRECTORY_ENV,
            version = defaults.builder.specification_version,
            output_dir = defaults.bundle.output_dir.display(),
            prefix = defaults.bundle.bundle_prefix,
        )
    }
}

/// Deep-merge `overlay` into `base`; overlay values win
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(table)) => {
                merge_tables(existing, table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// `path` if absolute, else `root/path` when a root is given.
/// Backslashes are normalized to `/` first.
pub fn resolve_template_path(path: impl Into<PathBuf>, root: Option<&Path>) -> PathBuf {
    let path = normalize_template_path(&path.into());
    match root {
        Some(root) if !path.is_absolute() => root.join(path),
        _ => path,
    }
}
