//! Template builder configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::JOB_TEMPLATE_VERSION;

/// Specification versions the builder can emit
pub const SUPPORTED_SPECIFICATION_VERSIONS: &[&str] = &[JOB_TEMPLATE_VERSION];

/// Configuration for building job templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Root directory relative template paths are resolved against.
    /// Overridden by the OPENJD_TEMPLATES_DIRECTORY environment variable.
    pub templates_directory: Option<PathBuf>,

    /// Specification version written into built job templates
    pub specification_version: String,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            templates_directory: None,
            specification_version: JOB_TEMPLATE_VERSION.to_string(),
        }
    }
}

impl BuilderConfig {
    /// Resolve a template path against the configured templates directory
    pub fn resolve_template_path(&self, path: impl Into<PathBuf>) -> PathBuf {
        super::resolve_template_path(path, self.templates_directory.as_deref())
    }
}
