//! Job bundle output configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for writing job bundles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Directory new bundle directories are created in
    pub output_dir: PathBuf,

    /// Prefix of bundle directory names: `<prefix>-<job name>-<timestamp>`
    pub bundle_prefix: String,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("job_bundles"),
            bundle_prefix: "OpenJob".to_string(),
        }
    }
}
