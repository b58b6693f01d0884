//! The render intent a render job and its render step are built from.
//!
//! The builder never inspects the host application's queue or scene; it only
//! needs the facts exposed by [`RenderIntent`]. [`StaticRenderIntent`] is a
//! plain-data implementation loaded from submission files.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use chrono::Local;
use log::info;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::models::AssetReferences;

pub const MANIFEST_FILE_PREFIX: &str = "RenderJobManifest";
pub const MANIFEST_FILE_EXTENSION: &str = "utxt";

/// A shot of the render intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShotInfo {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ShotInfo {
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        ShotInfo {
            name: name.into(),
            enabled,
        }
    }
}

/// Render data a render step reads. Shared between the job and its render
/// steps, so implementations must be usable from any thread.
pub trait RenderIntent: fmt::Debug + Send + Sync {
    /// Job name used when neither the caller nor the job template names the job
    fn job_name(&self) -> Option<String> {
        None
    }

    fn shots(&self) -> Vec<ShotInfo>;

    /// Render output directory
    fn output_path(&self) -> Option<String>;

    /// Write the serialized queue manifest and return its absolute path
    fn save_manifest_file(&self) -> Result<PathBuf>;

    fn project_file_path(&self) -> Option<String> {
        None
    }

    fn extra_cmd_args(&self) -> Vec<String> {
        Vec::new()
    }

    /// Files the render depends on, attached only when files travel with the job
    fn dependency_files(&self) -> Vec<String> {
        Vec::new()
    }

    /// Files and directories always attached to the job
    fn attachments(&self) -> AssetReferences {
        AssetReferences::default()
    }
}

/// Names of the enabled shots, in order
pub fn enabled_shot_names(intent: &dyn RenderIntent) -> Vec<String> {
    intent
        .shots()
        .into_iter()
        .filter(|s| s.enabled)
        .map(|s| s.name)
        .collect()
}

/// Render intent described entirely by data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticRenderIntent {
    pub job_name: Option<String>,
    pub shots: Vec<ShotInfo>,
    pub output_path: Option<String>,
    /// Manifest contents written by [`RenderIntent::save_manifest_file`]
    pub manifest: String,
    /// Directory for manifest files; the system temporary directory if unset
    pub manifest_dir: Option<PathBuf>,
    pub project_file_path: Option<String>,
    pub extra_cmd_args: Vec<String>,
    pub dependency_files: Vec<String>,
    pub attachments: AssetReferences,
}

impl RenderIntent for StaticRenderIntent {
    fn job_name(&self) -> Option<String> {
        self.job_name.clone()
    }

    fn shots(&self) -> Vec<ShotInfo> {
        self.shots.clone()
    }

    fn output_path(&self) -> Option<String> {
        self.output_path.clone()
    }

    fn save_manifest_file(&self) -> Result<PathBuf> {
        let dir = self
            .manifest_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        fs::create_dir_all(&dir)?;

        let file_name = format!(
            "{}_{}.{}",
            MANIFEST_FILE_PREFIX,
            Local::now().format("%Y%m%d_%H%M%S_%f"),
            MANIFEST_FILE_EXTENSION
        );
        let path = dir.join(file_name);
        fs::write(&path, &self.manifest)?;
        let path = fs::canonicalize(&path)?;
        info!("Saved render manifest to {}", path.display());
        Ok(path)
    }

    fn project_file_path(&self) -> Option<String> {
        self.project_file_path.clone()
    }

    fn extra_cmd_args(&self) -> Vec<String> {
        self.extra_cmd_args.clone()
    }

    fn dependency_files(&self) -> Vec<String> {
        self.dependency_files.clone()
    }

    fn attachments(&self) -> AssetReferences {
        self.attachments.clone()
    }
}
