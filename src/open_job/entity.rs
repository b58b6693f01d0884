//! The file-backed template shared by jobs, steps and environments.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::errors::{OpenJobError, Result};
use crate::models::AssetReferences;
use crate::open_job::consistency::ConsistencyCheckResult;

/// Which kind of template an entity is backed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateClass {
    Job,
    Step,
    Environment,
}

impl TemplateClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateClass::Job => "JobTemplate",
            TemplateClass::Step => "StepTemplate",
            TemplateClass::Environment => "EnvironmentTemplate",
        }
    }

    /// Name given to an entity whose template declares none
    pub fn placeholder_name(&self) -> String {
        format!("Untitled-{}", self.as_str())
    }
}

impl fmt::Display for TemplateClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when the template file does not exist at construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingTemplatePolicy {
    /// Raise [`OpenJobError::TemplateNotFound`]
    #[default]
    Fail,
    /// Continue with the placeholder name. Building still fails until the
    /// file appears.
    Skip,
}

/// Template location plus the resolved entity name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenJobEntity {
    template_class: TemplateClass,
    file_path: PathBuf,
    name: String,
}

impl OpenJobEntity {
    /// Bind an entity to its template.
    ///
    /// The name is the explicit `name` if given, otherwise the template's own
    /// `name`, otherwise `Untitled-<TemplateClass>`.
    pub fn new(
        template_class: TemplateClass,
        file_path: impl AsRef<Path>,
        name: Option<String>,
        missing_template: MissingTemplatePolicy,
    ) -> Result<Self> {
        Self::with_fallback_name(template_class, file_path, name, None, missing_template)
    }

    /// Like [`OpenJobEntity::new`], trying `fallback_name` before the
    /// placeholder.
    pub fn with_fallback_name(
        template_class: TemplateClass,
        file_path: impl AsRef<Path>,
        name: Option<String>,
        fallback_name: Option<String>,
        missing_template: MissingTemplatePolicy,
    ) -> Result<Self> {
        let file_path = normalize_template_path(file_path.as_ref());

        let template_name = if file_path.is_file() {
            let template = load_template(&file_path)?;
            template
                .get("name")
                .and_then(|n| n.as_str())
                .map(str::to_string)
        } else {
            match missing_template {
                MissingTemplatePolicy::Fail => {
                    return Err(OpenJobError::TemplateNotFound(file_path));
                }
                MissingTemplatePolicy::Skip => {
                    warn!(
                        "{} file {} does not exist yet",
                        template_class,
                        file_path.display()
                    );
                    None
                }
            }
        };

        let name = name
            .or(template_name)
            .or(fallback_name)
            .unwrap_or_else(|| template_class.placeholder_name());
        debug!(
            "Created {} entity \"{}\" from {}",
            template_class,
            name,
            file_path.display()
        );

        Ok(OpenJobEntity {
            template_class,
            file_path,
            name,
        })
    }

    pub fn template_class(&self) -> TemplateClass {
        self.template_class
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Prefix for messages about this entity
    pub fn message_prefix(&self) -> String {
        match self.template_class {
            TemplateClass::Job => "OpenJob: ".to_string(),
            TemplateClass::Step => format!("OpenJob Step \"{}\": ", self.name),
            TemplateClass::Environment => format!("OpenJob Environment \"{}\": ", self.name),
        }
    }

    /// Load the template as a generic document
    pub fn get_template_object(&self) -> Result<serde_json::Value> {
        load_template(&self.file_path)
    }
}

/// Contract shared by every buildable entity: check first, then assemble.
pub trait OpenJobEntityBuild {
    type Template;

    fn entity(&self) -> &OpenJobEntity;

    fn name(&self) -> &str {
        self.entity().name()
    }

    /// Compare template-declared parameters with the caller's overrides
    fn check_parameters_consistency(&self) -> Result<ConsistencyCheckResult>;

    /// Assemble the resolved model without checking
    fn build_template_object(&self) -> Result<Self::Template>;

    /// Every file and directory this entity needs attached
    fn get_asset_references(&self) -> Result<AssetReferences>;

    fn validate_parameters(&self) -> Result<()> {
        let result = self.check_parameters_consistency()?;
        if !result.passed {
            return Err(OpenJobError::ParametersInconsistent(result.reason));
        }
        Ok(())
    }

    fn build_template(&self) -> Result<Self::Template> {
        self.validate_parameters()?;
        self.build_template_object()
    }
}

/// Replace Windows separators so templates authored on either platform resolve
pub fn normalize_template_path(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().replace('\\', "/"))
}

/// Read a YAML, JSON or JSON5 template into a generic document.
///
/// The format is chosen by extension; anything else is tried as JSON, then
/// YAML. The top level must be a mapping.
pub fn load_template(path: &Path) -> Result<serde_json::Value> {
    if !path.is_file() {
        return Err(OpenJobError::TemplateNotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    let value: serde_json::Value = match extension.as_str() {
        "json" => serde_json::from_str(&content)?,
        "json5" => json5::from_str(&content)?,
        "yaml" | "yml" => serde_yaml::from_str(&content)?,
        _ => match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(value) => value,
            Err(_) => serde_yaml::from_str(&content)?,
        },
    };

    if !value.is_object() {
        return Err(OpenJobError::invalid_template(
            path,
            "top level is not a mapping",
        ));
    }
    Ok(value)
}

/// The array at `pointer` (e.g. `/parameterSpace/taskParameterDefinitions`),
/// empty when absent
pub(crate) fn template_array<'a>(
    template: &'a serde_json::Value,
    pointer: &str,
) -> &'a [serde_json::Value] {
    template
        .pointer(pointer)
        .and_then(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub(crate) fn template_str(template: &serde_json::Value, pointer: &str) -> Option<String> {
    template
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// The mandatory `name` of a template list entry
pub(crate) fn entry_name(path: &Path, entry: &serde_json::Value) -> Result<String> {
    entry
        .get("name")
        .and_then(|n| n.as_str())
        .map(str::to_string)
        .ok_or_else(|| OpenJobError::invalid_template(path, format!("entry without name: {}", entry)))
}
