//! Submission files describing a job tree.
//!
//! A submission names the job template and, for each entity, its template,
//! overrides and attachments. It may also carry a static render intent, in
//! which case a render job is built.
//!
//! ```yaml
//! job:
//!   template: render_job.yml
//!   parameters:
//!     - name: ProjectFilePath
//!       type: PATH
//!       value: /projects/Demo/Demo.uproject
//!   steps:
//!     - kind: render
//!       parameters:
//!         - name: ChunkSize
//!           type: INT
//!           range: [10]
//!       environments:
//!         - kind: launch_editor
//!           variables: {REMOTE_EXECUTION: "True"}
//! render:
//!   shots:
//!     - name: shot_010
//!   output_path: /renders/demo
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{resolve_template_path, OpenJobConfig};
use crate::errors::{OpenJobError, Result};
use crate::models::AssetReferences;
use crate::open_job::entity::MissingTemplatePolicy;
use crate::open_job::environment::{
    EnvironmentKind, EnvironmentOptions, OpenJobEnvironment, RevisionControlState,
};
use crate::open_job::host_requirements::HostRequirements;
use crate::open_job::job::{JobOptions, JobParameter, OpenJob};
use crate::open_job::parameter_value::ParameterKind;
use crate::open_job::render_intent::StaticRenderIntent;
use crate::open_job::shared_settings::JobSharedSettings;
use crate::open_job::step::{OpenJobStep, StepKind, StepOptions, StepParameter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmissionSpec {
    pub job: JobSpec,
    /// Render intent; makes this a render job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render: Option<StaticRenderIntent>,
    /// Directory of the submission file, used to resolve relative template
    /// paths when no templates directory is configured
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    /// Job template path
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub parameters: Vec<JobParameterSpec>,
    #[serde(default)]
    pub shared_settings: JobSharedSettings,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub environments: Vec<EnvironmentSpec>,
    #[serde(default)]
    pub attachments: AssetReferences,
    #[serde(default)]
    pub missing_template: MissingTemplatePolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterKind,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterKind,
    #[serde(default)]
    pub range: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepSpec {
    /// Step template path; the kind's default template when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default)]
    pub kind: StepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<StepParameterSpec>,
    #[serde(default)]
    pub environments: Vec<EnvironmentSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_requirements: Option<HostRequirements>,
    #[serde(default)]
    pub attachments: AssetReferences,
    #[serde(default)]
    pub missing_template: MissingTemplatePolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentSpec {
    /// Environment template path; the kind's default template when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default)]
    pub kind: EnvironmentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_control: Option<RevisionControlState>,
    #[serde(default)]
    pub attachments: AssetReferences,
    #[serde(default)]
    pub missing_template: MissingTemplatePolicy,
}

/// Template path given explicitly or by an entity kind's default
fn template_path(
    explicit: Option<&str>,
    default: Option<&'static str>,
    what: &str,
    root: Option<&Path>,
) -> Result<PathBuf> {
    let path = explicit.or(default).ok_or_else(|| {
        OpenJobError::MissingDependencyData(format!("{} has neither a template nor a kind with a default template", what))
    })?;
    Ok(resolve_template_path(path, root))
}

impl EnvironmentSpec {
    pub fn into_environment(self, root: Option<&Path>) -> Result<OpenJobEnvironment> {
        let path = template_path(
            self.template.as_deref(),
            self.kind.default_template_path(),
            "environment",
            root,
        )?;
        OpenJobEnvironment::with_kind(
            self.kind,
            path,
            EnvironmentOptions {
                name: self.name,
                variables: self.variables,
                revision_control: self.revision_control,
                asset_references: self.attachments,
                missing_template: self.missing_template,
            },
        )
    }
}

impl StepSpec {
    pub fn into_step(self, root: Option<&Path>) -> Result<OpenJobStep> {
        let path = template_path(
            self.template.as_deref(),
            self.kind.default_template_path(),
            "step",
            root,
        )?;
        let extra_parameters = self
            .parameters
            .into_iter()
            .map(|p| StepParameter::from_raw(p.name, p.kind, &p.range))
            .collect::<Result<Vec<_>>>()?;
        let environments = self
            .environments
            .into_iter()
            .map(|e| e.into_environment(root))
            .collect::<Result<Vec<_>>>()?;

        let options = StepOptions {
            name: self.name,
            step_dependencies: self.depends_on,
            environments,
            extra_parameters,
            host_requirements: self.host_requirements,
            asset_references: self.attachments,
            missing_template: self.missing_template,
        };
        match self.kind {
            StepKind::Custom => OpenJobStep::new(path, options),
            StepKind::Render => OpenJobStep::render(path, options, None),
        }
    }
}

impl SubmissionSpec {
    /// Load from a YAML, JSON or JSON5 file
    pub fn from_spec_file<P: AsRef<Path>>(path: P) -> Result<SubmissionSpec> {
        let path_ref = path.as_ref();
        let file_content = fs::read_to_string(path_ref)?;

        let extension = path_ref
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        let mut spec = match extension.to_lowercase().as_str() {
            "json" | "json5" | "yaml" | "yml" => {
                Self::from_spec_file_content(&file_content, extension)?
            }
            _ => {
                // Try JSON first, then JSON5, then YAML
                let value = if let Ok(value) =
                    serde_json::from_str::<serde_json::Value>(&file_content)
                {
                    value
                } else if let Ok(value) = json5::from_str::<serde_json::Value>(&file_content) {
                    value
                } else {
                    serde_yaml::from_str::<serde_json::Value>(&file_content)?
                };
                serde_json::from_value(value)?
            }
        };

        spec.base_dir = path_ref.parent().map(Path::to_path_buf);
        debug!("Loaded submission spec {}", path_ref.display());
        Ok(spec)
    }

    pub fn from_spec_file_content(content: &str, format: &str) -> Result<SubmissionSpec> {
        let value: serde_json::Value = match format.to_lowercase().as_str() {
            "json" => serde_json::from_str(content)?,
            "json5" => json5::from_str(content)?,
            "yaml" | "yml" => serde_yaml::from_str(content)?,
            other => {
                return Err(OpenJobError::MissingDependencyData(format!(
                    "Unknown submission format: {}",
                    other
                )));
            }
        };
        Ok(serde_json::from_value(value)?)
    }

    /// Root that relative template paths resolve against
    fn templates_root(&self, config: &OpenJobConfig) -> Option<PathBuf> {
        config
            .builder
            .templates_directory
            .clone()
            .or_else(|| self.base_dir.clone())
    }

    /// Instantiate the entity tree
    pub fn into_open_job(self, config: &OpenJobConfig) -> Result<OpenJob> {
        let root = self.templates_root(config);
        let root = root.as_deref();
        let job = self.job;

        let extra_parameters = job
            .parameters
            .into_iter()
            .map(|p| JobParameter::from_raw(p.name, p.kind, p.value.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let steps = job
            .steps
            .into_iter()
            .map(|s| s.into_step(root))
            .collect::<Result<Vec<_>>>()?;
        let environments = job
            .environments
            .into_iter()
            .map(|e| e.into_environment(root))
            .collect::<Result<Vec<_>>>()?;

        let options = JobOptions {
            name: job.name,
            steps,
            environments,
            extra_parameters,
            job_shared_settings: job.shared_settings,
            asset_references: job.attachments,
            missing_template: job.missing_template,
            specification_version: Some(config.builder.specification_version.clone()),
        };
        let job_path = resolve_template_path(job.template, root);

        match self.render {
            Some(intent) => OpenJob::render(job_path, options, Arc::new(intent)),
            None => OpenJob::new(job_path, options),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml() {
        let spec = SubmissionSpec::from_spec_file_content("job:\n  template: job.yml\n", "yaml")
            .unwrap();
        assert_eq!(spec.job.template, "job.yml");
        assert!(spec.job.steps.is_empty());
        assert!(spec.render.is_none());
    }

    #[test]
    fn test_json5_with_render() {
        let content = r#"{
            job: {template: 'job.yml', steps: [{kind: 'render'}]},
            render: {shots: [{name: 'shot_010', enabled: false}]},
        }"#;
        let spec = SubmissionSpec::from_spec_file_content(content, "json5").unwrap();
        assert_eq!(spec.job.steps[0].kind, StepKind::Render);
        assert!(!spec.render.unwrap().shots[0].enabled);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let result =
            SubmissionSpec::from_spec_file_content("job:\n  template: a.yml\n  stepz: []\n", "yaml");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_format() {
        assert!(SubmissionSpec::from_spec_file_content("", "kdl").is_err());
    }

    #[test]
    fn test_custom_step_without_template() {
        let step = StepSpec {
            template: None,
            kind: StepKind::Custom,
            name: None,
            depends_on: Vec::new(),
            parameters: Vec::new(),
            environments: Vec::new(),
            host_requirements: None,
            attachments: AssetReferences::default(),
            missing_template: MissingTemplatePolicy::Fail,
        };
        assert!(matches!(
            step.into_step(None),
            Err(OpenJobError::MissingDependencyData(_))
        ));
    }
}
