//! Environments wrapped around a job or a step.
//!
//! An environment's overrides are its `variables` mapping. Some environment
//! kinds also decide how the job's files reach the worker; see
//! [`FilesTransferStrategy`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::{OpenJobError, Result};
use crate::models::{AssetReferences, Environment, EnvironmentScript};
use crate::open_job::consistency::{
    check_consistency, fix_variables_consistency, symmetric_difference, variable_keys,
    ConsistencyCheckResult,
};
use crate::open_job::entity::{
    MissingTemplatePolicy, OpenJobEntity, OpenJobEntityBuild, TemplateClass, template_str,
};
use crate::open_job::parameter_value::ParameterName;

/// How job files reach the worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilesTransferStrategy {
    /// Files are uploaded as job attachments
    #[default]
    S3,
    /// Files are synced from Unreal Game Sync
    Ugs,
    /// Files are synced from Perforce
    Perforce,
}

impl FilesTransferStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilesTransferStrategy::S3 => "S3",
            FilesTransferStrategy::Ugs => "UGS",
            FilesTransferStrategy::Perforce => "PERFORCE",
        }
    }

    /// Whether files come from a revision-control system instead of uploads
    pub fn is_revision_control(&self) -> bool {
        !matches!(self, FilesTransferStrategy::S3)
    }
}

impl fmt::Display for FilesTransferStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentKind {
    #[default]
    Custom,
    LaunchEditor,
    UgsLaunchEditor,
    UgsSyncCmf,
    UgsSyncSmf,
    PerforceSync,
}

impl EnvironmentKind {
    /// Template path relative to the templates directory
    pub fn default_template_path(&self) -> Option<&'static str> {
        match self {
            EnvironmentKind::Custom => None,
            EnvironmentKind::LaunchEditor => Some("environments/launch_ue_environment.yml"),
            EnvironmentKind::UgsLaunchEditor => Some("environments/ugs_launch_ue_environment.yml"),
            EnvironmentKind::UgsSyncCmf => Some("environments/ugs_sync_cmf_environment.yml"),
            EnvironmentKind::UgsSyncSmf => Some("environments/ugs_sync_smf_environment.yml"),
            EnvironmentKind::PerforceSync => Some("environments/p4_sync_environment.yml"),
        }
    }

    pub fn files_transfer_strategy(&self) -> Option<FilesTransferStrategy> {
        match self {
            EnvironmentKind::UgsLaunchEditor
            | EnvironmentKind::UgsSyncCmf
            | EnvironmentKind::UgsSyncSmf => Some(FilesTransferStrategy::Ugs),
            EnvironmentKind::PerforceSync => Some(FilesTransferStrategy::Perforce),
            EnvironmentKind::Custom | EnvironmentKind::LaunchEditor => None,
        }
    }
}

/// Revision-control snapshot a sync environment works against
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RevisionControlState {
    pub stream_path: Option<String>,
    pub changelist_number: Option<i64>,
}

impl RevisionControlState {
    /// Job parameter values this state provides
    pub fn parameter_values(&self) -> Vec<(ParameterName, serde_json::Value)> {
        let mut values = Vec::new();
        if let Some(stream) = &self.stream_path {
            values.push((
                ParameterName::PerforceStreamPath,
                serde_json::Value::String(stream.clone()),
            ));
        }
        if let Some(changelist) = self.changelist_number {
            values.push((
                ParameterName::PerforceChangelistNumber,
                serde_json::Value::from(changelist),
            ));
        }
        values
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnvironmentOptions {
    pub name: Option<String>,
    pub variables: BTreeMap<String, String>,
    pub revision_control: Option<RevisionControlState>,
    pub asset_references: AssetReferences,
    pub missing_template: MissingTemplatePolicy,
}

#[derive(Debug, Clone)]
pub struct OpenJobEnvironment {
    entity: OpenJobEntity,
    kind: EnvironmentKind,
    variables: BTreeMap<String, String>,
    revision_control: Option<RevisionControlState>,
    asset_references: AssetReferences,
}

impl OpenJobEnvironment {
    pub fn new(file_path: impl AsRef<Path>, options: EnvironmentOptions) -> Result<Self> {
        Self::with_kind(EnvironmentKind::Custom, file_path, options)
    }

    pub fn with_kind(
        kind: EnvironmentKind,
        file_path: impl AsRef<Path>,
        options: EnvironmentOptions,
    ) -> Result<Self> {
        let entity = OpenJobEntity::new(
            TemplateClass::Environment,
            file_path,
            options.name,
            options.missing_template,
        )?;
        debug!("Created {:?} environment \"{}\"", kind, entity.name());

        Ok(OpenJobEnvironment {
            entity,
            kind,
            variables: options.variables,
            revision_control: options.revision_control,
            asset_references: options.asset_references,
        })
    }

    /// Create a predefined environment from its template under `templates_dir`
    pub fn from_kind(
        kind: EnvironmentKind,
        templates_dir: &Path,
        options: EnvironmentOptions,
    ) -> Result<Self> {
        let relative = kind.default_template_path().ok_or_else(|| {
            OpenJobError::MissingDependencyData(format!(
                "{:?} environment has no default template",
                kind
            ))
        })?;
        let path: PathBuf = templates_dir.join(relative);
        Self::with_kind(kind, path, options)
    }

    pub fn kind(&self) -> EnvironmentKind {
        self.kind
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn revision_control(&self) -> Option<&RevisionControlState> {
        self.revision_control.as_ref()
    }

    pub fn files_transfer_strategy(&self) -> Option<FilesTransferStrategy> {
        self.kind.files_transfer_strategy()
    }

    /// Variables declared by the template, scalar values as text
    pub fn template_variables(&self) -> Result<BTreeMap<String, String>> {
        let template = self.entity.get_template_object()?;
        let Some(variables) = template.get("variables").and_then(|v| v.as_object()) else {
            return Ok(BTreeMap::new());
        };
        Ok(variables
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect())
    }

    /// Replace the variables with a merge of template and caller variables
    pub fn fix_variables_consistency(&mut self) -> Result<()> {
        let template_variables = self.template_variables()?;
        let (missing_in_template, missing_in_data) = symmetric_difference(
            &variable_keys(template_variables.keys()),
            &variable_keys(self.variables.keys()),
        );
        self.variables = fix_variables_consistency(
            &missing_in_template,
            &missing_in_data,
            &template_variables,
            &self.variables,
        );
        Ok(())
    }
}

impl OpenJobEntityBuild for OpenJobEnvironment {
    type Template = Environment;

    fn entity(&self) -> &OpenJobEntity {
        &self.entity
    }

    fn check_parameters_consistency(&self) -> Result<ConsistencyCheckResult> {
        let template_variables = self.template_variables()?;
        let result = check_consistency(
            &variable_keys(template_variables.keys()),
            &variable_keys(self.variables.keys()),
        );
        Ok(result.with_prefix(&self.entity.message_prefix()))
    }

    fn build_template_object(&self) -> Result<Environment> {
        let template = self.entity.get_template_object()?;
        let script = match template.get("script") {
            Some(script) if !script.is_null() => {
                Some(serde_json::from_value::<EnvironmentScript>(script.clone())?)
            }
            _ => None,
        };

        Ok(Environment {
            name: self.entity.name().to_string(),
            description: template_str(&template, "/description"),
            script,
            variables: (!self.variables.is_empty()).then(|| self.variables.clone()),
        })
    }

    fn get_asset_references(&self) -> Result<AssetReferences> {
        Ok(self.asset_references.clone())
    }
}
