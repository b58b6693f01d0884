//! The job: root of the entity tree and source of the bundle.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use log::{debug, info, warn};
use regex::Regex;
use serde::Serialize;

use crate::errors::{OpenJobError, Result};
use crate::models::{
    AssetReferences, JOB_TEMPLATE_VERSION, JobParameterDefinition, JobParameterValue, JobTemplate,
};
use crate::open_job::bundle::JobBundle;
use crate::open_job::consistency::{
    check_consistency, fix_consistency, parameter_keys, symmetric_difference,
    ConsistencyCheckResult, ConsistencyItem, ParameterKey,
};
use crate::open_job::entity::{
    entry_name, template_array, template_str, MissingTemplatePolicy, OpenJobEntity,
    OpenJobEntityBuild, TemplateClass,
};
use crate::open_job::environment::{FilesTransferStrategy, OpenJobEnvironment};
use crate::open_job::parameter_value::{ParameterKind, ParameterName, ParameterValue};
use crate::open_job::render_intent::RenderIntent;
use crate::open_job::shared_settings::JobSharedSettings;
use crate::open_job::step::OpenJobStep;

const PARAMETER_DEFINITIONS_POINTER: &str = "/parameterDefinitions";

/// `-execcmds=...` and everything before it; worker renders must not run
/// editor-local startup scripts
static EXEC_CMDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#".*(?P<cmds>-execcmds=[\s\S]+['"])"#).expect("valid execcmds pattern")
});

/// A job parameter with its single value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<ParameterValue>,
}

impl JobParameter {
    pub fn new(name: impl Into<String>, kind: ParameterKind, value: Option<ParameterValue>) -> Self {
        JobParameter {
            name: name.into(),
            kind,
            value,
        }
    }

    /// Build from an untyped value, casting it to `kind`
    pub fn from_raw(
        name: impl Into<String>,
        kind: ParameterKind,
        value: Option<&serde_json::Value>,
    ) -> Result<Self> {
        let name = name.into();
        let value = ParameterValue::cast_optional(&name, kind, value)?;
        Ok(JobParameter { name, kind, value })
    }
}

impl ConsistencyItem for JobParameter {
    fn name(&self) -> &str {
        &self.name
    }

    fn consistency_key(&self) -> ParameterKey {
        (self.name.clone(), self.kind.as_str().to_string())
    }
}

fn parameter_kind(path: &Path, name: &str, entry: &serde_json::Value) -> Result<ParameterKind> {
    entry
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| {
            OpenJobError::invalid_template(path, format!("parameter \"{}\" has no type", name))
        })?
        .parse()
}

/// Typed definition of one `parameterDefinitions` entry
fn definition_from_template(path: &Path, entry: &serde_json::Value) -> Result<JobParameterDefinition> {
    let name = entry_name(path, entry)?;
    let kind = parameter_kind(path, &name, entry)?;
    let cast = |key: &str| ParameterValue::cast_optional(&name, kind, entry.get(key));
    let integer = |key: &str| entry.get(key).and_then(serde_json::Value::as_i64);

    let allowed_values = match entry.get("allowedValues").and_then(|v| v.as_array()) {
        Some(values) => Some(ParameterValue::cast_range(&name, kind, values)?),
        None => None,
    };

    let mut definition = JobParameterDefinition::new(name.clone(), kind);
    definition.description = template_str(entry, "/description");
    definition.default = cast("default")?;
    definition.allowed_values = allowed_values;
    definition.min_value = cast("minValue")?;
    definition.max_value = cast("maxValue")?;
    definition.min_length = integer("minLength");
    definition.max_length = integer("maxLength");
    definition.object_type = template_str(entry, "/objectType");
    definition.data_flow = template_str(entry, "/dataFlow");
    definition.user_interface = entry.get("userInterface").filter(|v| !v.is_null()).cloned();
    Ok(definition)
}

/// Set the value of `name`, appending a new entry only when asked.
///
/// Returns whether `values` changed.
pub fn update_job_parameter_values(
    values: &mut Vec<JobParameterValue>,
    name: &str,
    value: Option<ParameterValue>,
    create_if_not_exists: bool,
) -> bool {
    if let Some(existing) = values.iter_mut().find(|v| v.name == name) {
        existing.value = value;
        return true;
    }
    if create_if_not_exists {
        values.push(JobParameterValue::new(name, value));
        return true;
    }
    false
}

/// Command line for render workers: the intent's arguments followed by the
/// job's `ExtraCmdArgs`, without any `-execcmds`, duplicates or blanks
pub fn render_cmd_args(intent_args: &[String], extra_cmd_args: Option<&str>) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut seen = BTreeSet::new();

    let extra = extra_cmd_args
        .map(|a| EXEC_CMDS.replace(a, "").into_owned())
        .unwrap_or_default();

    let candidates = intent_args
        .iter()
        .flat_map(|a| a.split(' '))
        .chain(extra.split(' '))
        .map(str::trim)
        .filter(|a| !a.is_empty());

    for arg in candidates {
        if seen.insert(arg.to_string()) {
            args.push(arg.to_string());
        }
    }
    args
}

#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    pub name: Option<String>,
    pub steps: Vec<OpenJobStep>,
    pub environments: Vec<OpenJobEnvironment>,
    pub extra_parameters: Vec<JobParameter>,
    pub job_shared_settings: JobSharedSettings,
    pub asset_references: AssetReferences,
    pub missing_template: MissingTemplatePolicy,
    /// Written into the built template; `jobtemplate-2023-09` when unset
    pub specification_version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenJob {
    entity: OpenJobEntity,
    steps: Vec<OpenJobStep>,
    environments: Vec<OpenJobEnvironment>,
    extra_parameters: Vec<JobParameter>,
    job_shared_settings: JobSharedSettings,
    asset_references: AssetReferences,
    specification_version: String,
    render_intent: Option<Arc<dyn RenderIntent>>,
}

impl OpenJob {
    pub fn new(file_path: impl AsRef<Path>, options: JobOptions) -> Result<Self> {
        let entity = OpenJobEntity::new(
            TemplateClass::Job,
            file_path,
            options.name.clone(),
            options.missing_template,
        )?;
        Self::create(entity, options, None)
    }

    /// A render job: exactly one render step, which receives `render_intent`
    /// unless it already has one
    pub fn render(
        file_path: impl AsRef<Path>,
        options: JobOptions,
        render_intent: Arc<dyn RenderIntent>,
    ) -> Result<Self> {
        let render_steps = options.steps.iter().filter(|s| s.is_render()).count();
        if render_steps != 1 {
            return Err(OpenJobError::RenderStepCountConstraint(render_steps));
        }

        let entity = OpenJobEntity::with_fallback_name(
            TemplateClass::Job,
            file_path,
            options.name.clone(),
            render_intent.job_name(),
            options.missing_template,
        )?;
        Self::create(entity, options, Some(render_intent))
    }

    fn create(
        entity: OpenJobEntity,
        options: JobOptions,
        render_intent: Option<Arc<dyn RenderIntent>>,
    ) -> Result<Self> {
        let mut steps = options.steps;
        if let Some(intent) = &render_intent {
            for step in steps.iter_mut().filter(|s| s.render_intent().is_none()) {
                step.set_render_intent(Arc::clone(intent));
            }
        }

        let mut job = OpenJob {
            entity,
            steps,
            environments: options.environments,
            extra_parameters: options.extra_parameters,
            job_shared_settings: options.job_shared_settings,
            asset_references: options.asset_references,
            specification_version: options
                .specification_version
                .unwrap_or_else(|| JOB_TEMPLATE_VERSION.to_string()),
            render_intent,
        };
        job.create_missing_extra_parameters_from_template()?;
        debug!(
            "Created job \"{}\" with {} steps",
            job.entity.name(),
            job.steps.len()
        );
        Ok(job)
    }

    fn create_missing_extra_parameters_from_template(&mut self) -> Result<()> {
        if !self.entity.file_path().is_file() {
            return Ok(());
        }
        for parameter in self.template_parameters()? {
            if !self.extra_parameters.iter().any(|p| p.name == parameter.name) {
                self.extra_parameters.push(parameter);
            }
        }
        Ok(())
    }

    pub fn steps(&self) -> &[OpenJobStep] {
        &self.steps
    }

    pub fn environments(&self) -> &[OpenJobEnvironment] {
        &self.environments
    }

    pub fn extra_parameters(&self) -> &[JobParameter] {
        &self.extra_parameters
    }

    pub fn job_shared_settings(&self) -> &JobSharedSettings {
        &self.job_shared_settings
    }

    pub fn render_intent(&self) -> Option<&Arc<dyn RenderIntent>> {
        self.render_intent.as_ref()
    }

    pub fn find_extra_parameter(&self, name: &str) -> Option<&JobParameter> {
        self.extra_parameters.iter().find(|p| p.name == name)
    }

    /// Parameters declared by the template with their defaults
    pub fn template_parameters(&self) -> Result<Vec<JobParameter>> {
        let template = self.entity.get_template_object()?;
        let path = self.entity.file_path();
        template_array(&template, PARAMETER_DEFINITIONS_POINTER)
            .iter()
            .map(|entry| {
                let name = entry_name(path, entry)?;
                let kind = parameter_kind(path, &name, entry)?;
                JobParameter::from_raw(name, kind, entry.get("default"))
            })
            .collect()
    }

    /// Replace the parameters with a merge of template and caller parameters
    pub fn fix_parameters_consistency(&mut self) -> Result<()> {
        let template_parameters = self.template_parameters()?;
        let (missing_in_template, missing_in_data) = symmetric_difference(
            &parameter_keys(&template_parameters),
            &parameter_keys(&self.extra_parameters),
        );
        self.extra_parameters = fix_consistency(
            &missing_in_template,
            &missing_in_data,
            &template_parameters,
            &self.extra_parameters,
        );
        Ok(())
    }

    fn all_environments(&self) -> impl Iterator<Item = &OpenJobEnvironment> {
        self.environments
            .iter()
            .chain(self.steps.iter().flat_map(|s| s.environments().iter()))
    }

    /// Run every consistency check of the tree: the job, then each step and
    /// its environments, then the job environments
    pub fn check_all_consistency(&self) -> Result<Vec<ConsistencyCheckResult>> {
        let mut results = vec![self.check_parameters_consistency()?];
        for step in &self.steps {
            results.push(step.check_parameters_consistency()?);
            for environment in step.environments() {
                results.push(environment.check_parameters_consistency()?);
            }
        }
        for environment in &self.environments {
            results.push(environment.check_parameters_consistency()?);
        }
        Ok(results)
    }

    /// How job files reach the worker, from the kinds of the environments
    pub fn files_transfer_strategy(&self) -> Result<FilesTransferStrategy> {
        let strategies: BTreeSet<FilesTransferStrategy> = self
            .all_environments()
            .filter_map(OpenJobEnvironment::files_transfer_strategy)
            .collect();

        let mut detected = strategies.iter();
        match (detected.next(), detected.next()) {
            (None, _) => Ok(FilesTransferStrategy::S3),
            (Some(strategy), None) => Ok(*strategy),
            (Some(_), Some(_)) => Err(OpenJobError::FilesTransferStrategyAmbiguous(format!(
                "job \"{}\" mixes {} environments",
                self.entity.name(),
                strategies
                    .iter()
                    .map(FilesTransferStrategy::as_str)
                    .collect::<Vec<_>>()
                    .join(" and ")
            ))),
        }
    }

    /// Every `step_dependencies` name must be another step of this job
    fn check_step_dependencies(&self) -> Result<()> {
        for step in &self.steps {
            for dependency in step.step_dependencies() {
                let resolved = dependency != step.name()
                    && self.steps.iter().any(|s| s.name() == dependency);
                if !resolved {
                    return Err(OpenJobError::UnknownStepDependency {
                        step: step.name().to_string(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Set a template-declared parameter from a raw value, cast to the
    /// declared kind
    fn set_declared_value(
        values: &mut Vec<JobParameterValue>,
        declared: &[JobParameter],
        name: ParameterName,
        raw: &serde_json::Value,
    ) -> Result<()> {
        let Some(parameter) = declared.iter().find(|p| name.matches(&p.name)) else {
            debug!("Job template does not declare {}, value not set", name);
            return Ok(());
        };
        let value = ParameterValue::cast(&parameter.name, parameter.kind, raw)?;
        update_job_parameter_values(values, &parameter.name, Some(value), false);
        Ok(())
    }

    /// The flat parameter values of the bundle.
    ///
    /// Template parameters take the caller's value when one exists for the
    /// same name and kind, else the template default. Render intent and
    /// revision-control values override declared parameters, and the shared
    /// settings are appended last.
    pub fn build_parameter_values(&self) -> Result<Vec<JobParameterValue>> {
        let declared = self.template_parameters()?;

        let mut values: Vec<JobParameterValue> = declared
            .iter()
            .map(|parameter| {
                let value = self
                    .extra_parameters
                    .iter()
                    .find(|p| p.name == parameter.name && p.kind == parameter.kind)
                    .map(|p| p.value.clone())
                    .unwrap_or_else(|| parameter.value.clone());
                JobParameterValue::new(parameter.name.clone(), value)
            })
            .collect();

        if let Some(intent) = &self.render_intent {
            if let Some(project) = intent.project_file_path() {
                Self::set_declared_value(
                    &mut values,
                    &declared,
                    ParameterName::ProjectFilePath,
                    &serde_json::Value::String(project),
                )?;
            }

            let current = values
                .iter()
                .find(|v| ParameterName::ExtraCmdArgs.matches(&v.name))
                .and_then(|v| v.value.as_ref())
                .and_then(|v| v.as_str().map(str::to_string));
            let args = render_cmd_args(&intent.extra_cmd_args(), current.as_deref());
            if !args.is_empty() {
                Self::set_declared_value(
                    &mut values,
                    &declared,
                    ParameterName::ExtraCmdArgs,
                    &serde_json::Value::String(args.join(" ")),
                )?;
            }
        }

        for environment in self.all_environments() {
            let Some(state) = environment.revision_control() else {
                continue;
            };
            for (name, raw) in state.parameter_values() {
                Self::set_declared_value(&mut values, &declared, name, &raw)?;
            }
        }

        values.extend(self.job_shared_settings.parameter_values());
        Ok(values)
    }

    /// Build the template, parameter values and attachments in one pass
    pub fn build_bundle(&self) -> Result<JobBundle> {
        let strategy = self.files_transfer_strategy()?;
        info!(
            "Building job \"{}\" with {} files transfer",
            self.entity.name(),
            strategy
        );
        let template = self.build_template()?;
        let parameter_values = self.build_parameter_values()?;
        let asset_references = self.get_asset_references()?;
        Ok(JobBundle::new(template, parameter_values, asset_references))
    }
}

impl OpenJobEntityBuild for OpenJob {
    type Template = JobTemplate;

    fn entity(&self) -> &OpenJobEntity {
        &self.entity
    }

    fn check_parameters_consistency(&self) -> Result<ConsistencyCheckResult> {
        let template_parameters = self.template_parameters()?;
        let result = check_consistency(
            &parameter_keys(&template_parameters),
            &parameter_keys(&self.extra_parameters),
        );
        Ok(result.with_prefix(&self.entity.message_prefix()))
    }

    fn build_template_object(&self) -> Result<JobTemplate> {
        self.check_step_dependencies()?;

        let template = self.entity.get_template_object()?;
        let path = self.entity.file_path();
        let parameter_definitions = template_array(&template, PARAMETER_DEFINITIONS_POINTER)
            .iter()
            .map(|entry| definition_from_template(path, entry))
            .collect::<Result<Vec<_>>>()?;

        let steps = self
            .steps
            .iter()
            .map(OpenJobStep::build_template)
            .collect::<Result<Vec<_>>>()?;
        let job_environments = self
            .environments
            .iter()
            .map(OpenJobEnvironment::build_template)
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Built job \"{}\": {} steps, {} environments",
            self.entity.name(),
            steps.len(),
            job_environments.len()
        );
        Ok(JobTemplate {
            specification_version: self.specification_version.clone(),
            name: self.entity.name().to_string(),
            parameter_definitions: (!parameter_definitions.is_empty())
                .then_some(parameter_definitions),
            job_environments: (!job_environments.is_empty()).then_some(job_environments),
            steps,
        })
    }

    /// Union of the job's, its steps' and its environments' attachments plus
    /// the render intent's. Dependency files are attached only when files are
    /// uploaded with the job.
    fn get_asset_references(&self) -> Result<AssetReferences> {
        let strategy = self.files_transfer_strategy()?;

        let mut references = self.asset_references.clone();
        for step in &self.steps {
            references.union(&step.get_asset_references()?);
        }
        for environment in &self.environments {
            references.union(&environment.get_asset_references()?);
        }

        if let Some(intent) = &self.render_intent {
            references.union(&intent.attachments());
            if let Some(output) = intent.output_path() {
                references.output_directories.insert(output);
            }
            if strategy.is_revision_control() {
                debug!("Dependency files are synced by {}, not attached", strategy);
            } else {
                for dependency in intent.dependency_files() {
                    if Path::new(&dependency).exists() {
                        references.input_filenames.insert(dependency);
                    } else {
                        warn!("Dependency file {} does not exist, skipped", dependency);
                    }
                }
            }
        }
        Ok(references)
    }
}
