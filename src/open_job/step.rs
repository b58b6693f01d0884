//! Steps of a job: custom steps and the render step.

use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::errors::{OpenJobError, Result};
use crate::models::{
    AssetReferences, StepDependency, StepParameterSpace, StepScript, StepTemplate,
    TaskParameterDefinition,
};
use crate::open_job::consistency::{
    check_consistency, fix_consistency, parameter_keys, symmetric_difference,
    ConsistencyCheckResult, ConsistencyItem, ParameterKey,
};
use crate::open_job::entity::{
    entry_name, template_array, template_str, MissingTemplatePolicy, OpenJobEntity,
    OpenJobEntityBuild, TemplateClass,
};
use crate::open_job::environment::OpenJobEnvironment;
use crate::open_job::host_requirements::HostRequirements;
use crate::open_job::parameter_value::{ParameterKind, ParameterValue};
use crate::open_job::render_intent::RenderIntent;
use crate::open_job::render_step::RenderStepState;

const TASK_PARAMETERS_POINTER: &str = "/parameterSpace/taskParameterDefinitions";

/// A step task parameter with its ordered range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterKind,
    pub range: Vec<ParameterValue>,
}

impl StepParameter {
    pub fn new(name: impl Into<String>, kind: ParameterKind, range: Vec<ParameterValue>) -> Self {
        StepParameter {
            name: name.into(),
            kind,
            range,
        }
    }

    /// Build from untyped range values, casting each to `kind`
    pub fn from_raw(
        name: impl Into<String>,
        kind: ParameterKind,
        range: &[serde_json::Value],
    ) -> Result<Self> {
        let name = name.into();
        let range = ParameterValue::cast_range(&name, kind, range)?;
        Ok(StepParameter { name, kind, range })
    }

    /// Parse one `taskParameterDefinitions` entry.
    ///
    /// `range` is a list of values, or for INT parameters a range expression
    /// such as `"1-10"` or `"1,3,5-7"`.
    pub(crate) fn from_template_definition(path: &Path, entry: &serde_json::Value) -> Result<Self> {
        let name = entry_name(path, entry)?;
        let kind: ParameterKind = entry
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| {
                OpenJobError::invalid_template(path, format!("parameter \"{}\" has no type", name))
            })?
            .parse()?;

        match entry.get("range") {
            None | Some(serde_json::Value::Null) => Ok(StepParameter::new(name, kind, Vec::new())),
            Some(serde_json::Value::Array(values)) => Self::from_raw(name, kind, values),
            Some(serde_json::Value::String(expression)) if kind == ParameterKind::Int => {
                let range = parse_int_range_expression(expression).map_err(|message| {
                    OpenJobError::invalid_template(
                        path,
                        format!(
                            "parameter \"{}\" has invalid range \"{}\": {}",
                            name, expression, message
                        ),
                    )
                })?;
                Ok(StepParameter::new(name, kind, range))
            }
            Some(other) => Err(OpenJobError::invalid_template(
                path,
                format!("parameter \"{}\" has invalid range {}", name, other),
            )),
        }
    }
}

impl ConsistencyItem for StepParameter {
    fn name(&self) -> &str {
        &self.name
    }

    fn consistency_key(&self) -> ParameterKey {
        (self.name.clone(), self.kind.as_str().to_string())
    }
}

/// Most values a range expression may expand to
pub const MAX_RANGE_EXPRESSION_VALUES: usize = 100_000;

/// Expand `"1-3,7"` into `[1, 2, 3, 7]`, refusing to grow past
/// [`MAX_RANGE_EXPRESSION_VALUES`]
fn parse_int_range_expression(expression: &str) -> std::result::Result<Vec<ParameterValue>, String> {
    let parse = |text: &str| {
        text.trim()
            .parse::<i64>()
            .map_err(|_| format!("\"{}\" is not an integer", text.trim()))
    };
    let too_large = || format!("expands to more than {} values", MAX_RANGE_EXPRESSION_VALUES);

    let mut values = Vec::new();
    for part in expression.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        // Skip a leading sign so "-5" parses as a single value.
        let separator = part
            .char_indices()
            .skip(1)
            .find(|(_, c)| *c == '-')
            .map(|(i, _)| i);
        match separator {
            Some(split) => {
                let start = parse(&part[..split])?;
                let end = parse(&part[split + 1..])?;
                if end < start {
                    return Err(format!("\"{}\" ends before it starts", part));
                }
                let count = i128::from(end) - i128::from(start) + 1;
                let remaining = (MAX_RANGE_EXPRESSION_VALUES - values.len()) as i128;
                if count > remaining {
                    return Err(too_large());
                }
                values.extend((start..=end).map(ParameterValue::Int));
            }
            None => {
                if values.len() == MAX_RANGE_EXPRESSION_VALUES {
                    return Err(too_large());
                }
                values.push(ParameterValue::Int(parse(part)?));
            }
        }
    }
    Ok(values)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    #[default]
    Custom,
    Render,
}

impl StepKind {
    /// Template path relative to the templates directory
    pub fn default_template_path(&self) -> Option<&'static str> {
        match self {
            StepKind::Custom => None,
            StepKind::Render => Some("render_step.yml"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StepOptions {
    pub name: Option<String>,
    /// Names of sibling steps this step runs after
    pub step_dependencies: Vec<String>,
    pub environments: Vec<OpenJobEnvironment>,
    pub extra_parameters: Vec<StepParameter>,
    pub host_requirements: Option<HostRequirements>,
    pub asset_references: AssetReferences,
    pub missing_template: MissingTemplatePolicy,
}

#[derive(Debug, Clone)]
pub struct OpenJobStep {
    entity: OpenJobEntity,
    kind: StepKind,
    step_dependencies: Vec<String>,
    environments: Vec<OpenJobEnvironment>,
    extra_parameters: Vec<StepParameter>,
    host_requirements: Option<HostRequirements>,
    asset_references: AssetReferences,
    render: RenderStepState,
}

impl OpenJobStep {
    pub fn new(file_path: impl AsRef<Path>, options: StepOptions) -> Result<Self> {
        Self::create(StepKind::Custom, file_path, options, RenderStepState::default())
    }

    /// A render step. The intent may be attached later by the owning render
    /// job.
    pub fn render(
        file_path: impl AsRef<Path>,
        options: StepOptions,
        render_intent: Option<Arc<dyn RenderIntent>>,
    ) -> Result<Self> {
        Self::create(
            StepKind::Render,
            file_path,
            options,
            RenderStepState::new(render_intent),
        )
    }

    /// Create a predefined step from its template under `templates_dir`
    pub fn from_kind(kind: StepKind, templates_dir: &Path, options: StepOptions) -> Result<Self> {
        let relative = kind.default_template_path().ok_or_else(|| {
            OpenJobError::MissingDependencyData(format!("{:?} step has no default template", kind))
        })?;
        Self::create(
            kind,
            templates_dir.join(relative),
            options,
            RenderStepState::default(),
        )
    }

    fn create(
        kind: StepKind,
        file_path: impl AsRef<Path>,
        options: StepOptions,
        render: RenderStepState,
    ) -> Result<Self> {
        let entity = OpenJobEntity::new(
            TemplateClass::Step,
            file_path,
            options.name,
            options.missing_template,
        )?;

        let mut step = OpenJobStep {
            entity,
            kind,
            step_dependencies: options.step_dependencies,
            environments: options.environments,
            extra_parameters: options.extra_parameters,
            host_requirements: options.host_requirements,
            asset_references: options.asset_references,
            render,
        };
        step.create_missing_extra_parameters_from_template()?;
        Ok(step)
    }

    /// Append every template parameter the caller did not supply by name
    fn create_missing_extra_parameters_from_template(&mut self) -> Result<()> {
        if !self.entity.file_path().is_file() {
            return Ok(());
        }
        for parameter in self.template_parameters()? {
            if !self.extra_parameters.iter().any(|p| p.name == parameter.name) {
                debug!(
                    "{}adding template parameter {}",
                    self.entity.message_prefix(),
                    parameter.name
                );
                self.extra_parameters.push(parameter);
            }
        }
        Ok(())
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn is_render(&self) -> bool {
        self.kind == StepKind::Render
    }

    pub fn step_dependencies(&self) -> &[String] {
        &self.step_dependencies
    }

    pub fn environments(&self) -> &[OpenJobEnvironment] {
        &self.environments
    }

    pub fn extra_parameters(&self) -> &[StepParameter] {
        &self.extra_parameters
    }

    pub fn host_requirements(&self) -> Option<&HostRequirements> {
        self.host_requirements.as_ref()
    }

    pub fn render_intent(&self) -> Option<&Arc<dyn RenderIntent>> {
        self.render.intent()
    }

    /// Attach a render intent; no effect on custom steps
    pub fn set_render_intent(&mut self, intent: Arc<dyn RenderIntent>) {
        if self.is_render() {
            self.render.set_intent(intent);
        }
    }

    pub fn find_extra_parameter(&self, name: &str, kind: ParameterKind) -> Option<&StepParameter> {
        self.extra_parameters
            .iter()
            .find(|p| p.name == name && p.kind == kind)
    }

    pub fn find_extra_parameter_by_name(&self, name: &str) -> Option<&StepParameter> {
        self.extra_parameters.iter().find(|p| p.name == name)
    }

    /// Replace the range of the existing parameter with the same name and
    /// kind. Returns false, and changes nothing, when there is none.
    pub fn update_extra_parameter(&mut self, parameter: StepParameter) -> bool {
        match self
            .extra_parameters
            .iter_mut()
            .find(|p| p.name == parameter.name && p.kind == parameter.kind)
        {
            Some(existing) => {
                existing.range = parameter.range;
                true
            }
            None => false,
        }
    }

    /// Task parameters declared by the template, in template order
    pub fn template_parameters(&self) -> Result<Vec<StepParameter>> {
        let template = self.entity.get_template_object()?;
        template_array(&template, TASK_PARAMETERS_POINTER)
            .iter()
            .map(|entry| StepParameter::from_template_definition(self.entity.file_path(), entry))
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

    /// Parameters used for the build: the caller's, plus derived render values
    fn resolved_parameters(&self) -> Result<Vec<StepParameter>> {
        match self.kind {
            StepKind::Render => self
                .render
                .resolve_parameters(self.entity.name(), &self.extra_parameters),
            StepKind::Custom => Ok(self.extra_parameters.clone()),
        }
    }

    fn check_consistency_of(&self, parameters: &[StepParameter]) -> Result<ConsistencyCheckResult> {
        let template_parameters = self.template_parameters()?;
        let result = check_consistency(
            &parameter_keys(&template_parameters),
            &parameter_keys(parameters),
        );
        Ok(result.with_prefix(&self.entity.message_prefix()))
    }

    fn assemble(&self, parameters: &[StepParameter]) -> Result<StepTemplate> {
        let template = self.entity.get_template_object()?;
        let path = self.entity.file_path();

        let mut task_parameter_definitions = Vec::new();
        for entry in template_array(&template, TASK_PARAMETERS_POINTER) {
            let declared = StepParameter::from_template_definition(path, entry)?;
            let range = parameters
                .iter()
                .find(|p| p.name == declared.name && p.kind == declared.kind)
                .map(|p| p.range.clone())
                .unwrap_or(declared.range);
            task_parameter_definitions.push(TaskParameterDefinition {
                name: declared.name,
                kind: declared.kind,
                range,
            });
        }

        let parameter_space = (!task_parameter_definitions.is_empty()).then(|| StepParameterSpace {
            task_parameter_definitions,
            combination: template_str(&template, "/parameterSpace/combination"),
        });

        if let Some(space) = parameter_space.as_ref().filter(|s| s.combination.is_none()) {
            match space.cross_product_task_count() {
                Some(count) => debug!("Step \"{}\" expands to {} tasks", self.entity.name(), count),
                None => warn!("Step \"{}\" task count overflows", self.entity.name()),
            }
        }

        let script = template
            .get("script")
            .filter(|s| !s.is_null())
            .ok_or_else(|| OpenJobError::invalid_template(path, "step has no script"))?;
        let script: StepScript = serde_json::from_value(script.clone())?;

        let step_environments = self
            .environments
            .iter()
            .map(OpenJobEnvironment::build_template)
            .collect::<Result<Vec<_>>>()?;

        let dependencies: Vec<StepDependency> = self
            .step_dependencies
            .iter()
            .map(|name| StepDependency {
                depends_on: name.clone(),
            })
            .collect();

        let host_requirements = match &self.host_requirements {
            Some(requirements) => requirements.step_requirements()?,
            None => None,
        };

        info!("Built step \"{}\"", self.entity.name());
        Ok(StepTemplate {
            name: self.entity.name().to_string(),
            description: template_str(&template, "/description"),
            parameter_space,
            step_environments: (!step_environments.is_empty()).then_some(step_environments),
            dependencies: (!dependencies.is_empty()).then_some(dependencies),
            host_requirements,
            script,
        })
    }
}

impl OpenJobEntityBuild for OpenJobStep {
    type Template = StepTemplate;

    fn entity(&self) -> &OpenJobEntity {
        &self.entity
    }

    fn check_parameters_consistency(&self) -> Result<ConsistencyCheckResult> {
        self.check_consistency_of(&self.extra_parameters)
    }

    fn build_template_object(&self) -> Result<StepTemplate> {
        let parameters = self.resolved_parameters()?;
        self.assemble(&parameters)
    }

    /// Check before resolving: resolving a render step may save its manifest.
    /// Resolution only replaces ranges, so the checked keys are the same.
    fn build_template(&self) -> Result<StepTemplate> {
        let result = self.check_consistency_of(&self.extra_parameters)?;
        if !result.passed {
            return Err(OpenJobError::ParametersInconsistent(result.reason));
        }
        let parameters = self.resolved_parameters()?;
        self.assemble(&parameters)
    }

    /// Own attachments, environment attachments and, for render steps, the
    /// saved manifest and render output directory
    fn get_asset_references(&self) -> Result<AssetReferences> {
        let mut references = self.asset_references.clone();
        for environment in &self.environments {
            references.union(&environment.get_asset_references()?);
        }
        if let Some(manifest) = self.render.queue_manifest_path() {
            references
                .input_filenames
                .insert(manifest.to_string_lossy().into_owned());
        }
        if let Some(output) = self.render.intent().and_then(|i| i.output_path()) {
            references.output_directories.insert(output);
        }
        Ok(references)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_range_expression() {
        let values = parse_int_range_expression("1-3, 7").unwrap();
        assert_eq!(
            values,
            vec![
                ParameterValue::Int(1),
                ParameterValue::Int(2),
                ParameterValue::Int(3),
                ParameterValue::Int(7)
            ]
        );
        assert_eq!(
            parse_int_range_expression("-5").unwrap(),
            vec![ParameterValue::Int(-5)]
        );
        assert!(parse_int_range_expression("5-1").is_err());
        assert!(parse_int_range_expression("a-b").is_err());
    }

    #[test]
    fn test_parse_int_range_expression_limit() {
        let limit = MAX_RANGE_EXPRESSION_VALUES as i64;
        assert_eq!(
            parse_int_range_expression(&format!("1-{}", limit))
                .unwrap()
                .len(),
            MAX_RANGE_EXPRESSION_VALUES
        );
        assert!(parse_int_range_expression(&format!("1-{}", limit + 1)).is_err());
        assert!(parse_int_range_expression(&format!("1-{}, 0", limit)).is_err());
        assert!(parse_int_range_expression("1-3000000").is_err());
        assert!(parse_int_range_expression(&format!("{}-{}", i64::MIN, i64::MAX)).is_err());
    }

    #[test]
    fn test_template_definition_with_oversized_expression_range() {
        let entry = serde_json::json!({"name": "Frame", "type": "INT", "range": "1-3000000"});
        match StepParameter::from_template_definition(Path::new("step.yml"), &entry) {
            Err(OpenJobError::InvalidTemplate { message, .. }) => {
                assert!(message.contains("more than"));
            }
            other => panic!("expected invalid template, got {:?}", other),
        }
    }

    #[test]
    fn test_template_definition_with_expression_range() {
        let entry = serde_json::json!({"name": "Frame", "type": "INT", "range": "1-4"});
        let parameter =
            StepParameter::from_template_definition(Path::new("step.yml"), &entry).unwrap();
        assert_eq!(parameter.range.len(), 4);
    }

    #[test]
    fn test_template_definition_without_type() {
        let entry = serde_json::json!({"name": "Frame", "range": [1]});
        assert!(matches!(
            StepParameter::from_template_definition(Path::new("step.yml"), &entry),
            Err(OpenJobError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn test_consistency_key() {
        let parameter = StepParameter::new("Frame", ParameterKind::Int, Vec::new());
        assert_eq!(
            parameter.consistency_key(),
            ("Frame".to_string(), "INT".to_string())
        );
    }
}
