//! Resolved Open Job Description (2023-09) template model.
//!
//! These are the fully typed structures produced by building a job. Field
//! order is the emission order; `None` fields are skipped and
//! [`strip_nulls`] removes any nulls left in nested free-form values.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::open_job::parameter_value::{ParameterKind, ParameterValue};

/// Specification version written into every built job template
pub const JOB_TEMPLATE_VERSION: &str = "jobtemplate-2023-09";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTemplate {
    pub specification_version: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_definitions: Option<Vec<JobParameterDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_environments: Option<Vec<Environment>>,
    pub steps: Vec<StepTemplate>,
}

impl JobTemplate {
    /// Serialize to a JSON value in emission order with all nulls removed
    pub fn to_document(&self) -> Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        strip_nulls(&mut value);
        Ok(value)
    }
}

/// Job-level parameter definition with a single typed default
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobParameterDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<ParameterValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<ParameterValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<ParameterValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<ParameterValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i64>,
    /// PATH parameters only: FILE or DIRECTORY
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    /// PATH parameters only: NONE, IN, OUT or INOUT
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_flow: Option<String>,
    /// Submitter UI hints, passed through untouched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_interface: Option<serde_json::Value>,
}

impl JobParameterDefinition {
    pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
        JobParameterDefinition {
            name: name.into(),
            kind,
            description: None,
            default: None,
            allowed_values: None,
            min_value: None,
            max_value: None,
            min_length: None,
            max_length: None,
            object_type: None,
            data_flow: None,
            user_interface: None,
        }
    }
}

/// Step-level task parameter with its ordered range of values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskParameterDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterKind,
    pub range: Vec<ParameterValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepParameterSpace {
    pub task_parameter_definitions: Vec<TaskParameterDefinition>,
    /// Explicit combination expression, e.g. `"(Frame, Camera)"`. Full cross
    /// product when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combination: Option<String>,
}

impl StepParameterSpace {
    /// Number of tasks when the parameters are combined as a cross product,
    /// `None` when it does not fit in a `usize`
    pub fn cross_product_task_count(&self) -> Option<usize> {
        self.task_parameter_definitions
            .iter()
            .try_fold(1usize, |count, p| count.checked_mul(p.range.len()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelation: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepActions {
    pub on_run: Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepScript {
    pub actions: StepActions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedded_files: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentActions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_enter: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_exit: Option<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentScript {
    pub actions: EnvironmentActions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedded_files: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<EnvironmentScript>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDependency {
    pub depends_on: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeRequirement {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_of: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRequirement {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
}

/// Generic requirement lists consumed by the remote scheduler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRequirementsModel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<AttributeRequirement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amounts: Option<Vec<AmountRequirement>>,
}

impl HostRequirementsModel {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_none() && self.amounts.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTemplate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_space: Option<StepParameterSpace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_environments: Option<Vec<Environment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<StepDependency>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_requirements: Option<HostRequirementsModel>,
    pub script: StepScript,
}

/// One entry of the flat parameter-values document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobParameterValue {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<ParameterValue>,
}

impl JobParameterValue {
    pub fn new(name: impl Into<String>, value: Option<ParameterValue>) -> Self {
        JobParameterValue {
            name: name.into(),
            value,
        }
    }
}

/// Files and directories to attach to a submission
///
/// Each set is deduplicated; merging two references is a set union.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetReferences {
    pub input_filenames: BTreeSet<String>,
    pub input_directories: BTreeSet<String>,
    pub output_directories: BTreeSet<String>,
}

impl AssetReferences {
    pub fn is_empty(&self) -> bool {
        self.input_filenames.is_empty()
            && self.input_directories.is_empty()
            && self.output_directories.is_empty()
    }

    pub fn union(&mut self, other: &AssetReferences) {
        self.input_filenames
            .extend(other.input_filenames.iter().cloned());
        self.input_directories
            .extend(other.input_directories.iter().cloned());
        self.output_directories
            .extend(other.output_directories.iter().cloned());
    }

    /// The `assetReferences` document of a job bundle
    pub fn to_document(&self) -> serde_json::Value {
        serde_json::json!({
            "assetReferences": {
                "inputs": {
                    "filenames": self.input_filenames,
                    "directories": self.input_directories,
                },
                "outputs": {
                    "directories": self.output_directories,
                },
            }
        })
    }
}

/// Remove null object members, recursing through objects and arrays
pub fn strip_nulls(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            for v in map.values_mut() {
                strip_nulls(v);
            }
        }
        serde_json::Value::Array(items) => {
            for v in items.iter_mut() {
                strip_nulls(v);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(name: &str) -> StepTemplate {
        StepTemplate {
            name: name.to_string(),
            description: None,
            parameter_space: None,
            step_environments: None,
            dependencies: None,
            host_requirements: None,
            script: StepScript {
                actions: StepActions {
                    on_run: Action {
                        command: "echo".to_string(),
                        args: None,
                        timeout: None,
                        cancelation: None,
                    },
                },
                embedded_files: None,
            },
        }
    }

    #[test]
    fn test_job_template_key_order() {
        let template = JobTemplate {
            specification_version: JOB_TEMPLATE_VERSION.to_string(),
            name: "Job".to_string(),
            parameter_definitions: Some(vec![JobParameterDefinition::new(
                "P",
                ParameterKind::Int,
            )]),
            job_environments: Some(vec![Environment {
                name: "Env".to_string(),
                description: None,
                script: None,
                variables: None,
            }]),
            steps: vec![step("Render")],
        };

        let document = template.to_document().unwrap();
        let keys: Vec<&String> = document.as_object().unwrap().keys().collect();
        assert_eq!(
            keys,
            vec![
                "specificationVersion",
                "name",
                "parameterDefinitions",
                "jobEnvironments",
                "steps"
            ]
        );
    }

    #[test]
    fn test_empty_job_environments_are_omitted() {
        let template = JobTemplate {
            specification_version: JOB_TEMPLATE_VERSION.to_string(),
            name: "Job".to_string(),
            parameter_definitions: None,
            job_environments: None,
            steps: vec![step("Render")],
        };
        let document = template.to_document().unwrap();
        assert!(document.get("jobEnvironments").is_none());
        assert!(document.get("parameterDefinitions").is_none());
    }

    #[test]
    fn test_strip_nulls_recurses() {
        let mut value = json!({
            "a": null,
            "b": {"c": null, "d": 1},
            "e": [{"f": null, "g": 2}, null]
        });
        strip_nulls(&mut value);
        assert_eq!(value, json!({"b": {"d": 1}, "e": [{"g": 2}, null]}));
    }

    #[test]
    fn test_asset_references_union_deduplicates() {
        let mut a = AssetReferences::default();
        a.input_filenames.insert("/a".to_string());
        a.input_filenames.insert("/b".to_string());
        let mut b = AssetReferences::default();
        b.input_filenames.insert("/b".to_string());
        b.output_directories.insert("/out".to_string());

        a.union(&b);
        assert_eq!(a.input_filenames.len(), 2);
        assert_eq!(a.output_directories.len(), 1);
    }

    #[test]
    fn test_asset_references_document_shape() {
        let mut refs = AssetReferences::default();
        refs.input_directories.insert("/in".to_string());
        let document = refs.to_document();
        assert_eq!(
            document["assetReferences"]["inputs"]["directories"],
            json!(["/in"])
        );
        assert_eq!(
            document["assetReferences"]["outputs"]["directories"],
            json!([])
        );
    }

    #[test]
    fn test_cross_product_task_count() {
        let space = StepParameterSpace {
            task_parameter_definitions: vec![
                TaskParameterDefinition {
                    name: "A".to_string(),
                    kind: ParameterKind::Int,
                    range: vec![ParameterValue::Int(1), ParameterValue::Int(2)],
                },
                TaskParameterDefinition {
                    name: "B".to_string(),
                    kind: ParameterKind::String,
                    range: vec![
                        ParameterValue::String("x".to_string()),
                        ParameterValue::String("y".to_string()),
                        ParameterValue::String("z".to_string()),
                    ],
                },
            ],
            combination: None,
        };
        assert_eq!(space.cross_product_task_count(), Some(6));
    }
}
