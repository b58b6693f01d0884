//! Job bundle: the built template, its parameter values and attachments,
//! written as three YAML documents.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::info;

use crate::config::BundleConfig;
use crate::errors::Result;
use crate::models::{strip_nulls, AssetReferences, JobParameterValue, JobTemplate};

pub const TEMPLATE_FILE: &str = "template.yaml";
pub const PARAMETER_VALUES_FILE: &str = "parameter_values.yaml";
pub const ASSET_REFERENCES_FILE: &str = "asset_references.yaml";

#[derive(Debug, Clone, PartialEq)]
pub struct JobBundle {
    pub template: JobTemplate,
    pub parameter_values: Vec<JobParameterValue>,
    pub asset_references: AssetReferences,
}

impl JobBundle {
    pub fn new(
        template: JobTemplate,
        parameter_values: Vec<JobParameterValue>,
        asset_references: AssetReferences,
    ) -> Self {
        JobBundle {
            template,
            parameter_values,
            asset_references,
        }
    }

    pub fn template_document(&self) -> Result<serde_json::Value> {
        self.template.to_document()
    }

    pub fn parameter_values_document(&self) -> Result<serde_json::Value> {
        let mut document = serde_json::json!({
            "parameterValues": serde_json::to_value(&self.parameter_values)?,
        });
        strip_nulls(&mut document);
        Ok(document)
    }

    /// Write the three bundle files into `dir`, creating it if needed
    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        fs::write(
            dir.join(TEMPLATE_FILE),
            serde_yaml::to_string(&self.template_document()?)?,
        )?;
        fs::write(
            dir.join(PARAMETER_VALUES_FILE),
            serde_yaml::to_string(&self.parameter_values_document()?)?,
        )?;
        fs::write(
            dir.join(ASSET_REFERENCES_FILE),
            serde_yaml::to_string(&self.asset_references.to_document())?,
        )?;

        info!(
            "Wrote job bundle \"{}\" to {}",
            self.template.name,
            dir.display()
        );
        Ok(())
    }

    /// Write into a new `<prefix>-<job name>-<timestamp>` directory under the
    /// configured output directory and return it
    pub fn create_in(&self, config: &BundleConfig) -> Result<PathBuf> {
        let base = format!(
            "{}-{}-{}",
            config.bundle_prefix,
            directory_safe_name(&self.template.name),
            Local::now().format("%Y-%m-%d-%H%M%S")
        );

        let mut dir = config.output_dir.join(&base);
        let mut suffix = 1;
        while dir.exists() {
            dir = config.output_dir.join(format!("{}-{}", base, suffix));
            suffix += 1;
        }

        self.write_to_dir(&dir)?;
        Ok(dir)
    }
}

/// Replace characters that are unsafe in directory names
fn directory_safe_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, StepActions, StepScript, StepTemplate, JOB_TEMPLATE_VERSION};
    use crate::open_job::parameter_value::ParameterValue;
    use tempfile::TempDir;

    fn bundle() -> JobBundle {
        let template = JobTemplate {
            specification_version: JOB_TEMPLATE_VERSION.to_string(),
            name: "Render: shot/010".to_string(),
            parameter_definitions: None,
            job_environments: None,
            steps: vec![StepTemplate {
                name: "Render".to_string(),
                description: None,
                parameter_space: None,
                step_environments: None,
                dependencies: None,
                host_requirements: None,
                script: StepScript {
                    actions: StepActions {
                        on_run: Action {
                            command: "render".to_string(),
                            args: None,
                            timeout: None,
                            cancelation: None,
                        },
                    },
                    embedded_files: None,
                },
            }],
        };
        let mut references = AssetReferences::default();
        references.input_filenames.insert("/b.txt".to_string());
        references.input_filenames.insert("/a.txt".to_string());
        JobBundle::new(
            template,
            vec![
                JobParameterValue::new("Frames", Some(ParameterValue::Int(3))),
                JobParameterValue::new("Empty", None),
            ],
            references,
        )
    }

    #[test]
    fn test_write_to_dir() {
        let dir = TempDir::new().unwrap();
        bundle().write_to_dir(dir.path()).unwrap();

        let template = fs::read_to_string(dir.path().join(TEMPLATE_FILE)).unwrap();
        assert!(template.starts_with("specificationVersion: jobtemplate-2023-09"));

        let values: serde_json::Value = serde_yaml::from_str(
            &fs::read_to_string(dir.path().join(PARAMETER_VALUES_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(values["parameterValues"][0]["value"], serde_json::json!(3));
        assert!(values["parameterValues"][1].get("value").is_none());

        let references: serde_json::Value = serde_yaml::from_str(
            &fs::read_to_string(dir.path().join(ASSET_REFERENCES_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(
            references["assetReferences"]["inputs"]["filenames"],
            serde_json::json!(["/a.txt", "/b.txt"])
        );
    }

    #[test]
    fn test_create_in_makes_unique_directories() {
        let dir = TempDir::new().unwrap();
        let config = BundleConfig {
            output_dir: dir.path().to_path_buf(),
            bundle_prefix: "OpenJob".to_string(),
        };
        let first = bundle().create_in(&config).unwrap();
        let second = bundle().create_in(&config).unwrap();

        assert_ne!(first, second);
        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("OpenJob-Render__shot_010-"));
        assert!(second.join(TEMPLATE_FILE).is_file());
    }
}
