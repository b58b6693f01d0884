#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use openjob_builder::open_job::{
    ParameterKind, ParameterValue, RenderIntent, ShotInfo, StaticRenderIntent, StepParameter,
};
use rstest::fixture;
use tempfile::TempDir;

pub const JOB_TEMPLATE: &str = r#"
specificationVersion: jobtemplate-2023-09
name: RenderJob
parameterDefinitions:
  - name: ProjectFilePath
    type: PATH
    objectType: FILE
    dataFlow: IN
    default: ""
  - name: ExtraCmdArgs
    type: STRING
    default: "-log"
  - name: ChunkCount
    type: INT
    default: "3"
steps: []
"#;

pub const STEP_TEMPLATE: &str = r#"
name: Process
description: Run the processing script
parameterSpace:
  taskParameterDefinitions:
    - name: Frame
      type: INT
      range: [1, 2, 3]
    - name: Camera
      type: STRING
      range: ["main"]
script:
  actions:
    onRun:
      command: python
      args: ["process.py", "{{Task.Param.Frame}}", "{{Task.Param.Camera}}"]
"#;

pub const RENDER_STEP_TEMPLATE: &str = r#"
name: Render
parameterSpace:
  taskParameterDefinitions:
    - name: QueueManifestPath
      type: PATH
      range: [""]
    - name: ChunkSize
      type: INT
      range: [1]
    - name: ChunkId
      type: INT
      range: [0]
    - name: Handler
      type: STRING
      range: ["render"]
    - name: OutputPath
      type: PATH
      range: [""]
script:
  actions:
    onRun:
      command: unreal-openjd
      args: ["run", "--handler", "{{Task.Param.Handler}}", "--chunk", "{{Task.Param.ChunkId}}"]
"#;

pub const ENVIRONMENT_TEMPLATE: &str = r#"
name: LaunchEditor
description: Launch the editor once per session
script:
  actions:
    onEnter:
      command: unreal-openjd
      args: ["daemon", "start"]
    onExit:
      command: unreal-openjd
      args: ["daemon", "stop"]
variables:
  REMOTE_EXECUTION: "True"
"#;

pub const UGS_ENVIRONMENT_TEMPLATE: &str = r#"
name: UGS Sync
script:
  actions:
    onEnter:
      command: ugs-sync
"#;

pub const P4_ENVIRONMENT_TEMPLATE: &str = r#"
name: P4 Sync
script:
  actions:
    onEnter:
      command: p4-sync
"#;

/// A temporary templates directory holding the default templates
pub struct Templates {
    pub dir: TempDir,
}

impl Templates {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    pub fn job(&self) -> PathBuf {
        self.path("job_template.yml")
    }

    pub fn step(&self) -> PathBuf {
        self.path("step_template.yml")
    }

    pub fn render_step(&self) -> PathBuf {
        self.path("render_step.yml")
    }

    pub fn environment(&self) -> PathBuf {
        self.path("environment_template.yml")
    }

    pub fn manifests(&self) -> PathBuf {
        self.path("manifests")
    }
}

#[fixture]
pub fn templates() -> Templates {
    let templates = Templates {
        dir: TempDir::new().unwrap(),
    };
    templates.write("job_template.yml", JOB_TEMPLATE);
    templates.write("step_template.yml", STEP_TEMPLATE);
    templates.write("render_step.yml", RENDER_STEP_TEMPLATE);
    templates.write("environment_template.yml", ENVIRONMENT_TEMPLATE);
    templates.write(
        "environments/ugs_sync_cmf_environment.yml",
        UGS_ENVIRONMENT_TEMPLATE,
    );
    templates.write(
        "environments/p4_sync_environment.yml",
        P4_ENVIRONMENT_TEMPLATE,
    );
    templates
}

/// Static intent with `shots` enabled shots plus one disabled shot
pub fn static_intent(templates: &Templates, shots: usize) -> StaticRenderIntent {
    let mut all: Vec<ShotInfo> = (0..shots)
        .map(|i| ShotInfo::new(format!("shot_{:03}", i * 10), true))
        .collect();
    all.push(ShotInfo::new("disabled", false));
    StaticRenderIntent {
        job_name: Some("IntentJob".to_string()),
        shots: all,
        output_path: Some("/renders/demo".to_string()),
        manifest: "Begin Object Class=MoviePipelineQueue\nEnd Object\n".to_string(),
        manifest_dir: Some(templates.manifests()),
        project_file_path: Some("/projects/Demo/Demo.uproject".to_string()),
        extra_cmd_args: vec!["-unattended".to_string()],
        ..Default::default()
    }
}

pub fn render_intent(templates: &Templates, shots: usize) -> Arc<dyn RenderIntent> {
    Arc::new(static_intent(templates, shots))
}

pub fn int_parameter(name: &str, values: &[i64]) -> StepParameter {
    StepParameter::new(
        name,
        ParameterKind::Int,
        values.iter().map(|v| ParameterValue::Int(*v)).collect(),
    )
}

pub fn variables(pairs: &[(&str, &str)]) -> std::collections::BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
