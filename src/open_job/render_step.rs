//! Render step specialization.
//!
//! A render step needs one of three argument shapes among its task
//! parameters, splits the enabled shots of its render intent into chunks, and
//! fills in the parameters that only the builder can know: the chunk ids, the
//! adaptor handler and, for manifest-driven renders, the manifest path.

use std::cell::OnceCell;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info};

use crate::errors::{OpenJobError, Result};
use crate::open_job::parameter_value::{ParameterName, ParameterValue};
use crate::open_job::render_intent::{enabled_shot_names, RenderIntent};
use crate::open_job::step::StepParameter;

/// Adaptor handler every render task runs
pub const RENDER_HANDLER: &str = "render";

/// Where a render step takes its render arguments from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderArgumentsType {
    QueueManifestPath,
    QueueAsset,
    RenderData,
    NotSet,
}

/// Inspect the parameter names, highest priority first
pub fn render_arguments_type(parameters: &[StepParameter]) -> RenderArgumentsType {
    let has = |name: ParameterName| parameters.iter().any(|p| name.matches(&p.name));

    if has(ParameterName::QueueManifestPath) {
        RenderArgumentsType::QueueManifestPath
    } else if has(ParameterName::MoviePipelineQueuePath) {
        RenderArgumentsType::QueueAsset
    } else if has(ParameterName::LevelSequencePath)
        && has(ParameterName::LevelPath)
        && has(ParameterName::MrqJobConfigurationPath)
    {
        RenderArgumentsType::RenderData
    } else {
        RenderArgumentsType::NotSet
    }
}

/// First value of the `ChunkSize` range, or 1 when absent or not positive
pub fn chunk_size(parameters: &[StepParameter]) -> i64 {
    parameters
        .iter()
        .find(|p| ParameterName::ChunkSize.matches(&p.name))
        .and_then(|p| p.range.first())
        .and_then(ParameterValue::as_i64)
        .filter(|size| *size > 0)
        .unwrap_or(1)
}

/// Number of chunks needed to cover `shots` with chunks of `chunk_size`
pub fn chunk_count(shots: usize, chunk_size: i64) -> usize {
    let size = usize::try_from(chunk_size).unwrap_or(1).max(1);
    shots.div_ceil(size)
}

/// Task ids `0..chunk_count`
pub fn chunk_ids(shots: usize, chunk_size: i64) -> Vec<ParameterValue> {
    (0..chunk_count(shots, chunk_size))
        .map(|id| ParameterValue::Int(id as i64))
        .collect()
}

/// Replace the range of the parameter called `name`, if present
fn update_parameter_range(parameters: &mut [StepParameter], name: ParameterName, range: Vec<ParameterValue>) {
    if let Some(parameter) = parameters.iter_mut().find(|p| name.matches(&p.name)) {
        debug!("Set render parameter {} to {:?}", name, range);
        parameter.range = range;
    }
}

/// Render-only state carried by a render step
#[derive(Debug, Clone, Default)]
pub(crate) struct RenderStepState {
    intent: Option<Arc<dyn RenderIntent>>,
    queue_manifest_path: OnceCell<PathBuf>,
}

impl RenderStepState {
    pub(crate) fn new(intent: Option<Arc<dyn RenderIntent>>) -> Self {
        RenderStepState {
            intent,
            queue_manifest_path: OnceCell::new(),
        }
    }

    pub(crate) fn intent(&self) -> Option<&Arc<dyn RenderIntent>> {
        self.intent.as_ref()
    }

    pub(crate) fn set_intent(&mut self, intent: Arc<dyn RenderIntent>) {
        self.intent = Some(intent);
    }

    pub(crate) fn queue_manifest_path(&self) -> Option<&PathBuf> {
        self.queue_manifest_path.get()
    }

    fn require_intent(&self, step_name: &str) -> Result<&Arc<dyn RenderIntent>> {
        self.intent.as_ref().ok_or_else(|| {
            OpenJobError::MissingDependencyData(format!(
                "Render step \"{}\" has no render intent",
                step_name
            ))
        })
    }

    /// Save the manifest on first use and reuse its path afterwards
    fn manifest_path(&self, step_name: &str) -> Result<PathBuf> {
        if let Some(path) = self.queue_manifest_path.get() {
            return Ok(path.clone());
        }
        let path = self.require_intent(step_name)?.save_manifest_file()?;
        info!(
            "Render step \"{}\" queue manifest saved to {}",
            step_name,
            path.display()
        );
        Ok(self.queue_manifest_path.get_or_init(|| path).clone())
    }

    /// Derive the render parameters on a copy of `parameters`.
    ///
    /// Fails before writing anything when no argument shape is present.
    pub(crate) fn resolve_parameters(
        &self,
        step_name: &str,
        parameters: &[StepParameter],
    ) -> Result<Vec<StepParameter>> {
        let arguments_type = render_arguments_type(parameters);
        if arguments_type == RenderArgumentsType::NotSet {
            return Err(OpenJobError::RenderArgumentsTypeNotSet(step_name.to_string()));
        }
        debug!(
            "Render step \"{}\" arguments type: {:?}",
            step_name, arguments_type
        );

        let intent = self.require_intent(step_name)?;
        let mut resolved = parameters.to_vec();

        let shots = enabled_shot_names(intent.as_ref()).len();
        let ids = chunk_ids(shots, chunk_size(parameters));
        info!(
            "Render step \"{}\": {} enabled shots in {} chunks",
            step_name,
            shots,
            ids.len()
        );
        update_parameter_range(&mut resolved, ParameterName::ChunkId, ids);

        update_parameter_range(
            &mut resolved,
            ParameterName::Handler,
            vec![ParameterValue::String(RENDER_HANDLER.to_string())],
        );

        if let Some(output_path) = intent.output_path() {
            update_parameter_range(
                &mut resolved,
                ParameterName::OutputPath,
                vec![ParameterValue::Path(output_path)],
            );
        }

        if arguments_type == RenderArgumentsType::QueueManifestPath {
            let manifest = self.manifest_path(step_name)?;
            update_parameter_range(
                &mut resolved,
                ParameterName::QueueManifestPath,
                vec![ParameterValue::Path(manifest.to_string_lossy().into_owned())],
            );
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_job::parameter_value::ParameterKind;
    use crate::open_job::render_intent::{ShotInfo, StaticRenderIntent};
    use rstest::rstest;
    use tempfile::TempDir;

    fn parameter(name: &str, kind: ParameterKind) -> StepParameter {
        StepParameter::new(name, kind, Vec::new())
    }

    fn intent(shots: usize, dir: &TempDir) -> Arc<dyn RenderIntent> {
        Arc::new(StaticRenderIntent {
            shots: (0..shots)
                .map(|i| ShotInfo::new(format!("shot_{:03}", i), true))
                .collect(),
            output_path: Some("/renders/out".to_string()),
            manifest: "manifest".to_string(),
            manifest_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        })
    }

    #[rstest]
    #[case(1, 15, 15)]
    #[case(2, 15, 8)]
    #[case(5, 29, 6)]
    #[case(6, 36, 6)]
    #[case(100000, 100, 1)]
    fn test_chunk_ids(#[case] size: i64, #[case] shots: usize, #[case] expected: usize) {
        let ids = chunk_ids(shots, size);
        assert_eq!(ids.len(), expected);
        assert_eq!(ids.first(), Some(&ParameterValue::Int(0)));
        assert_eq!(ids.last(), Some(&ParameterValue::Int(expected as i64 - 1)));
    }

    #[test]
    fn test_chunk_ids_without_shots() {
        assert!(chunk_ids(0, 10).is_empty());
    }

    #[rstest]
    #[case(vec![], 1)]
    #[case(vec![ParameterValue::Int(0)], 1)]
    #[case(vec![ParameterValue::Int(-3)], 1)]
    #[case(vec![ParameterValue::Int(4)], 4)]
    fn test_chunk_size_defaults(#[case] range: Vec<ParameterValue>, #[case] expected: i64) {
        let parameters = vec![StepParameter::new("ChunkSize", ParameterKind::Int, range)];
        assert_eq!(chunk_size(&parameters), expected);
    }

    #[rstest]
    #[case(vec!["QueueManifestPath", "MoviePipelineQueuePath"], RenderArgumentsType::QueueManifestPath)]
    #[case(vec!["MoviePipelineQueuePath", "LevelPath"], RenderArgumentsType::QueueAsset)]
    #[case(vec!["LevelSequencePath", "LevelPath", "MrqJobConfigurationPath"], RenderArgumentsType::RenderData)]
    #[case(vec!["LevelSequencePath", "LevelPath"], RenderArgumentsType::NotSet)]
    #[case(vec![], RenderArgumentsType::NotSet)]
    fn test_render_arguments_type(
        #[case] names: Vec<&str>,
        #[case] expected: RenderArgumentsType,
    ) {
        let parameters: Vec<StepParameter> = names
            .into_iter()
            .map(|n| parameter(n, ParameterKind::Path))
            .collect();
        assert_eq!(render_arguments_type(&parameters), expected);
    }

    #[test]
    fn test_not_set_fails_before_manifest_is_written() {
        let dir = TempDir::new().unwrap();
        let state = RenderStepState::new(Some(intent(3, &dir)));
        let err = state
            .resolve_parameters("Render", &[parameter("ChunkId", ParameterKind::Int)])
            .unwrap_err();
        assert!(matches!(err, OpenJobError::RenderArgumentsTypeNotSet(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_intent() {
        let state = RenderStepState::default();
        let err = state
            .resolve_parameters(
                "Render",
                &[parameter("MoviePipelineQueuePath", ParameterKind::Path)],
            )
            .unwrap_err();
        assert!(matches!(err, OpenJobError::MissingDependencyData(_)));
    }

    #[test]
    fn test_resolve_manifest_parameters() {
        let dir = TempDir::new().unwrap();
        let state = RenderStepState::new(Some(intent(5, &dir)));
        let parameters = vec![
            parameter("QueueManifestPath", ParameterKind::Path),
            StepParameter::new("ChunkSize", ParameterKind::Int, vec![ParameterValue::Int(2)]),
            StepParameter::new("ChunkId", ParameterKind::Int, vec![ParameterValue::Int(99)]),
            parameter("Handler", ParameterKind::String),
            parameter("OutputPath", ParameterKind::Path),
        ];

        let resolved = state.resolve_parameters("Render", &parameters).unwrap();
        let range = |name: &str| {
            resolved
                .iter()
                .find(|p| p.name == name)
                .map(|p| p.range.clone())
                .unwrap()
        };

        assert_eq!(
            range("ChunkId"),
            vec![
                ParameterValue::Int(0),
                ParameterValue::Int(1),
                ParameterValue::Int(2)
            ]
        );
        assert_eq!(
            range("Handler"),
            vec![ParameterValue::String("render".to_string())]
        );
        assert_eq!(
            range("OutputPath"),
            vec![ParameterValue::Path("/renders/out".to_string())]
        );
        let manifest = state.queue_manifest_path().unwrap().clone();
        assert_eq!(
            range("QueueManifestPath"),
            vec![ParameterValue::Path(manifest.to_string_lossy().into_owned())]
        );

        // The manifest is written once per step.
        state.resolve_parameters("Render", &parameters).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(parameters[2].range, vec![ParameterValue::Int(99)]);
    }
}
