//! Errors raised while loading templates and building job descriptions.
//!
//! Every failure is raised where it is detected and propagated unchanged to
//! the caller. Nothing in this crate catches one of these and substitutes a
//! default.

use std::path::PathBuf;

use thiserror::Error;

use crate::open_job::parameter_value::ParameterKind;

pub type Result<T> = std::result::Result<T, OpenJobError>;

#[derive(Debug, Error)]
pub enum OpenJobError {
    /// The template file does not exist at load time.
    #[error("Descriptor file \"{}\" not found", .0.display())]
    TemplateNotFound(PathBuf),

    /// Template-declared and caller-supplied parameter sets diverge.
    /// The message is already prefixed with the owning entity.
    #[error("{0}")]
    ParametersInconsistent(String),

    #[error(
        "Render step \"{0}\" parameters are not valid. Expect at least one of the following:\n\
         - QueueManifestPath\n\
         - MoviePipelineQueuePath\n\
         - LevelSequencePath, LevelPath, MrqJobConfigurationPath"
    )]
    RenderArgumentsTypeNotSet(String),

    #[error("Render job must have exactly one render step, found {0}")]
    RenderStepCountConstraint(usize),

    /// Data required to derive a value is missing, e.g. a render step without
    /// its render intent.
    #[error("{0}")]
    MissingDependencyData(String),

    #[error("Unable to detect files transfer strategy: {0}")]
    FilesTransferStrategyAmbiguous(String),

    #[error("OpenJob Step \"{step}\" depends on unknown step \"{dependency}\"")]
    UnknownStepDependency { step: String, dependency: String },

    #[error("Parameter \"{name}\" value {value} can not be cast to {kind}")]
    InvalidParameterValue {
        name: String,
        kind: ParameterKind,
        value: String,
    },

    #[error("Unknown parameter type \"{0}\"")]
    UnknownParameterKind(String),

    #[error("Invalid host requirement \"{name}\": {message}")]
    InvalidHostRequirements { name: String, message: String },

    #[error("Invalid template \"{}\": {message}", path.display())]
    InvalidTemplate { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("JSON5 error: {0}")]
    Json5(#[from] json5::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl OpenJobError {
    pub(crate) fn invalid_template(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        OpenJobError::InvalidTemplate {
            path: path.into(),
            message: message.into(),
        }
    }
}
