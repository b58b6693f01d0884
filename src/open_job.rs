//! Open Job Description entities and the job bundle builder.
//!
//! A job is assembled from file-backed templates. Each [`OpenJob`],
//! [`OpenJobStep`] and [`OpenJobEnvironment`] pairs a template with
//! caller-supplied overrides; building one checks the overrides against the
//! template and then produces the resolved model from [`crate::models`].
//!
//! ```no_run
//! use openjob_builder::open_job::{JobOptions, OpenJob, OpenJobEntityBuild};
//!
//! let job = OpenJob::new("job_template.yml", JobOptions::default())?;
//! let bundle = job.build_bundle()?;
//! bundle.write_to_dir("bundle")?;
//! # Ok::<(), openjob_builder::OpenJobError>(())
//! ```

pub mod bundle;
pub mod consistency;
pub mod entity;
pub mod environment;
pub mod host_requirements;
pub mod job;
pub mod parameter_value;
pub mod render_intent;
pub mod render_step;
pub mod shared_settings;
pub mod step;
pub mod submission;

pub use bundle::JobBundle;
pub use consistency::{ConsistencyCheckResult, ConsistencyItem};
pub use entity::{MissingTemplatePolicy, OpenJobEntity, OpenJobEntityBuild, TemplateClass};
pub use environment::{
    EnvironmentKind, EnvironmentOptions, FilesTransferStrategy, OpenJobEnvironment,
    RevisionControlState,
};
pub use host_requirements::{HostRequirements, Interval};
pub use job::{JobOptions, JobParameter, OpenJob};
pub use parameter_value::{ParameterKind, ParameterName, ParameterValue};
pub use render_intent::{RenderIntent, ShotInfo, StaticRenderIntent};
pub use render_step::RenderArgumentsType;
pub use shared_settings::{InitialState, JobSharedSettings};
pub use step::{OpenJobStep, StepKind, StepOptions, StepParameter};
pub use submission::SubmissionSpec;
