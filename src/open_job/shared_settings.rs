//! Job-wide scheduling settings appended to every bundle's parameter values.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::JobParameterValue;
use crate::open_job::parameter_value::ParameterValue;

pub const TARGET_TASK_RUN_STATUS: &str = "deadline:targetTaskRunStatus";
pub const MAX_FAILED_TASKS_COUNT: &str = "deadline:maxFailedTasksCount";
pub const MAX_RETRIES_PER_TASK: &str = "deadline:maxRetriesPerTask";
pub const PRIORITY: &str = "deadline:priority";

/// State a job's tasks enter on submission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InitialState {
    #[default]
    Ready,
    Suspended,
}

impl InitialState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InitialState::Ready => "READY",
            InitialState::Suspended => "SUSPENDED",
        }
    }
}

impl fmt::Display for InitialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobSharedSettings {
    pub initial_state: InitialState,
    pub max_failed_tasks_count: u32,
    pub max_retries_per_task: u32,
    pub priority: u32,
}

impl Default for JobSharedSettings {
    fn default() -> Self {
        JobSharedSettings {
            initial_state: InitialState::Ready,
            max_failed_tasks_count: 20,
            max_retries_per_task: 5,
            priority: 50,
        }
    }
}

impl JobSharedSettings {
    /// The four reserved parameter values, in a fixed order
    pub fn parameter_values(&self) -> Vec<JobParameterValue> {
        vec![
            JobParameterValue::new(
                TARGET_TASK_RUN_STATUS,
                Some(ParameterValue::String(self.initial_state.to_string())),
            ),
            JobParameterValue::new(
                MAX_FAILED_TASKS_COUNT,
                Some(ParameterValue::Int(i64::from(self.max_failed_tasks_count))),
            ),
            JobParameterValue::new(
                MAX_RETRIES_PER_TASK,
                Some(ParameterValue::Int(i64::from(self.max_retries_per_task))),
            ),
            JobParameterValue::new(
                PRIORITY,
                Some(ParameterValue::Int(i64::from(self.priority))),
            ),
        ]
    }
}
