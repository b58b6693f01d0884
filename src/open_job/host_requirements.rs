//! Worker host requirements of a step.
//!
//! User-facing settings (operating system, CPU architecture, and integer
//! intervals for CPUs, memory, GPUs and scratch space) are translated into the
//! generic attribute and amount lists the scheduler understands. Sizes given
//! in GiB are emitted in MiB.

use serde::{Deserialize, Serialize};

use crate::errors::{OpenJobError, Result};
use crate::models::{AmountRequirement, AttributeRequirement, HostRequirementsModel};

pub const OS_FAMILY: &str = "attr.worker.os.family";
pub const CPU_ARCH: &str = "attr.worker.cpu.arch";
pub const VCPU: &str = "amount.worker.vcpu";
pub const MEMORY: &str = "amount.worker.memory";
pub const GPU: &str = "amount.worker.gpu";
pub const GPU_MEMORY: &str = "amount.worker.gpu.memory";
pub const DISK_SCRATCH: &str = "amount.worker.disk.scratch";

/// GiB to MiB
const GIB: i64 = 1024;

/// Closed integer interval; `0` on either end means unbounded on that end
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Interval {
    pub min: i64,
    pub max: i64,
}

impl Interval {
    pub fn new(min: i64, max: i64) -> Self {
        Interval { min, max }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostRequirements {
    /// Run on every worker; no requirements are emitted
    pub run_on_all_worker_nodes: bool,
    pub operating_system: Option<String>,
    pub cpu_architecture: Option<String>,
    pub cpus: Interval,
    pub cpu_memory_gb: Interval,
    pub gpus: Interval,
    pub gpu_memory_gb: Interval,
    pub scratch_space_gb: Interval,
}

impl Default for HostRequirements {
    fn default() -> Self {
        HostRequirements {
            run_on_all_worker_nodes: true,
            operating_system: None,
            cpu_architecture: None,
            cpus: Interval::default(),
            cpu_memory_gb: Interval::default(),
            gpus: Interval::default(),
            gpu_memory_gb: Interval::default(),
            scratch_space_gb: Interval::default(),
        }
    }
}

impl HostRequirements {
    /// Translate to attribute and amount lists.
    ///
    /// Each list is present only when it has at least one entry, so at most
    /// two top-level keys are produced. Fails when a scaled bound does not
    /// fit in an `i64`.
    pub fn as_requirements(&self) -> Result<HostRequirementsModel> {
        let mut attributes = Vec::new();
        if let Some(os) = self.operating_system.as_deref().filter(|s| !s.is_empty()) {
            attributes.push(AttributeRequirement {
                name: OS_FAMILY.to_string(),
                any_of: Some(vec![os.to_string()]),
                all_of: None,
            });
        }
        if let Some(arch) = self.cpu_architecture.as_deref().filter(|s| !s.is_empty()) {
            attributes.push(AttributeRequirement {
                name: CPU_ARCH.to_string(),
                any_of: Some(vec![arch.to_string()]),
                all_of: None,
            });
        }

        let amounts: Vec<AmountRequirement> = [
            get_amount_requirement(self.cpus, VCPU, 1)?,
            get_amount_requirement(self.cpu_memory_gb, MEMORY, GIB)?,
            get_amount_requirement(self.gpus, GPU, 1)?,
            get_amount_requirement(self.gpu_memory_gb, GPU_MEMORY, GIB)?,
            get_amount_requirement(self.scratch_space_gb, DISK_SCRATCH, GIB)?,
        ]
        .into_iter()
        .flatten()
        .collect();

        Ok(HostRequirementsModel {
            attributes: (!attributes.is_empty()).then_some(attributes),
            amounts: (!amounts.is_empty()).then_some(amounts),
        })
    }

    /// The block to place on a step, if any
    pub fn step_requirements(&self) -> Result<Option<HostRequirementsModel>> {
        if self.run_on_all_worker_nodes {
            return Ok(None);
        }
        let requirements = self.as_requirements()?;
        Ok((!requirements.is_empty()).then_some(requirements))
    }
}

/// Scale an interval into an amount entry.
///
/// A bound of zero or less omits that end; an interval with neither end
/// positive produces nothing.
pub fn get_amount_requirement(
    interval: Interval,
    name: &str,
    scale: i64,
) -> Result<Option<AmountRequirement>> {
    let min = scale_bound(interval.min, name, scale)?;
    let max = scale_bound(interval.max, name, scale)?;
    if min.is_none() && max.is_none() {
        return Ok(None);
    }
    Ok(Some(AmountRequirement {
        name: name.to_string(),
        min,
        max,
    }))
}

fn scale_bound(bound: i64, name: &str, scale: i64) -> Result<Option<i64>> {
    if bound <= 0 {
        return Ok(None);
    }
    bound
        .checked_mul(scale)
        .map(Some)
        .ok_or_else(|| OpenJobError::InvalidHostRequirements {
            name: name.to_string(),
            message: format!("bound {} overflows when scaled by {}", bound, scale),
        })
}

/// Whether a raw amount entry is well formed: a `name` and at least one
/// numeric bound
pub fn amount_requirement_is_valid(requirement: &serde_json::Value) -> bool {
    let Some(entry) = requirement.as_object() else {
        return false;
    };
    if !entry.get("name").is_some_and(|n| n.is_string()) {
        return false;
    }
    let bounds: Vec<&serde_json::Value> = ["min", "max"]
        .iter()
        .filter_map(|key| entry.get(*key))
        .collect();
    !bounds.is_empty() && bounds.iter().all(|b| b.is_number())
}
