//! Parameter consistency between a template and caller-supplied overrides.
//!
//! A template declares a set of `(name, kind)` pairs; the caller supplies
//! another. The two are consistent when their symmetric difference is empty.
//! Checking and fixing are separate operations: building an entity only ever
//! checks, and [`fix_consistency`] must be invoked explicitly.
//!
//! The same functions serve three granularities: job parameters and step task
//! parameters keyed by name and kind, and environment variables keyed by name
//! with the fixed [`VARIABLE_KIND`] tag.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::{info, warn};

/// A `(name, kind)` pair compared by the checker
pub type ParameterKey = (String, String);

/// Kind tag used for environment variables, which have no declared type
pub const VARIABLE_KIND: &str = "VARIABLE";

pub const CONSENSUAL_REASON: &str = "Parameters are consensual";

/// Anything that can take part in a consistency check
pub trait ConsistencyItem {
    fn name(&self) -> &str;

    fn consistency_key(&self) -> ParameterKey;
}

/// Verdict of a consistency check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyCheckResult {
    pub passed: bool,
    pub reason: String,
}

impl ConsistencyCheckResult {
    pub fn consensual() -> Self {
        ConsistencyCheckResult {
            passed: true,
            reason: CONSENSUAL_REASON.to_string(),
        }
    }

    /// Prefix the reason with the owning entity, e.g. `OpenJob Step "Render": `
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.reason = format!("{}{}", prefix, self.reason);
        self
    }
}

impl fmt::Display for ConsistencyCheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConsistencyCheckResult: {}; {}", self.passed, self.reason)
    }
}

/// Set difference in both directions.
///
/// Returns `(missing_in_left, missing_in_right)`: the pairs of `right` absent
/// from `left`, and the pairs of `left` absent from `right`. Each side is
/// deduplicated and sorted.
pub fn symmetric_difference(
    left: &[ParameterKey],
    right: &[ParameterKey],
) -> (Vec<ParameterKey>, Vec<ParameterKey>) {
    let left: BTreeSet<&ParameterKey> = left.iter().collect();
    let right: BTreeSet<&ParameterKey> = right.iter().collect();

    let missing_in_left = right.difference(&left).map(|k| (*k).clone()).collect();
    let missing_in_right = left.difference(&right).map(|k| (*k).clone()).collect();
    (missing_in_left, missing_in_right)
}

fn describe(keys: &[ParameterKey]) -> String {
    keys.iter()
        .map(|(name, kind)| format!("{} ({})", name, kind))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Compare template-declared pairs against caller-supplied pairs.
///
/// Fails when the caller supplies a pair the template does not declare, or the
/// template declares one the caller does not supply. A name present on both
/// sides with different kinds shows up in both clauses.
pub fn check_consistency(
    template: &[ParameterKey],
    data: &[ParameterKey],
) -> ConsistencyCheckResult {
    let (missing_in_template, missing_in_data) = symmetric_difference(template, data);

    let mut reasons = Vec::new();

    if !missing_in_template.is_empty() {
        let message = format!(
            "Data's parameters missing in template: {}",
            describe(&missing_in_template)
        );
        warn!("{}", message);
        reasons.push(message);
    }

    if !missing_in_data.is_empty() {
        let message = format!(
            "Template's parameters missing in data: {}",
            describe(&missing_in_data)
        );
        warn!("{}", message);
        reasons.push(message);
    }

    let result = if reasons.is_empty() {
        ConsistencyCheckResult::consensual()
    } else {
        ConsistencyCheckResult {
            passed: false,
            reason: reasons.join("\n"),
        }
    };

    info!("{}", result);
    result
}

/// Merge template and caller lists into a consistent one.
///
/// Keeps every caller entry the template also declares, then adds every
/// template entry the caller is missing (with the template's own default).
/// Caller values win wherever both sides declare a pair. The result is sorted
/// by name.
pub fn fix_consistency<T>(
    missing_in_template: &[ParameterKey],
    missing_in_data: &[ParameterKey],
    template: &[T],
    data: &[T],
) -> Vec<T>
where
    T: ConsistencyItem + Clone,
{
    info!("Fixing parameters missing in template: {:?}", missing_in_template);
    info!("Fixing parameters missing in data: {:?}", missing_in_data);

    let mut fixed: Vec<T> = data
        .iter()
        .filter(|p| !missing_in_template.contains(&p.consistency_key()))
        .cloned()
        .collect();

    fixed.extend(
        template
            .iter()
            .filter(|p| missing_in_data.contains(&p.consistency_key()))
            .cloned(),
    );

    fixed.sort_by(|a, b| a.name().cmp(b.name()));
    info!(
        "Fixed parameters: {:?}",
        fixed.iter().map(|p| p.name()).collect::<Vec<_>>()
    );
    fixed
}

/// Variable-mapping counterpart of [`fix_consistency`]
pub fn fix_variables_consistency(
    missing_in_template: &[ParameterKey],
    missing_in_data: &[ParameterKey],
    template: &BTreeMap<String, String>,
    data: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    info!("Fixing variables missing in template: {:?}", missing_in_template);
    info!("Fixing variables missing in data: {:?}", missing_in_data);

    let mut fixed: BTreeMap<String, String> = data
        .iter()
        .filter(|(key, _)| !missing_in_template.contains(&variable_key(key)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    for (key, value) in template {
        if missing_in_data.contains(&variable_key(key)) {
            fixed.insert(key.clone(), value.clone());
        }
    }

    info!("Fixed variables: {:?}", fixed);
    fixed
}

pub fn parameter_keys<T: ConsistencyItem>(items: &[T]) -> Vec<ParameterKey> {
    items.iter().map(ConsistencyItem::consistency_key).collect()
}

pub fn variable_key(name: &str) -> ParameterKey {
    (name.to_string(), VARIABLE_KIND.to_string())
}

pub fn variable_keys<'a>(names: impl IntoIterator<Item = &'a String>) -> Vec<ParameterKey> {
    names.into_iter().map(|k| variable_key(k)).collect()
}
