//! Typed parameter values and the names the builder gives special meaning to.
//!
//! Templates store parameter defaults and task ranges as weakly typed YAML or
//! JSON scalars (`"3"`, `3`, `3.0`, `"/path"`). This module casts those into
//! [`ParameterValue`] according to the declared [`ParameterKind`] and writes
//! them back as native scalars, so an `INT` default stored as `"3"` is
//! emitted as `3`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{OpenJobError, Result};

/// The four primitive parameter kinds of a job template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParameterKind {
    #[serde(rename = "INT")]
    Int,
    #[serde(rename = "FLOAT")]
    Float,
    #[serde(rename = "STRING")]
    String,
    #[serde(rename = "PATH")]
    Path,
}

impl ParameterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterKind::Int => "INT",
            ParameterKind::Float => "FLOAT",
            ParameterKind::String => "STRING",
            ParameterKind::Path => "PATH",
        }
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterKind {
    type Err = OpenJobError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "INT" => Ok(ParameterKind::Int),
            "FLOAT" => Ok(ParameterKind::Float),
            "STRING" => Ok(ParameterKind::String),
            "PATH" => Ok(ParameterKind::Path),
            _ => Err(OpenJobError::UnknownParameterKind(s.to_string())),
        }
    }
}

/// A typed scalar parameter value
///
/// Serializes untagged, so integers and floats are written as numbers and
/// strings and paths as strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    String(String),
    Path(String),
}

impl ParameterValue {
    /// Cast a stored template scalar to the given kind.
    ///
    /// Integers accept integral numbers, floats (truncated) and numeric
    /// strings; values outside the `i64` range are rejected. Floats accept
    /// any finite number or numeric string. Strings and paths
    /// accept strings, numbers and booleans in their textual form. `null`,
    /// arrays and mappings are rejected; callers treat an absent value as
    /// "no default" before reaching this point.
    pub fn cast(name: &str, kind: ParameterKind, value: &serde_json::Value) -> Result<Self> {
        use serde_json::Value;

        let invalid = || OpenJobError::InvalidParameterValue {
            name: name.to_string(),
            kind,
            value: value.to_string(),
        };

        match kind {
            ParameterKind::Int => match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().and_then(float_to_i64))
                    .map(ParameterValue::Int)
                    .ok_or_else(invalid),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(ParameterValue::Int)
                    .map_err(|_| invalid()),
                _ => Err(invalid()),
            },
            ParameterKind::Float => match value {
                Value::Number(n) => n
                    .as_f64()
                    .filter(|f| f.is_finite())
                    .map(ParameterValue::Float)
                    .ok_or_else(invalid),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(ParameterValue::Float)
                    .ok_or_else(invalid),
                _ => Err(invalid()),
            },
            ParameterKind::String | ParameterKind::Path => {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return Err(invalid()),
                };
                Ok(if kind == ParameterKind::Path {
                    ParameterValue::Path(text)
                } else {
                    ParameterValue::String(text)
                })
            }
        }
    }

    /// Cast an optional stored value; `None` and `null` both mean no value.
    pub fn cast_optional(
        name: &str,
        kind: ParameterKind,
        value: Option<&serde_json::Value>,
    ) -> Result<Option<Self>> {
        match value {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(v) => Self::cast(name, kind, v).map(Some),
        }
    }

    /// Cast every element of a stored task range.
    pub fn cast_range(
        name: &str,
        kind: ParameterKind,
        values: &[serde_json::Value],
    ) -> Result<Vec<Self>> {
        values.iter().map(|v| Self::cast(name, kind, v)).collect()
    }

    pub fn kind(&self) -> ParameterKind {
        match self {
            ParameterValue::Int(_) => ParameterKind::Int,
            ParameterValue::Float(_) => ParameterKind::Float,
            ParameterValue::String(_) => ParameterKind::String,
            ParameterValue::Path(_) => ParameterKind::Path,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::String(s) | ParameterValue::Path(s) => Some(s),
            _ => None,
        }
    }

    /// The native JSON scalar this value is emitted as
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ParameterValue::Int(i) => serde_json::Value::from(*i),
            ParameterValue::Float(f) => serde_json::Value::from(*f),
            ParameterValue::String(s) | ParameterValue::Path(s) => {
                serde_json::Value::String(s.clone())
            }
        }
    }
}

/// Truncate toward zero; `None` when the result does not fit in an `i64`
fn float_to_i64(value: f64) -> Option<i64> {
    // 2^63 is exact as f64; i64::MAX is not.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    let truncated = value.trunc();
    (truncated >= -LIMIT && truncated < LIMIT).then_some(truncated as i64)
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Int(i) => write!(f, "{}", i),
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::String(s) | ParameterValue::Path(s) => f.write_str(s),
        }
    }
}

/// Parameter names the builder reads or fills in itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterName {
    // Job parameters
    ProjectFilePath,
    ExtraCmdArgs,
    PerforceStreamPath,
    PerforceChangelistNumber,

    // Render step task parameters
    QueueManifestPath,
    MoviePipelineQueuePath,
    LevelSequencePath,
    LevelPath,
    MrqJobConfigurationPath,
    OutputPath,
    Handler,
    ChunkSize,
    ChunkId,
}

impl ParameterName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterName::ProjectFilePath => "ProjectFilePath",
            ParameterName::ExtraCmdArgs => "ExtraCmdArgs",
            ParameterName::PerforceStreamPath => "PerforceStreamPath",
            ParameterName::PerforceChangelistNumber => "PerforceChangelistNumber",
            ParameterName::QueueManifestPath => "QueueManifestPath",
            ParameterName::MoviePipelineQueuePath => "MoviePipelineQueuePath",
            ParameterName::LevelSequencePath => "LevelSequencePath",
            ParameterName::LevelPath => "LevelPath",
            ParameterName::MrqJobConfigurationPath => "MrqJobConfigurationPath",
            ParameterName::OutputPath => "OutputPath",
            ParameterName::Handler => "Handler",
            ParameterName::ChunkSize => "ChunkSize",
            ParameterName::ChunkId => "ChunkId",
        }
    }

    /// Whether `name` is this parameter's name
    pub fn matches(&self, name: &str) -> bool {
        self.as_str() == name
    }
}

impl fmt::Display for ParameterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
