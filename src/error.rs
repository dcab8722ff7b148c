//! Error taxonomy for a generation run.
//!
//! Every fatal class aborts the run before (or instead of) writing output.
//! Argument mapping problems are not errors: they travel next to the
//! normalized operations as [`ArgumentMappingWarning`] values.
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::lower::ContractViolation;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// native registry unavailable, unreadable or misconfigured
    #[error("registry discovery failed: {0}")]
    Discovery(String),

    /// introspected metadata is malformed (duplicate names, cyclic hierarchy, ...)
    #[error("malformed registry metadata: {0}")]
    Schema(String),

    /// one or more template units failed to load or render
    #[error("template rendering failed: {}", join_failures(.0))]
    Template(Vec<TemplateFailure>),

    /// a normalized operation violates the layered binding contract
    #[error("binding contract violated: {0}")]
    Contract(#[from] ContractViolation),

    /// rendered units disagree with each other
    #[error("generated output is inconsistent: {0}")]
    Consistency(String),

    #[error("i/o error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("deadline of {}s exceeded during {stage}", budget.as_secs())]
    Deadline { stage: &'static str, budget: Duration },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    pub fn template(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Template(vec![TemplateFailure {
            unit: unit.into(),
            message: message.into(),
        }])
    }

    /// The pipeline stage this error belongs to, for the terminating message.
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Discovery(_) => "discovery",
            Error::Schema(_) => "normalization",
            Error::Template(_) => "rendering",
            Error::Contract(_) | Error::Consistency(_) => "consistency check",
            Error::Io { .. } => "output",
            Error::Deadline { stage, .. } => *stage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFailure {
    pub unit: String,
    pub message: String,
}

impl fmt::Display for TemplateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`: {}", self.unit, self.message)
    }
}

fn join_failures(failures: &[TemplateFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ————————————————————————————————————————————————————————————————————————————
// NON-FATAL
// ————————————————————————————————————————————————————————————————————————————

/// Why a single argument was left out of its operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", content = "detail", rename_all = "snake_case")]
pub enum MappingIssue {
    Deprecated,
    NoDirection,
    UnsupportedType(String),
    UnrepresentableDefault(String),
}

impl fmt::Display for MappingIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingIssue::Deprecated => write!(f, "argument is deprecated"),
            MappingIssue::NoDirection => write!(f, "argument is neither input nor output"),
            MappingIssue::UnsupportedType(ty) => write!(f, "unsupported type `{ty}`"),
            MappingIssue::UnrepresentableDefault(why) => {
                write!(f, "default value cannot be expressed as a literal: {why}")
            }
        }
    }
}

/// A dropped argument. Generation of the owning operation continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgumentMappingWarning {
    pub operation: String,
    pub argument: String,
    pub type_name: String,
    pub issue: MappingIssue,
}

impl fmt::Display for ArgumentMappingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: dropped argument `{}` ({}): {}",
            self.operation, self.argument, self.type_name, self.issue
        )
    }
}
