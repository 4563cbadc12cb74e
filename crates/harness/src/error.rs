//! Error types for the verification harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("session launch failed: {0}")]
    Launch(String),

    #[error("element not found for {spec} (tried: {})", tried.join(", "))]
    ElementNotFound { spec: String, tried: Vec<String> },

    #[error("element not interactable: {0}")]
    Action(String),

    #[error("assertion failed: expected {expected}, observed {observed}")]
    AssertionFailed { expected: String, observed: String },

    #[error("timed out waiting for: {0}")]
    Timeout(String),

    #[error("browser driver error: {0}")]
    Driver(String),

    #[error("scenario parse error: {0}")]
    SpecParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl HarnessError {
    /// Short kind tag used in step outcomes and the summary table.
    pub fn kind(&self) -> &'static str {
        match self {
            HarnessError::Launch(_) => "launch",
            HarnessError::ElementNotFound { .. } => "element_not_found",
            HarnessError::Action(_) => "action",
            HarnessError::AssertionFailed { .. } => "assertion_failed",
            HarnessError::Timeout(_) => "timeout",
            HarnessError::Driver(_) => "driver",
            HarnessError::SpecParse(_) => "spec_parse",
            HarnessError::Io(_) => "io",
            HarnessError::Json(_) => "json",
            HarnessError::Yaml(_) => "yaml",
        }
    }

    /// Whether this error should fail only the current step's scenario,
    /// rather than bubbling out of the executor as a harness fault.
    pub fn is_step_failure(&self) -> bool {
        matches!(
            self,
            HarnessError::ElementNotFound { .. }
                | HarnessError::Action(_)
                | HarnessError::AssertionFailed { .. }
                | HarnessError::Timeout(_)
        )
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
