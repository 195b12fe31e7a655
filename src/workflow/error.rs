use serde_json::{json, Value};

/// Domain failures raised by the workflow core.
///
/// Every variant carries the rule that was violated so the caller can tell
/// the user which guard stopped the transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Guard violated: {0}")]
    GuardViolation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

impl WorkflowError {
    pub fn validation(rule: impl Into<String>) -> Self {
        Self::Validation(rule.into())
    }

    pub fn guard(rule: impl Into<String>) -> Self {
        Self::GuardViolation(rule.into())
    }

    pub fn not_found(rule: impl Into<String>) -> Self {
        Self::NotFound(rule.into())
    }

    pub fn unauthorized(rule: impl Into<String>) -> Self {
        Self::Authorization(rule.into())
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::GuardViolation(_) => "guard_violation",
            Self::NotFound(_) => "not_found",
            Self::Authorization(_) => "authorization_error",
            Self::Conflict(_) => "conflict",
        }
    }

    /// The violated rule, without the kind prefix.
    pub fn rule(&self) -> &str {
        match self {
            Self::Validation(rule)
            | Self::GuardViolation(rule)
            | Self::NotFound(rule)
            | Self::Authorization(rule)
            | Self::Conflict(rule) => rule,
        }
    }

    pub fn details(&self) -> Value {
        json!({ "kind": self.kind(), "rule": self.rule() })
    }
}
