//! Unified engine error model and mapping helpers.
//! Every public operation returns `EngineResult<T>`; the web layer maps the
//! variants to a status code through `http_status`.

use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad or missing metadata: no storage location, unknown column, undeclared join.
    #[error("configuration error ({subject}) in workflow '{workflow_id}': {message}")]
    Configuration { workflow_id: String, subject: String, message: String },

    /// The metadata or join-catalog collaborator was unreachable or returned garbage.
    #[error("lookup failed ({subject}) in workflow '{workflow_id}': {message}")]
    Lookup { workflow_id: String, subject: String, message: String },

    /// Scan, collect or merge failure inside the columnar engine.
    #[error("storage error ({context}): {source}")]
    Storage {
        context: String,
        #[source]
        source: PolarsError,
    },

    /// Internal defect in plan construction or execution; never a data problem.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn configuration<W: Into<String>, S: Into<String>, M: Into<String>>(workflow_id: W, subject: S, message: M) -> Self {
        EngineError::Configuration { workflow_id: workflow_id.into(), subject: subject.into(), message: message.into() }
    }
    pub fn lookup<W: Into<String>, S: Into<String>, M: Into<String>>(workflow_id: W, subject: S, message: M) -> Self {
        EngineError::Lookup { workflow_id: workflow_id.into(), subject: subject.into(), message: message.into() }
    }
    pub fn storage<C: Into<String>>(context: C, source: PolarsError) -> Self {
        EngineError::Storage { context: context.into(), source }
    }
    pub fn invariant<M: Into<String>>(message: M) -> Self { EngineError::InvariantViolation(message.into()) }

    pub fn code_str(&self) -> &'static str {
        match self {
            EngineError::Configuration { .. } => "configuration_error",
            EngineError::Lookup { .. } => "lookup_error",
            EngineError::Storage { .. } => "storage_error",
            EngineError::InvariantViolation(_) => "invariant_violation",
        }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            EngineError::Configuration { .. } => 400,
            EngineError::Lookup { .. } => 502,
            EngineError::Storage { .. } => 503,
            EngineError::InvariantViolation(_) => 500,
        }
    }

    pub fn is_lookup(&self) -> bool { matches!(self, EngineError::Lookup { .. }) }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
