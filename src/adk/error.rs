// SPDX-License-Identifier: MIT

//! Typed error handling for reqflow
//!
//! `ReqflowError` is what collaborators (models, generators, exporters) return.
//! `WorkflowError` is what the executor returns to its caller; step failures
//! wrap the collaborator error together with the run and step they happened in.

use thiserror::Error;

use crate::reqflow::workflow::checkpoint::CheckpointError;
use crate::reqflow::workflow::executor::RunStatus;

/// Top-level error type for reqflow
#[derive(Debug, Error)]
pub enum ReqflowError {
    /// API errors from external services (Gemini, OpenAI, Azure OpenAI)
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Configuration errors (missing env vars, invalid config)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model/LLM-specific errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Workflow-specific errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Checkpoint store errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// CSV writer errors
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Errors reported by the workflow engine
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The graph is malformed or a router chose an undeclared successor.
    /// Fatal: the affected run is aborted and never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// `start` was called with a run id that already exists
    #[error("Run '{0}' already exists")]
    RunExists(String),

    /// The run id is unknown
    #[error("No such run: {0}")]
    NoSuchRun(String),

    /// `resume` was called on a run that is not waiting for input
    #[error("Run '{run_id}' is not paused (status: {status})")]
    NotPaused { run_id: String, status: RunStatus },

    /// `retry` was called on a run that has no failed step to re-invoke
    #[error("Run '{run_id}' cannot be retried (status: {status})")]
    NotRetryable { run_id: String, status: RunStatus },

    /// Another call is currently driving this run
    #[error("Run '{0}' is busy")]
    RunBusy(String),

    /// A step failed; the run stays at that step and can be retried
    #[error("Step '{step}' failed in run '{run_id}': {source}")]
    StepFailed {
        run_id: String,
        step: String,
        #[source]
        source: Box<ReqflowError>,
    },

    /// Checkpoint store failure
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// A state snapshot could not be encoded or decoded
    #[error("State snapshot error: {0}")]
    StateCodec(String),
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Provider not supported
    #[error("Unsupported model provider: {0}")]
    UnsupportedProvider(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    /// The model answered without any text
    #[error("Model '{0}' returned an empty response")]
    EmptyResponse(String),
}

impl ReqflowError {
    /// Create an API error
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl WorkflowError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// True if the run can be continued with `retry` after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StepFailed { .. })
    }
}

impl From<&str> for ReqflowError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for ReqflowError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
