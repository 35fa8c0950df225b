//! Unified error type for the Troupe framework.

/// Top-level error type for the Troupe framework.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum TroupeError {
    /// An error in configuration parsing or validation. Raised at build
    /// time; a run never starts with an invalid configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// A model invocation failure that survived the retry policy.
    #[error("Model invocation error: {0}")]
    Model(String),

    /// An error raised by a tool during invocation. At the registry
    /// boundary these are converted into error-carrying tool results.
    #[error("Tool error: {0}")]
    Tool(String),

    /// A checkpoint persistence or lookup failure.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// An error from the workflow engine itself.
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// An error from an outbound HTTP request (e.g. model API call).
    #[error("HTTP error: {0}")]
    Http(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`TroupeError`].
pub type TroupeResult<T> = Result<T, TroupeError>;
