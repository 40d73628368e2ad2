use thiserror::Error;

/// Failure of a single dynamic invocation.
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    #[error("{type_name} has no method {method}")]
    NotFound { type_name: String, method: String },

    #[error("{method}: {detail}")]
    Mismatch { method: String, detail: String },

    #[error("{method} raised: {message}")]
    ForeignFault { method: String, message: String },

    #[error("{method} did not return within {millis}ms")]
    TimedOut { method: String, millis: u64 },
}
