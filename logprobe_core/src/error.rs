//! Error types for the introspection subsystem.
//!
//! Every variant is contained by the caller: none of them is fatal to the
//! host process.

use thiserror::Error;

use crate::accessor::InvokeError;

#[derive(Debug, Error)]
pub enum ProbeError {
    /// A framework adapter does not apply to a context. Expected; try the next one.
    #[error("Adapter mismatch: {0}")]
    AdapterMismatch(String),

    /// A class, method or logger could not be found inside the foreign context.
    #[error("Foreign lookup failed: {0}")]
    ForeignLookup(String),

    /// The foreign call itself raised an error.
    #[error("Foreign invocation fault: {0}")]
    ForeignInvocation(String),

    /// The framework does not allow the requested operation.
    #[error("Operation not supported: {0}")]
    Unsupported(String),

    /// The logical log or application does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Logger hierarchy exceeds {0} levels")]
    HierarchyTooDeep(usize),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<InvokeError> for ProbeError {
    fn from(e: InvokeError) -> Self {
        match e {
            InvokeError::NotFound { .. } | InvokeError::Mismatch { .. } => {
                ProbeError::ForeignLookup(e.to_string())
            }
            InvokeError::ForeignFault { .. } | InvokeError::TimedOut { .. } => {
                ProbeError::ForeignInvocation(e.to_string())
            }
        }
    }
}

impl ProbeError {
    /// `true` for failures that mean "nothing there" rather than "something broke".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::ForeignLookup(_))
    }
}

pub type Result<T> = std::result::Result<T, ProbeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoke_error_mapping() {
        let lookup: ProbeError = InvokeError::NotFound {
            type_name: "org.apache.log4j.Logger".into(),
            method: "getFile".into(),
        }
        .into();
        assert!(matches!(lookup, ProbeError::ForeignLookup(_)));

        let fault: ProbeError = InvokeError::ForeignFault {
            method: "getAllAppenders".into(),
            message: "boom".into(),
        }
        .into();
        assert!(matches!(fault, ProbeError::ForeignInvocation(ref m) if m.contains("boom")));

        let timeout: ProbeError = InvokeError::TimedOut {
            method: "getLoggerList".into(),
            millis: 10,
        }
        .into();
        assert!(matches!(timeout, ProbeError::ForeignInvocation(_)));
    }
}
