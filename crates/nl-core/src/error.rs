//! Error types for ntloop
//!
//! Every error is fatal to the current run. The variants only exist so the
//! caller can tell *why* a run stopped.

use thiserror::Error;

/// ntloop error type
#[derive(Error, Debug)]
pub enum Error {
    /// The requested job cannot run with the streams that were opened
    /// (e.g. a particle-level loop without a particle stream).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A column has no physical representation compatible with the
    /// stream's schema version.
    #[error("Schema resolution error: {0}")]
    SchemaResolution(String),

    /// The reco/particle correspondence table implies a visitation order the
    /// forward-only cursors cannot honour.
    #[error("Correlation inconsistency: {0}")]
    CorrelationInconsistency(String),

    /// The per-event callback asked to stop the job.
    #[error("Callback failure at event {event}: {reason}")]
    CallbackFailure {
        /// Logical event counter at which the callback failed.
        event: u64,
        /// Reason reported by the callback (or the driver).
        reason: String,
    },

    /// Opaque failure from the underlying record source.
    #[error("Record source error: {0}")]
    Source(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fieldless discriminant of [`Error`], for callers that only care about the class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::Configuration`].
    Configuration,
    /// See [`Error::SchemaResolution`].
    SchemaResolution,
    /// See [`Error::CorrelationInconsistency`].
    CorrelationInconsistency,
    /// See [`Error::CallbackFailure`].
    CallbackFailure,
    /// See [`Error::Source`], [`Error::Io`] and [`Error::Json`].
    Source,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::SchemaResolution(_) => ErrorKind::SchemaResolution,
            Error::CorrelationInconsistency(_) => ErrorKind::CorrelationInconsistency,
            Error::CallbackFailure { .. } => ErrorKind::CallbackFailure,
            Error::Source(_) | Error::Io(_) | Error::Json(_) => ErrorKind::Source,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_source_errors() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated").into();
        assert_eq!(err.kind(), ErrorKind::Source);
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn callback_failure_reports_event() {
        let err = Error::CallbackFailure { event: 7, reason: "bad lepton".into() };
        assert_eq!(err.kind(), ErrorKind::CallbackFailure);
        assert_eq!(err.to_string(), "Callback failure at event 7: bad lepton");
    }
}
