use thiserror::Error;

/// The error taxonomy for the scan pipeline.
///
/// Configuration errors are always fatal and surface before any network
/// I/O. Transport errors on the baseline request are fatal for the scan;
/// the same variant on a probe request is caught by the caller and
/// recorded as a non-fatal `ScanIssue` instead of propagated.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("scan cancelled")]
    Cancelled,

    #[error("panic in technique '{technique}' on parameter '{parameter}': {message}")]
    PanicInTechnique {
        technique: String,
        parameter: String,
        message: String,
    },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ScanError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        ScanError::Configuration(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        ScanError::Transport(msg.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScanError::Configuration(_) | ScanError::Transport(_) | ScanError::Cancelled
        )
    }
}

pub type ScanOutcome<T> = Result<T, ScanError>;
