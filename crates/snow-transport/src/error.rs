use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The remote service answered with an error.
    #[error("remote error {status}: {message}")]
    Remote { status: u16, message: String },

    /// The request conflicted with the current remote state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request was refused before it reached the remote service.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The connection is down.
    #[error("transport disconnected")]
    Disconnected,
}

impl TransportError {
    /// Shorthand for a remote error.
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: message.into(),
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
