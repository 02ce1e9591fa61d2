use thiserror::Error;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum KvmError {
    /// Host unreachable, timeout or DNS failure. Retrying later may help.
    #[error("Connection failed: {0}")]
    ConnectionFailure(String),

    /// Credentials rejected by the appliance. Retrying without new credentials is futile.
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Malformed or unexpected response (firmware mismatch)
    #[error("Protocol error: {0}")]
    ProtocolFailure(String),

    /// No password configured, video capability disabled
    #[error("Authentication unavailable: {0}")]
    AuthUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KvmError {
    /// Whether a later retry with the same credentials could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionFailure(_))
    }

    /// Whether the failure is about credentials (rejected or missing)
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::AuthUnavailable(_))
    }

    /// Classify a transport-level reqwest error.
    ///
    /// Anything raised before a status line was received is a connection
    /// failure; decode problems on a received body are protocol failures.
    pub(crate) fn from_reqwest(context: &str, err: reqwest::Error) -> Self {
        if err.is_decode() || err.is_body() {
            Self::ProtocolFailure(format!("{}: {}", context, err))
        } else {
            Self::ConnectionFailure(format!("{}: {}", context, err))
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, KvmError>;

/// Truncate a response body for inclusion in an error message
pub(crate) fn truncate_body(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
