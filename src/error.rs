use thiserror::Error;

/// Status the embedding layer reports for a client-cancelled request.
/// Cancellation itself is not an error; see `DispatchOutcome::Cancelled`.
pub const CANCELLED_STATUS: u16 = 499;

#[derive(Debug, Error)]
pub enum GaleError {
    #[error("upstream API key is missing")]
    MissingCredential,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("upstream error {status}: {message}")]
    Upstream {
        status: u16,
        message: String,
        /// True when a 429 payload identifies an insufficient-quota condition
        /// (as opposed to a transient rate limit).
        quota_error: bool,
    },

    #[error("connection to upstream failed: {0}")]
    Transport(String),
}

impl GaleError {
    /// HTTP status the embedding layer should report for this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::MissingCredential | Self::InvalidRequest(_) => 400,
            Self::Upstream { status, .. } => *status,
            Self::Transport(_) => 502,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Upstream { status: 429, .. })
    }

    pub fn quota_error(&self) -> bool {
        matches!(
            self,
            Self::Upstream {
                quota_error: true,
                ..
            }
        )
    }

    /// Sanitized message safe to relay to clients. Does not leak connection
    /// details or internal URLs.
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingCredential => "upstream API key is missing".to_string(),
            Self::InvalidRequest(msg) => format!("invalid request: {msg}"),
            Self::Upstream { message, .. } => message.clone(),
            Self::Transport(_) => "connection to upstream failed".to_string(),
        }
    }
}
