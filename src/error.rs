//! Error type shared by every client component.

use thiserror::Error;

/// Failures raised at the edges of the client (network, storage, capture).
///
/// None of these are fatal: each operation boundary converts them into a
/// user-visible notice and keeps the state machine usable.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("backend returned {status}: {detail}")]
    Status { status: u16, detail: String },

    /// The backend answered but refused the request (e.g. unknown email).
    #[error("{0}")]
    Rejected(String),

    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("speech capture failed: {0}")]
    Capture(String),
}

impl ClientError {
    pub fn status(status: u16, detail: impl Into<String>) -> Self {
        Self::Status {
            status,
            detail: detail.into(),
        }
    }

    /// Human-readable detail suitable for an alert, preferring whatever the
    /// backend said over transport wording.
    pub fn user_detail(&self) -> Option<&str> {
        match self {
            ClientError::Rejected(detail) => Some(detail),
            ClientError::Status { detail, .. } if !detail.is_empty() => Some(detail),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_detail_prefers_backend_text() {
        assert_eq!(
            ClientError::Rejected("User not found".into()).user_detail(),
            Some("User not found")
        );
        assert_eq!(
            ClientError::status(400, "Email taken").user_detail(),
            Some("Email taken")
        );
        assert_eq!(ClientError::status(500, "").user_detail(), None);
        assert_eq!(ClientError::Config("x".into()).user_detail(), None);
    }
}
