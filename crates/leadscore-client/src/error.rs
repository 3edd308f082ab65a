use leadscore_core::ValidationError;
use thiserror::Error;

/// Errors surfaced to callers of the API client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Rejected before dispatch; the request never reached the network.
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// The service rejected the credential and no refresh path remains.
    /// The stored session has already been cleared.
    #[error("session expired, please log in again")]
    AuthExpired,

    /// Timeout, connection failure or TLS error from the underlying HTTP client.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A 4xx/5xx response, with the server's message normalised to a string.
    #[error("request failed with status {status}: {message}")]
    Remote { status: u16, message: String },

    /// A successful response whose body did not match the expected shape.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// HTTP status for [`ApiError::Remote`] errors.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure of a token renewal. Never leaves the crate's public surface as an
/// [`ApiError`]; the request pipeline translates it to [`ApiError::AuthExpired`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("no refresh token is stored")]
    MissingRefreshToken,

    #[error("refresh rejected with status {status}")]
    Rejected { status: u16 },

    #[error("refresh request failed: {0}")]
    Transport(String),

    #[error("refresh response did not contain an access token")]
    MissingAccessToken,

    #[error("refresh response could not be parsed: {0}")]
    Malformed(String),
}
