//! Infrastructure error types.
//!
//! Business-rule outcomes (rejected payloads, failed settlements) are
//! never errors: they travel as [`crate::types::InvalidReason`] codes
//! inside responses. The [`FacilitatorError`] enum covers only the
//! conditions the facilitator itself can hit: misconfiguration at
//! startup, undecodable input, and chain transport failures.

use thiserror::Error;

/// Main error type for facilitator operations.
#[derive(Error, Debug)]
pub enum FacilitatorError {
    /// Invalid or incomplete configuration (bad key, bad RPC URL,
    /// registry entry missing required material). Startup-class.
    #[error("configuration error: {0}")]
    Config(String),

    /// The named network has no adapter.
    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),

    /// RPC transport failure (timeout, connection reset, malformed
    /// response from the node).
    #[error("chain transport error: {0}")]
    Transport(String),

    /// Error during JSON serialization/deserialization.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error during Base64 encoding/decoding.
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Invalid address format.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid amount encoding.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

/// Result type alias for facilitator operations.
pub type Result<T> = std::result::Result<T, FacilitatorError>;

impl From<reqwest::Error> for FacilitatorError {
    fn from(err: reqwest::Error) -> Self {
        FacilitatorError::Transport(err.to_string())
    }
}

impl From<ethers::providers::ProviderError> for FacilitatorError {
    fn from(err: ethers::providers::ProviderError) -> Self {
        FacilitatorError::Transport(err.to_string())
    }
}
