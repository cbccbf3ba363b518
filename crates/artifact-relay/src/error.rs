//! Error types for artifact-relay

use std::time::Duration;

use thiserror::Error;

use crate::messages::DecodeError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Everything a relay or token handler can fail with.
///
/// Each variant maps to the HTTP-style code carried in failure
/// notifications via [`Error::status_code`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] DecodeError),

    #[error("Upstream blob unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Downstream unavailable: {0}")]
    DownstreamUnavailable(String),

    #[error("Downstream rejected upload with status {status}")]
    DownstreamRejected { status: u16 },

    #[error("Container creation failed: {0}")]
    ContainerCreation(String),

    #[error("Delegation key unavailable: {0}")]
    DelegationKey(String),

    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error("Handler timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MalformedPayload(_) => 400,
            Self::UpstreamUnavailable(_) | Self::DownstreamUnavailable(_) => 502,
            Self::DownstreamRejected { status } => *status,
            Self::ContainerCreation(_) | Self::DelegationKey(_) | Self::Signing(_) => 500,
            Self::Timeout(_) => 504,
        }
    }
}
