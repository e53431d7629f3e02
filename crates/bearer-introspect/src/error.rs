//! Error types for introspection, caching, and configuration

use thiserror::Error;

use crate::outcome::{IntrospectionFailure, error_codes};

/// Errors raised inside the introspection layer.
///
/// Only the errors that decide the current request's authentication result are
/// surfaced to the caller (as an [`IntrospectionFailure`]); cache-side errors are
/// logged by the handler and never change the outcome.
#[derive(Debug, Error)]
pub enum IntrospectionError {
    /// Options failed validation
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The HTTP request to the introspection endpoint could not be completed
    #[error("Introspection request failed: {0}")]
    Transport(String),

    /// The introspection endpoint answered with a non-success status
    #[error("Introspection endpoint returned {status}")]
    Endpoint {
        /// HTTP status code
        status: u16,
        /// OAuth error code from the response body, if any
        error: Option<String>,
        /// OAuth error description from the response body, if any
        description: Option<String>,
    },

    /// The endpoint answered 2xx with a body that is not an introspection response
    #[error("Failed to parse introspection response: {0}")]
    InvalidResponse(String),

    /// The authority's discovery document could not be fetched or lacks an endpoint
    #[error("Endpoint discovery failed: {0}")]
    Discovery(String),

    /// The distributed store could not be read or written
    #[error("Cache store error: {0}")]
    Store(String),

    /// Bytes read from the cache do not decode into a claim set
    #[error("Cached claims are corrupted: {0}")]
    CacheCorrupted(String),

    /// A claim set could not be encoded for the cache
    #[error("Failed to encode claims: {0}")]
    Serialization(String),
}

impl IntrospectionError {
    /// Map a client-side error onto the OAuth error code reported to the caller.
    pub fn to_failure(&self) -> IntrospectionFailure {
        match self {
            Self::Endpoint {
                status,
                error: Some(code),
                description,
            } => IntrospectionFailure::new(code.clone(), description.clone()).with_status(*status),
            Self::Endpoint { status, .. } if *status == 401 || *status == 403 => {
                IntrospectionFailure::new(error_codes::INVALID_CLIENT, Some(self.to_string()))
                    .with_status(*status)
            }
            Self::Endpoint { status, .. } => {
                IntrospectionFailure::new(error_codes::SERVER_ERROR, Some(self.to_string()))
                    .with_status(*status)
            }
            Self::Transport(_) | Self::Discovery(_) => IntrospectionFailure::new(
                error_codes::TEMPORARILY_UNAVAILABLE,
                Some(self.to_string()),
            ),
            Self::InvalidResponse(_) => {
                IntrospectionFailure::new(error_codes::INVALID_RESPONSE, Some(self.to_string()))
            }
            Self::Configuration(_)
            | Self::Store(_)
            | Self::CacheCorrupted(_)
            | Self::Serialization(_) => {
                IntrospectionFailure::new(error_codes::SERVER_ERROR, Some(self.to_string()))
            }
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, IntrospectionError>;
