//! Result of a single introspection call
//!
//! An [`IntrospectionOutcome`] is produced once per flight and cloned to every
//! waiter coalesced onto that flight, so it is a plain value: faults are carried
//! as [`IntrospectionOutcome::Error`] instead of a `Result`.

use serde::{Deserialize, Serialize};

use crate::claims::{ClaimSet, claim_types};

/// OAuth error codes used when the endpoint did not supply one
pub mod error_codes {
    /// RFC 6750: the access token is expired, revoked, or malformed
    pub const INVALID_TOKEN: &str = "invalid_token";
    /// RFC 6749: the resource server failed to authenticate to the authority
    pub const INVALID_CLIENT: &str = "invalid_client";
    /// RFC 6749: the authority failed unexpectedly
    pub const SERVER_ERROR: &str = "server_error";
    /// RFC 6749: the authority could not be reached
    pub const TEMPORARILY_UNAVAILABLE: &str = "temporarily_unavailable";
    /// The authority answered with something that is not an introspection response
    pub const INVALID_RESPONSE: &str = "invalid_response";
}

/// Error reported by, or on behalf of, the introspection endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectionFailure {
    /// OAuth error code
    pub code: String,
    /// Human-readable description
    pub description: Option<String>,
    /// HTTP status returned by the endpoint, when there was a response
    pub status: Option<u16>,
}

impl IntrospectionFailure {
    /// Create a failure with a code and optional description
    pub fn new(code: impl Into<String>, description: Option<String>) -> Self {
        Self {
            code: code.into(),
            description,
            status: None,
        }
    }

    /// Attach the HTTP status of the endpoint response
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl std::fmt::Display for IntrospectionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{}: {}", self.code, description),
            None => f.write_str(&self.code),
        }
    }
}

/// Outcome of introspecting a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntrospectionOutcome {
    /// The token is active; these are its claims
    Active(ClaimSet),
    /// The authority reports the token as not active
    Inactive,
    /// The call failed or the authority reported an error
    Error(IntrospectionFailure),
}

impl IntrospectionOutcome {
    /// Fold legacy error reporting into [`IntrospectionOutcome::Error`].
    ///
    /// Some authorities answer with `active: true` and report failures as an
    /// ordinary `error` claim. Such a claim set is never treated as active.
    pub fn normalize(self) -> Self {
        match self {
            Self::Active(claims) => match claims.find_first(claim_types::ERROR) {
                Some(code) => Self::Error(IntrospectionFailure::new(
                    code,
                    claims
                        .find_first(claim_types::ERROR_DESCRIPTION)
                        .map(str::to_owned),
                )),
                None => Self::Active(claims),
            },
            other => other,
        }
    }

    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Active(_) => "active",
            Self::Inactive => "inactive",
            Self::Error(_) => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_error_claim() {
        let outcome = IntrospectionOutcome::Active(
            ClaimSet::new()
                .with("error", "invalid_token")
                .with("error_description", "revoked"),
        )
        .normalize();

        assert_eq!(
            outcome,
            IntrospectionOutcome::Error(IntrospectionFailure::new(
                "invalid_token",
                Some("revoked".to_string())
            ))
        );
    }

    #[test]
    fn test_normalize_keeps_active() {
        let claims = ClaimSet::new().with("sub", "alice");
        let outcome = IntrospectionOutcome::Active(claims.clone()).normalize();
        assert_eq!(outcome, IntrospectionOutcome::Active(claims));
        assert_eq!(
            IntrospectionOutcome::Inactive.normalize(),
            IntrospectionOutcome::Inactive
        );
    }

    #[test]
    fn test_failure_display() {
        let failure = IntrospectionFailure::new("server_error", Some("boom".into()));
        assert_eq!(failure.to_string(), "server_error: boom");
        assert_eq!(
            IntrospectionFailure::new("invalid_token", None).to_string(),
            "invalid_token"
        );
    }
}
