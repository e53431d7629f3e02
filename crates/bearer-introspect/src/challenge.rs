//! `WWW-Authenticate` challenges for failed bearer authentication
//!
//! Per RFC 6750 Section 3:
//!
//! ```text
//! WWW-Authenticate: Bearer realm="api", error="invalid_token", error_description="The access token is expired"
//! ```

use crate::outcome::{IntrospectionFailure, error_codes};

/// Description used when an `invalid_token` error arrives without one
pub const EXPIRED_TOKEN_DESCRIPTION: &str = "The access token is expired";

/// Bearer challenge builder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BearerChallenge {
    realm: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl BearerChallenge {
    /// The generic challenge: `Bearer` with no parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Challenge describing an introspection failure.
    ///
    /// An `invalid_token` failure without a description is reported as expired.
    pub fn for_failure(failure: &IntrospectionFailure) -> Self {
        let description = failure.description.clone().or_else(|| {
            (failure.code == error_codes::INVALID_TOKEN)
                .then(|| EXPIRED_TOKEN_DESCRIPTION.to_string())
        });

        let mut challenge = Self::new().error(failure.code.clone());
        challenge.error_description = description;
        challenge
    }

    /// Set the realm
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Set the realm when one is configured
    pub fn maybe_realm(mut self, realm: Option<&str>) -> Self {
        self.realm = realm.map(str::to_owned);
        self
    }

    /// Set the error code
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Set the error description
    pub fn error_description(mut self, description: impl Into<String>) -> Self {
        self.error_description = Some(description.into());
        self
    }

    /// Render the header value
    pub fn to_header_value(&self) -> String {
        let mut params = Vec::with_capacity(3);

        if let Some(ref realm) = self.realm {
            params.push(format!("realm=\"{}\"", escape_param_value(realm)));
        }
        if let Some(ref error) = self.error {
            params.push(format!("error=\"{}\"", escape_param_value(error)));
        }
        if let Some(ref description) = self.error_description {
            params.push(format!(
                "error_description=\"{}\"",
                escape_param_value(description)
            ));
        }

        if params.is_empty() {
            "Bearer".to_string()
        } else {
            format!("Bearer {}", params.join(", "))
        }
    }
}

impl std::fmt::Display for BearerChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_header_value())
    }
}

/// Backslash-escape `\` and `"` inside a quoted-string
fn escape_param_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
