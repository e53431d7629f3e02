//! Introspection handler configuration
//!
//! [`IntrospectionOptions`] deserializes from any serde format; durations are
//! given in whole seconds and the client secret is held as a [`SecretString`].

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use crate::error::{IntrospectionError, Result};

/// How the resource server authenticates to the introspection endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientCredentialStyle {
    /// `client_id` and `client_secret` as form fields
    #[default]
    PostBody,
    /// HTTP Basic `Authorization` header
    AuthorizationHeader,
}

/// Options for [`IntrospectionHandler`](crate::IntrospectionHandler)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntrospectionOptions {
    /// Authority base URL; the introspection endpoint is discovered from its
    /// `/.well-known/openid-configuration` when no endpoint is configured
    pub authority: Option<String>,
    /// Explicit introspection endpoint, bypassing discovery
    pub introspection_endpoint: Option<String>,
    /// Client id used to authenticate to the endpoint
    pub client_id: String,
    /// Client secret (None for public clients)
    pub client_secret: Option<SecretString>,
    /// Where the client credentials are sent
    pub client_credential_style: ClientCredentialStyle,
    /// `token_type_hint` sent with every request
    pub token_type_hint: Option<String>,
    /// Cache claims of active tokens in the distributed store
    pub enable_caching: bool,
    /// Upper bound for how long claims stay cached
    #[serde(deserialize_with = "duration_from_secs")]
    pub cache_duration: Duration,
    /// Prefix of every cache key
    pub cache_key_prefix: String,
    /// Leave tokens containing a `.` (JWTs) to another scheme
    pub skip_tokens_with_dots: bool,
    /// Claim type holding the principal's name
    pub name_claim_type: String,
    /// Claim type holding the principal's roles
    pub role_claim_type: String,
    /// Authentication type recorded on the principal
    pub authentication_type: String,
    /// Attach the raw token to the principal
    pub save_token: bool,
    /// Realm advertised in `WWW-Authenticate` challenges
    pub realm: Option<String>,
    /// Timeout for each HTTP request to the authority
    #[serde(deserialize_with = "duration_from_secs")]
    pub request_timeout: Duration,
    /// Reject non-HTTPS endpoints other than localhost
    pub require_https: bool,
}

impl Default for IntrospectionOptions {
    fn default() -> Self {
        Self {
            authority: None,
            introspection_endpoint: None,
            client_id: String::new(),
            client_secret: None,
            client_credential_style: ClientCredentialStyle::default(),
            token_type_hint: Some("access_token".to_string()),
            enable_caching: false,
            cache_duration: Duration::from_secs(300),
            cache_key_prefix: String::new(),
            skip_tokens_with_dots: false,
            name_claim_type: "name".to_string(),
            role_claim_type: "role".to_string(),
            authentication_type: "Bearer".to_string(),
            save_token: true,
            realm: None,
            request_timeout: Duration::from_secs(10),
            require_https: true,
        }
    }
}

impl IntrospectionOptions {
    /// Options for a static endpoint
    pub fn new(introspection_endpoint: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            introspection_endpoint: Some(introspection_endpoint.into()),
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    /// Options for an authority whose endpoint is discovered
    pub fn with_authority(authority: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            authority: Some(authority.into()),
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    /// Set the client secret
    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(SecretString::new(secret.into()));
        self
    }

    /// Enable claims caching for at most `duration`
    pub fn caching(mut self, duration: Duration) -> Self {
        self.enable_caching = true;
        self.cache_duration = duration;
        self
    }

    /// Check the options for contradictions
    ///
    /// # Errors
    ///
    /// Returns [`IntrospectionError::Configuration`] when `client_id` is empty,
    /// no endpoint source is configured, or caching is enabled with a zero duration.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(IntrospectionError::Configuration(
                "client_id must be set".to_string(),
            ));
        }

        let has_endpoint = self
            .introspection_endpoint
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty());
        let has_authority = self
            .authority
            .as_deref()
            .is_some_and(|a| !a.trim().is_empty());
        if !has_endpoint && !has_authority {
            return Err(IntrospectionError::Configuration(
                "either authority or introspection_endpoint must be set".to_string(),
            ));
        }

        if self.enable_caching && self.cache_duration.is_zero() {
            return Err(IntrospectionError::Configuration(
                "cache_duration must be greater than zero when caching is enabled".to_string(),
            ));
        }

        Ok(())
    }
}

fn duration_from_secs<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs: u64 = Deserialize::deserialize(deserializer)?;
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_defaults() {
        let options = IntrospectionOptions::default();
        assert_eq!(options.token_type_hint.as_deref(), Some("access_token"));
        assert_eq!(options.cache_duration, Duration::from_secs(300));
        assert_eq!(options.name_claim_type, "name");
        assert_eq!(options.role_claim_type, "role");
        assert!(!options.enable_caching);
        assert!(options.save_token);
        assert!(options.require_https);
    }

    #[test]
    fn test_deserialize_from_json() {
        let options: IntrospectionOptions = serde_json::from_str(
            r#"{
                "authority": "https://auth.example.com",
                "client_id": "api1",
                "client_secret": "s3cret",
                "client_credential_style": "authorization_header",
                "enable_caching": true,
                "cache_duration": 60,
                "cache_key_prefix": "introspect:"
            }"#,
        )
        .unwrap();

        assert_eq!(options.authority.as_deref(), Some("https://auth.example.com"));
        assert_eq!(
            options.client_secret.as_ref().unwrap().expose_secret(),
            "s3cret"
        );
        assert_eq!(
            options.client_credential_style,
            ClientCredentialStyle::AuthorizationHeader
        );
        assert_eq!(options.cache_duration, Duration::from_secs(60));
        assert_eq!(options.request_timeout, Duration::from_secs(10));
        options.validate().unwrap();
    }

    #[test]
    fn test_secret_not_in_debug() {
        let options = IntrospectionOptions::new("https://auth.example.com/introspect", "api1")
            .client_secret("hunter2");
        assert!(!format!("{options:?}").contains("hunter2"));
    }

    #[test]
    fn test_validate_requires_client_id() {
        let options = IntrospectionOptions::new("https://auth.example.com/introspect", " ");
        assert!(matches!(
            options.validate(),
            Err(IntrospectionError::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_requires_endpoint_source() {
        let options = IntrospectionOptions {
            client_id: "api1".to_string(),
            ..IntrospectionOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_cache_duration() {
        let options = IntrospectionOptions::new("https://auth.example.com/introspect", "api1")
            .caching(Duration::ZERO);
        assert!(options.validate().is_err());
    }
}
