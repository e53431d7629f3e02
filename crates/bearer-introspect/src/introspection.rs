//! OAuth 2.0 Token Introspection (RFC 7662)
//!
//! [`TokenIntrospector`] is the seam between the handler and the authority.
//! [`HttpIntrospector`] is the default implementation: it posts the token to
//! the introspection endpoint, either configured directly or discovered from
//! the authority's `/.well-known/openid-configuration`.
//!
//! # Example
//!
//! ```rust,no_run
//! use bearer_introspect::introspection::{HttpIntrospector, IntrospectionRequest, TokenIntrospector};
//! use bearer_introspect::IntrospectionOptions;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = IntrospectionOptions::new("https://auth.example.com/oauth/introspect", "api1")
//!     .client_secret("secret");
//! let introspector = HttpIntrospector::from_options(&options)?;
//!
//! let request = IntrospectionRequest::from_options("access_token_here", &options);
//! let outcome = introspector.introspect(&request).await;
//! println!("{}", outcome.label());
//! # Ok(())
//! # }
//! ```

use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::claims::ClaimSet;
use crate::config::{ClientCredentialStyle, IntrospectionOptions};
use crate::error::{IntrospectionError, Result};
use crate::introspection_metrics as metrics;
use crate::outcome::IntrospectionOutcome;

/// Path of the OpenID Connect discovery document
pub const DISCOVERY_PATH: &str = ".well-known/openid-configuration";

/// Token introspection request per RFC 7662 Section 2.1
#[derive(Clone)]
pub struct IntrospectionRequest {
    /// The token to introspect
    pub token: String,
    /// Client id authenticating the resource server
    pub client_id: String,
    /// Client secret (None for public clients)
    pub client_secret: Option<SecretString>,
    /// Hint about token type (access_token or refresh_token)
    pub token_type_hint: Option<String>,
}

impl IntrospectionRequest {
    /// Request for `token` with the client credentials and hint from `options`
    pub fn from_options(token: impl Into<String>, options: &IntrospectionOptions) -> Self {
        Self {
            token: token.into(),
            client_id: options.client_id.clone(),
            client_secret: options.client_secret.clone(),
            token_type_hint: options.token_type_hint.clone(),
        }
    }
}

// Tokens and secrets never reach the logs
impl std::fmt::Debug for IntrospectionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntrospectionRequest")
            .field("token", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_type_hint", &self.token_type_hint)
            .finish()
    }
}

/// Token introspection response per RFC 7662 Section 2.2
#[derive(Debug, Clone, Deserialize)]
pub struct IntrospectionResponse {
    /// Whether the token is currently active (REQUIRED)
    pub active: bool,

    /// Every other member, in response order
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl IntrospectionResponse {
    /// Interpret the response as an outcome
    pub fn into_outcome(self) -> IntrospectionOutcome {
        if self.active {
            IntrospectionOutcome::Active(ClaimSet::from_response_fields(&self.fields))
        } else {
            IntrospectionOutcome::Inactive
        }
    }
}

/// OAuth error body (RFC 6749 Section 5.2)
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    #[serde(default)]
    introspection_endpoint: Option<String>,
}

/// Performs the introspection exchange with the authority
///
/// Implementations report every failure as [`IntrospectionOutcome::Error`];
/// timeouts and transport errors are their responsibility.
#[async_trait]
pub trait TokenIntrospector: Send + Sync + std::fmt::Debug {
    /// Introspect the token in `request`
    async fn introspect(&self, request: &IntrospectionRequest) -> IntrospectionOutcome;
}

#[derive(Debug, Clone)]
enum EndpointSource {
    Static(String),
    Discover(String),
}

/// HTTP introspection client
#[derive(Debug)]
pub struct HttpIntrospector {
    source: EndpointSource,
    credential_style: ClientCredentialStyle,
    require_https: bool,
    endpoint: OnceCell<String>,
    http_client: reqwest::Client,
}

impl HttpIntrospector {
    /// Create a client for the endpoint or authority in `options`
    ///
    /// # Errors
    ///
    /// Returns [`IntrospectionError::Configuration`] when neither an endpoint nor an
    /// authority is configured, and [`IntrospectionError::Transport`] when the
    /// HTTP client cannot be built.
    pub fn from_options(options: &IntrospectionOptions) -> Result<Self> {
        let source = match (&options.introspection_endpoint, &options.authority) {
            (Some(endpoint), _) if !endpoint.trim().is_empty() => {
                EndpointSource::Static(endpoint.trim().to_string())
            }
            (_, Some(authority)) if !authority.trim().is_empty() => {
                EndpointSource::Discover(authority.trim().to_string())
            }
            _ => {
                return Err(IntrospectionError::Configuration(
                    "either authority or introspection_endpoint must be set".to_string(),
                ));
            }
        };

        let http_client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| IntrospectionError::Transport(format!("failed to build client: {e}")))?;

        Ok(Self::with_client(
            source,
            options.client_credential_style,
            options.require_https,
            http_client,
        ))
    }

    fn with_client(
        source: EndpointSource,
        credential_style: ClientCredentialStyle,
        require_https: bool,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            source,
            credential_style,
            require_https,
            endpoint: OnceCell::new(),
            http_client,
        }
    }

    /// The resolved endpoint, if already known
    pub fn endpoint(&self) -> Option<&str> {
        match &self.source {
            EndpointSource::Static(endpoint) => Some(endpoint),
            EndpointSource::Discover(_) => self.endpoint.get().map(String::as_str),
        }
    }

    async fn resolve_endpoint(&self) -> Result<&str> {
        match &self.source {
            EndpointSource::Static(endpoint) => {
                check_scheme(endpoint, self.require_https)?;
                Ok(endpoint)
            }
            EndpointSource::Discover(authority) => self
                .endpoint
                .get_or_try_init(|| self.discover(authority))
                .await
                .map(String::as_str),
        }
    }

    async fn discover(&self, authority: &str) -> Result<String> {
        check_scheme(authority, self.require_https)?;
        let url = discovery_url(authority)?;
        info!(%url, "Fetching discovery document");

        let response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| {
                error!(%url, error = %e, "Failed to fetch discovery document");
                IntrospectionError::Discovery(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(IntrospectionError::Discovery(format!(
                "{url} returned status {}",
                response.status()
            )));
        }

        let document: DiscoveryDocument = response
            .json()
            .await
            .map_err(|e| IntrospectionError::Discovery(format!("invalid document: {e}")))?;

        let endpoint = document.introspection_endpoint.ok_or_else(|| {
            IntrospectionError::Discovery("document has no introspection_endpoint".to_string())
        })?;
        check_scheme(&endpoint, self.require_https)?;

        info!(%endpoint, "Discovered introspection endpoint");
        Ok(endpoint)
    }

    async fn try_introspect(&self, request: &IntrospectionRequest) -> Result<IntrospectionOutcome> {
        let endpoint = self.resolve_endpoint().await?;

        let mut form: Vec<(&str, &str)> = vec![("token", request.token.as_str())];
        if let Some(ref hint) = request.token_type_hint {
            form.push(("token_type_hint", hint.as_str()));
        }

        let mut builder = self.http_client.post(endpoint);
        match self.credential_style {
            ClientCredentialStyle::PostBody => {
                form.push(("client_id", request.client_id.as_str()));
                if let Some(ref secret) = request.client_secret {
                    form.push(("client_secret", secret.expose_secret().as_str()));
                }
            }
            ClientCredentialStyle::AuthorizationHeader => {
                builder = builder.basic_auth(
                    &request.client_id,
                    request.client_secret.as_ref().map(|s| s.expose_secret()),
                );
            }
        }

        let response = builder
            .form(&form)
            .send()
            .await
            .map_err(|e| IntrospectionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed = serde_json::from_str::<ErrorBody>(&body).ok();
            warn!(
                %status,
                error = ?parsed.as_ref().map(|b| &b.error),
                "Introspection endpoint returned error status"
            );
            return Err(IntrospectionError::Endpoint {
                status: status.as_u16(),
                error: parsed.as_ref().map(|b| b.error.clone()),
                description: parsed.and_then(|b| b.error_description),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| IntrospectionError::Transport(e.to_string()))?;
        let parsed: IntrospectionResponse = serde_json::from_slice(&body)
            .map_err(|e| IntrospectionError::InvalidResponse(e.to_string()))?;

        Ok(parsed.into_outcome())
    }
}

#[async_trait]
impl TokenIntrospector for HttpIntrospector {
    async fn introspect(&self, request: &IntrospectionRequest) -> IntrospectionOutcome {
        let started = Instant::now();
        let outcome = match self.try_introspect(request).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "Token introspection failed");
                IntrospectionOutcome::Error(err.to_failure())
            }
        };

        let elapsed = started.elapsed();
        metrics::record_introspection(outcome.label(), elapsed.as_secs_f64());
        debug!(
            outcome = outcome.label(),
            elapsed_ms = duration_ms(elapsed),
            "Token introspected"
        );
        outcome
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn discovery_url(authority: &str) -> Result<Url> {
    let mut base = Url::parse(authority)
        .map_err(|e| IntrospectionError::Configuration(format!("invalid authority: {e}")))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(DISCOVERY_PATH)
        .map_err(|e| IntrospectionError::Configuration(format!("invalid authority: {e}")))
}

/// HTTPS is required except for loopback hosts
fn check_scheme(url: &str, require_https: bool) -> Result<()> {
    if !require_https {
        return Ok(());
    }
    let parsed = Url::parse(url)
        .map_err(|e| IntrospectionError::Configuration(format!("invalid url {url}: {e}")))?;
    let loopback = matches!(
        parsed.host_str(),
        Some("localhost") | Some("127.0.0.1") | Some("[::1]")
    );
    if parsed.scheme() == "https" || loopback {
        Ok(())
    } else {
        Err(IntrospectionError::Configuration(format!(
            "{url} must use HTTPS (HTTP only allowed for localhost)"
        )))
    }
}
