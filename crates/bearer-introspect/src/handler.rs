//! Bearer authentication by token introspection
//!
//! [`IntrospectionHandler`] ties the collaborators together:
//!
//! ```text
//! request ─► TokenRetriever ─► ClaimsCache ──hit──────────────────────────► Principal
//!                                  │miss
//!                                  ▼
//!                  SingleFlight[token] ─► TokenIntrospector ─► normalize ─► cache write
//!                                  │
//!                                  ▼
//!                   Active ─► IdentityBuilder ─► IntrospectionEvents ─► Principal
//!                   Inactive / Error ─► AuthFailure + WWW-Authenticate challenge
//! ```
//!
//! Concurrent requests carrying the same token share one introspection call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::cache_key::CacheKeyGenerator;
use crate::challenge::BearerChallenge;
use crate::claims::ClaimSet;
use crate::claims_cache::ClaimsCache;
use crate::config::IntrospectionOptions;
use crate::error::{IntrospectionError, Result};
use crate::identity::{ClaimsIdentityBuilder, IdentityBuilder, Principal};
use crate::introspection::{HttpIntrospector, IntrospectionRequest, TokenIntrospector};
use crate::introspection_metrics as metrics;
use crate::outcome::IntrospectionOutcome;
use crate::single_flight::SingleFlight;
use crate::store::DistributedStore;
use crate::token::{FromAuthorizationHeader, TokenRetriever};

/// Reason reported when the authority says the token is not active
pub const TOKEN_NOT_ACTIVE: &str = "token not active";

/// Why a request failed authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    /// Human-readable reason
    pub reason: String,
    /// `WWW-Authenticate` value to send with the 401
    pub challenge: Option<String>,
}

/// Result of authenticating one request
#[derive(Debug, Clone)]
pub enum AuthenticateOutcome {
    /// The request carries no token for this handler
    Skipped,
    /// The token is valid
    Authenticated(Principal),
    /// The token was rejected
    Failed(AuthFailure),
}

impl AuthenticateOutcome {
    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Authenticated(_) => "authenticated",
            Self::Failed(_) => "failed",
        }
    }

    /// The principal, when authenticated
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Authenticated(principal) => Some(principal),
            _ => None,
        }
    }

    /// The failure, when rejected
    pub fn failure(&self) -> Option<&AuthFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Hooks into the authentication pipeline
#[async_trait]
pub trait IntrospectionEvents: Send + Sync + std::fmt::Debug {
    /// Called for every validated principal; `Err(reason)` rejects the request
    async fn token_validated(&self, _principal: &Principal) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Called for every rejected request
    async fn authentication_failed(&self, _failure: &AuthFailure) {}
}

/// Events implementation that accepts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEvents;

impl IntrospectionEvents for NoopEvents {}

/// Builder for [`IntrospectionHandler`]
#[derive(Debug)]
pub struct IntrospectionHandlerBuilder {
    options: IntrospectionOptions,
    introspector: Option<Arc<dyn TokenIntrospector>>,
    store: Option<Arc<dyn DistributedStore>>,
    token_retriever: Option<Arc<dyn TokenRetriever>>,
    identity_builder: Option<Arc<dyn IdentityBuilder>>,
    events: Option<Arc<dyn IntrospectionEvents>>,
    key_generator: Option<Arc<dyn CacheKeyGenerator>>,
}

impl IntrospectionHandlerBuilder {
    /// Use a custom introspector instead of [`HttpIntrospector`]
    pub fn introspector(mut self, introspector: Arc<dyn TokenIntrospector>) -> Self {
        self.introspector = Some(introspector);
        self
    }

    /// Distributed store used when caching is enabled
    pub fn store(mut self, store: Arc<dyn DistributedStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a custom token retriever instead of the `Authorization` header
    pub fn token_retriever(mut self, token_retriever: Arc<dyn TokenRetriever>) -> Self {
        self.token_retriever = Some(token_retriever);
        self
    }

    /// Use a custom identity builder
    pub fn identity_builder(mut self, identity_builder: Arc<dyn IdentityBuilder>) -> Self {
        self.identity_builder = Some(identity_builder);
        self
    }

    /// Install event hooks
    pub fn events(mut self, events: Arc<dyn IntrospectionEvents>) -> Self {
        self.events = Some(events);
        self
    }

    /// Use a custom cache key derivation
    pub fn key_generator(mut self, key_generator: Arc<dyn CacheKeyGenerator>) -> Self {
        self.key_generator = Some(key_generator);
        self
    }

    /// Validate the options and assemble the handler
    ///
    /// # Errors
    ///
    /// Returns [`IntrospectionError::Configuration`] when the options are invalid or
    /// caching is enabled without a store.
    pub fn build(self) -> Result<IntrospectionHandler> {
        self.options.validate()?;

        let cache = match (self.options.enable_caching, self.store) {
            (true, Some(store)) => {
                let cache = ClaimsCache::new(store, self.options.cache_key_prefix.clone());
                Some(match self.key_generator {
                    Some(key_generator) => cache.with_key_generator(key_generator),
                    None => cache,
                })
            }
            (true, None) => {
                return Err(IntrospectionError::Configuration(
                    "enable_caching requires a distributed store".to_string(),
                ));
            }
            (false, _) => None,
        };

        let introspector = match self.introspector {
            Some(introspector) => introspector,
            None => Arc::new(HttpIntrospector::from_options(&self.options)?),
        };

        let identity_builder = self
            .identity_builder
            .unwrap_or_else(|| Arc::new(ClaimsIdentityBuilder::from_options(&self.options)));

        info!(
            caching = cache.is_some(),
            cache_duration_secs = self.options.cache_duration.as_secs(),
            skip_tokens_with_dots = self.options.skip_tokens_with_dots,
            "Introspection handler configured"
        );

        Ok(IntrospectionHandler {
            options: Arc::new(self.options),
            introspector,
            cache,
            token_retriever: self
                .token_retriever
                .unwrap_or_else(|| Arc::new(FromAuthorizationHeader::default())),
            identity_builder,
            events: self.events.unwrap_or_else(|| Arc::new(NoopEvents)),
            flights: SingleFlight::new(),
        })
    }
}

/// Authenticates requests by introspecting their bearer token
///
/// Create one at startup and share it; clones share the in-flight table.
#[derive(Debug, Clone)]
pub struct IntrospectionHandler {
    options: Arc<IntrospectionOptions>,
    introspector: Arc<dyn TokenIntrospector>,
    cache: Option<ClaimsCache>,
    token_retriever: Arc<dyn TokenRetriever>,
    identity_builder: Arc<dyn IdentityBuilder>,
    events: Arc<dyn IntrospectionEvents>,
    flights: SingleFlight<IntrospectionOutcome>,
}

impl IntrospectionHandler {
    /// Start building a handler
    pub fn builder(options: IntrospectionOptions) -> IntrospectionHandlerBuilder {
        IntrospectionHandlerBuilder {
            options,
            introspector: None,
            store: None,
            token_retriever: None,
            identity_builder: None,
            events: None,
            key_generator: None,
        }
    }

    /// The options the handler was built with
    pub fn options(&self) -> &IntrospectionOptions {
        &self.options
    }

    /// Whether an introspection for `token` is outstanding
    pub fn is_in_flight(&self, token: &str) -> bool {
        self.flights.is_in_flight(token)
    }

    /// Number of outstanding introspections
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }

    /// Authenticate a request
    pub async fn authenticate<B>(&self, request: &http::Request<B>) -> AuthenticateOutcome {
        let outcome = match self
            .token_retriever
            .retrieve(request.headers(), request.uri())
        {
            Some(token) => self.authenticate_token(&token).await,
            None => {
                debug!("no token in request");
                AuthenticateOutcome::Skipped
            }
        };
        metrics::record_authenticate(outcome.label());
        outcome
    }

    /// Authenticate an already extracted token
    pub async fn authenticate_token(&self, token: &str) -> AuthenticateOutcome {
        if token.trim().is_empty() {
            debug!("blank token, skipping introspection");
            return AuthenticateOutcome::Skipped;
        }

        if self.options.skip_tokens_with_dots && token.contains('.') {
            debug!("token contains dots, skipping introspection");
            return AuthenticateOutcome::Skipped;
        }

        if let Some(claims) = self.cached_claims(token).await {
            return self.succeed(claims, token).await;
        }

        let outcome = self
            .flights
            .coordinate(token, || self.introspect_flight(token))
            .await;

        match outcome {
            IntrospectionOutcome::Active(claims) => self.succeed(claims, token).await,
            IntrospectionOutcome::Inactive => {
                let challenge = BearerChallenge::new().maybe_realm(self.options.realm.as_deref());
                self.fail(TOKEN_NOT_ACTIVE.to_string(), challenge).await
            }
            IntrospectionOutcome::Error(failure) => {
                let challenge = BearerChallenge::for_failure(&failure)
                    .maybe_realm(self.options.realm.as_deref());
                let reason = format!("introspection failed: {}", failure.code);
                self.fail(reason, challenge).await
            }
        }
    }

    async fn cached_claims(&self, token: &str) -> Option<ClaimSet> {
        let cache = self.cache.as_ref()?;
        match cache.get_claims(token).await {
            Ok(Some(claims)) => {
                metrics::record_cache_lookup("hit");
                Some(claims)
            }
            Ok(None) => {
                metrics::record_cache_lookup("miss");
                None
            }
            Err(err) => {
                metrics::record_cache_lookup("error");
                warn!(error = %err, "claims cache read failed, introspecting");
                None
            }
        }
    }

    /// The shared computation run once per flight
    fn introspect_flight(
        &self,
        token: &str,
    ) -> impl Future<Output = IntrospectionOutcome> + Send + 'static {
        let introspector = Arc::clone(&self.introspector);
        let request = IntrospectionRequest::from_options(token, &self.options);
        let cache = self.cache.clone();
        let cache_duration: Duration = self.options.cache_duration;

        async move {
            let outcome = introspector.introspect(&request).await.normalize();

            if let (IntrospectionOutcome::Active(claims), Some(cache)) = (&outcome, &cache)
                && let Err(err) = cache
                    .set_claims(&request.token, claims, cache_duration)
                    .await
            {
                warn!(error = %err, "failed to cache claims");
            }

            outcome
        }
    }

    async fn succeed(&self, claims: ClaimSet, token: &str) -> AuthenticateOutcome {
        let mut principal = self.identity_builder.build(claims);
        if self.options.save_token {
            principal = principal.with_token(token);
        }

        if let Err(reason) = self.events.token_validated(&principal).await {
            let challenge = BearerChallenge::new().maybe_realm(self.options.realm.as_deref());
            return self.fail(reason, challenge).await;
        }

        debug!(subject = principal.subject(), "token authenticated");
        AuthenticateOutcome::Authenticated(principal)
    }

    async fn fail(&self, reason: String, challenge: BearerChallenge) -> AuthenticateOutcome {
        let failure = AuthFailure {
            reason,
            challenge: Some(challenge.to_header_value()),
        };
        info!(reason = %failure.reason, "bearer authentication failed");
        self.events.authentication_failed(&failure).await;
        AuthenticateOutcome::Failed(failure)
    }
}
