//! Caller-facing identity built from validated claims

use secrecy::{ExposeSecret, SecretString};

use crate::claims::{ClaimSet, claim_types};
use crate::config::IntrospectionOptions;

/// Authenticated principal
#[derive(Debug, Clone)]
pub struct Principal {
    /// Authentication type (e.g. `Bearer`)
    pub authentication_type: String,
    /// Claim type read by [`name`](Self::name)
    pub name_claim_type: String,
    /// Claim type read by [`roles`](Self::roles)
    pub role_claim_type: String,
    /// Claims of the token
    pub claims: ClaimSet,
    token: Option<SecretString>,
}

impl Principal {
    /// Build a principal with explicit claim type mapping
    pub fn new(
        authentication_type: impl Into<String>,
        name_claim_type: impl Into<String>,
        role_claim_type: impl Into<String>,
        claims: ClaimSet,
    ) -> Self {
        Self {
            authentication_type: authentication_type.into(),
            name_claim_type: name_claim_type.into(),
            role_claim_type: role_claim_type.into(),
            claims,
            token: None,
        }
    }

    /// Attach the raw token the principal was authenticated with
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::new(token.into()));
        self
    }

    /// Value of the name claim
    pub fn name(&self) -> Option<&str> {
        self.claims.find_first(&self.name_claim_type)
    }

    /// Value of the `sub` claim
    pub fn subject(&self) -> Option<&str> {
        self.claims.find_first(claim_types::SUBJECT)
    }

    /// Values of the role claim
    pub fn roles(&self) -> Vec<&str> {
        self.claims.find_all(&self.role_claim_type).collect()
    }

    /// Whether the principal holds `role`
    pub fn has_role(&self, role: &str) -> bool {
        self.claims.find_all(&self.role_claim_type).any(|r| r == role)
    }

    /// First claim value of the given type
    pub fn find_first(&self, claim_type: &str) -> Option<&str> {
        self.claims.find_first(claim_type)
    }

    /// The raw token, when saved
    pub fn token(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.expose_secret().as_str())
    }
}

/// Turns validated claims into a [`Principal`]
pub trait IdentityBuilder: Send + Sync + std::fmt::Debug {
    /// Build the principal for an active token
    fn build(&self, claims: ClaimSet) -> Principal;
}

/// Default builder using the claim type mapping from the options
#[derive(Debug, Clone)]
pub struct ClaimsIdentityBuilder {
    authentication_type: String,
    name_claim_type: String,
    role_claim_type: String,
}

impl ClaimsIdentityBuilder {
    /// Builder with an explicit mapping
    pub fn new(
        authentication_type: impl Into<String>,
        name_claim_type: impl Into<String>,
        role_claim_type: impl Into<String>,
    ) -> Self {
        Self {
            authentication_type: authentication_type.into(),
            name_claim_type: name_claim_type.into(),
            role_claim_type: role_claim_type.into(),
        }
    }

    /// Builder configured from handler options
    pub fn from_options(options: &IntrospectionOptions) -> Self {
        Self::new(
            &options.authentication_type,
            &options.name_claim_type,
            &options.role_claim_type,
        )
    }
}

impl IdentityBuilder for ClaimsIdentityBuilder {
    fn build(&self, claims: ClaimSet) -> Principal {
        Principal::new(
            &self.authentication_type,
            &self.name_claim_type,
            &self.role_claim_type,
            claims,
        )
    }
}
