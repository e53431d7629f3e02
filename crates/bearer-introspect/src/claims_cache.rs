//! Claims cache over a [`DistributedStore`]
//!
//! Claim sets of active tokens are stored under a key derived from the token,
//! with an absolute expiration that never outlives the token itself:
//!
//! ```text
//! expires_at = min(exp, now + cache_duration)
//! ```
//!
//! Tokens without an `exp` claim, or already expired, are never cached.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, trace};

use crate::cache_key::{CacheKeyGenerator, Sha256KeyGenerator};
use crate::claims::ClaimSet;
use crate::error::Result;
use crate::store::DistributedStore;

/// Read/write access to cached claim sets
#[derive(Debug, Clone)]
pub struct ClaimsCache {
    store: Arc<dyn DistributedStore>,
    key_prefix: String,
    key_generator: Arc<dyn CacheKeyGenerator>,
}

impl ClaimsCache {
    /// Create a cache using the default SHA-256 key derivation
    pub fn new(store: Arc<dyn DistributedStore>, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            key_generator: Arc::new(Sha256KeyGenerator),
        }
    }

    /// Replace the key derivation strategy
    pub fn with_key_generator(mut self, key_generator: Arc<dyn CacheKeyGenerator>) -> Self {
        self.key_generator = key_generator;
        self
    }

    /// Key under which the claims of `token` are stored
    pub fn key_for(&self, token: &str) -> String {
        self.key_generator.generate(&self.key_prefix, token)
    }

    /// Look up the cached claims of `token`
    ///
    /// # Errors
    ///
    /// Returns [`IntrospectionError::Store`](crate::IntrospectionError::Store) when
    /// the store fails and
    /// [`IntrospectionError::CacheCorrupted`](crate::IntrospectionError::CacheCorrupted)
    /// when the stored bytes do not decode.
    pub async fn get_claims(&self, token: &str) -> Result<Option<ClaimSet>> {
        let key = self.key_for(token);
        match self.store.get(&key).await? {
            Some(bytes) => {
                trace!(%key, "claims cache hit");
                ClaimSet::from_bytes(&bytes).map(Some)
            }
            None => {
                trace!(%key, "claims cache miss");
                Ok(None)
            }
        }
    }

    /// Store the claims of `token` for at most `requested`.
    ///
    /// Does nothing when the claims carry no `exp` claim or `exp` is not in the
    /// future.
    ///
    /// # Errors
    ///
    /// Returns [`IntrospectionError::Store`](crate::IntrospectionError::Store) when
    /// the write fails and
    /// [`IntrospectionError::Serialization`](crate::IntrospectionError::Serialization)
    /// when the claims do not encode.
    pub async fn set_claims(
        &self,
        token: &str,
        claims: &ClaimSet,
        requested: Duration,
    ) -> Result<()> {
        let Some(expiration) = claims.expiration() else {
            debug!("token has no exp claim, claims are not cached");
            return Ok(());
        };

        let now = Utc::now();
        let Some(expires_at) = absolute_expiration(expiration, now, requested) else {
            debug!(expiration, "token already expired, claims are not cached");
            return Ok(());
        };

        let key = self.key_for(token);
        let bytes = claims.to_bytes()?;
        self.store.set(&key, bytes, expires_at).await?;
        debug!(%key, %expires_at, "claims cached");
        Ok(())
    }

    /// Drop any cached claims for `token`
    ///
    /// # Errors
    ///
    /// Returns [`IntrospectionError::Store`](crate::IntrospectionError::Store) when
    /// the store fails.
    pub async fn remove_claims(&self, token: &str) -> Result<()> {
        self.store.remove(&self.key_for(token)).await
    }
}

/// `min(expiration, now + requested)`, or `None` when `expiration <= now`.
pub(crate) fn absolute_expiration(
    expiration: i64,
    now: DateTime<Utc>,
    requested: Duration,
) -> Option<DateTime<Utc>> {
    let token_expires_at = DateTime::<Utc>::from_timestamp(expiration, 0)?;
    if token_expires_at <= now {
        return None;
    }

    let requested = TimeDelta::from_std(requested).unwrap_or(TimeDelta::MAX);
    let cache_expires_at = now.checked_add_signed(requested).unwrap_or(token_expires_at);
    Some(token_expires_at.min(cache_expires_at))
}
