//! Cache key derivation
//!
//! Raw tokens are never used as cache keys. A key is the configured prefix
//! followed by the standard base64 encoding of the token's SHA-256 digest, so it
//! is stable across restarts and has a fixed 44 character suffix.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

/// Derive the cache key for a token.
///
/// A missing, empty, or whitespace-only token yields `prefix` unchanged.
///
/// # Example
///
/// ```rust
/// use bearer_introspect::cache_key::derive_key;
///
/// assert_eq!(
///     derive_key("key:", Some("abcdefg01234")),
///     "key:9/+6X7C6m2lsSY7l+QUPZ8WP88j03/JP3iTSUUFqJBY="
/// );
/// assert_eq!(derive_key("key:", Some("  ")), "key:");
/// ```
pub fn derive_key(prefix: &str, token: Option<&str>) -> String {
    match token {
        Some(token) if !token.trim().is_empty() => {
            let digest = Sha256::digest(token.as_bytes());
            let mut key = String::with_capacity(prefix.len() + 44);
            key.push_str(prefix);
            STANDARD.encode_string(digest, &mut key);
            key
        }
        _ => prefix.to_owned(),
    }
}

/// Strategy for turning a token into a cache key
pub trait CacheKeyGenerator: Send + Sync + std::fmt::Debug {
    /// Produce the key under which the token's claims are stored
    fn generate(&self, prefix: &str, token: &str) -> String;
}

/// Default generator: `prefix ∥ base64(SHA-256(token))`
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256KeyGenerator;

impl CacheKeyGenerator for Sha256KeyGenerator {
    fn generate(&self, prefix: &str, token: &str) -> String {
        derive_key(prefix, Some(token))
    }
}
