//! Claims returned by an active introspection response
//!
//! A [`ClaimSet`] is an ordered list of `(type, value)` pairs. It is what the
//! claims cache stores and what the identity builder turns into a [`Principal`].
//!
//! [`Principal`]: crate::identity::Principal

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{IntrospectionError, Result};

/// Well-known claim types
pub mod claim_types {
    /// Expiration time, Unix seconds
    pub const EXPIRATION: &str = "exp";
    /// Subject identifier
    pub const SUBJECT: &str = "sub";
    /// Space separated scope list; split into one claim per scope
    pub const SCOPE: &str = "scope";
    /// Liveness flag of the introspection response; never stored as a claim
    pub const ACTIVE: &str = "active";
    /// Legacy error reporting inside the claim set
    pub const ERROR: &str = "error";
    /// Legacy error description inside the claim set
    pub const ERROR_DESCRIPTION: &str = "error_description";
}

/// A single typed claim
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type (e.g. `sub`, `exp`, `scope`)
    #[serde(rename = "type")]
    pub claim_type: String,
    /// Claim value as text
    pub value: String,
}

impl Claim {
    /// Create a claim
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }
}

/// Ordered sequence of claims
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet {
    claims: Vec<Claim>,
}

impl ClaimSet {
    /// Create an empty claim set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a claim, keeping insertion order
    pub fn push(&mut self, claim_type: impl Into<String>, value: impl Into<String>) {
        self.claims.push(Claim::new(claim_type, value));
    }

    /// Builder-style [`push`](Self::push)
    pub fn with(mut self, claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(claim_type, value);
        self
    }

    /// First claim value of the given type
    pub fn find_first(&self, claim_type: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }

    /// All claim values of the given type, in order
    pub fn find_all<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.claims
            .iter()
            .filter(move |c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }

    /// Whether any claim of the given type exists
    pub fn contains(&self, claim_type: &str) -> bool {
        self.claims.iter().any(|c| c.claim_type == claim_type)
    }

    /// The `exp` claim parsed as Unix seconds.
    ///
    /// Returns `None` when the claim is missing or not an integer.
    pub fn expiration(&self) -> Option<i64> {
        self.find_first(claim_types::EXPIRATION)?.trim().parse().ok()
    }

    /// Iterate over the claims in order
    pub fn iter(&self) -> std::slice::Iter<'_, Claim> {
        self.claims.iter()
    }

    /// Number of claims
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Whether the set holds no claims
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Serialize for cache storage
    ///
    /// # Errors
    ///
    /// Returns [`IntrospectionError::Serialization`] if serde_json fails to
    /// encode the claims.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|err| IntrospectionError::Serialization(err.to_string()))
    }

    /// Decode bytes written by [`to_bytes`](Self::to_bytes)
    ///
    /// # Errors
    ///
    /// Returns [`IntrospectionError::CacheCorrupted`](crate::IntrospectionError::CacheCorrupted)
    /// when the bytes are not a serialized claim set.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|err| IntrospectionError::CacheCorrupted(err.to_string()))
    }

    /// Flatten the fields of an RFC 7662 response into claims.
    ///
    /// `active` is dropped, `scope` is split on whitespace, arrays yield one
    /// claim per element, objects are kept as compact JSON and `null` is skipped.
    pub fn from_response_fields(fields: &Map<String, Value>) -> Self {
        let mut set = Self::new();
        for (name, value) in fields {
            if name == claim_types::ACTIVE {
                continue;
            }
            if name == claim_types::SCOPE
                && let Value::String(scopes) = value
            {
                for scope in scopes.split_whitespace() {
                    set.push(name.as_str(), scope);
                }
                continue;
            }
            match value {
                Value::Array(items) => {
                    for item in items {
                        if let Some(text) = value_text(item) {
                            set.push(name.as_str(), text);
                        }
                    }
                }
                other => {
                    if let Some(text) = value_text(other) {
                        set.push(name.as_str(), text);
                    }
                }
            }
        }
        set
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => {
            Some(value.to_string())
        }
    }
}

impl FromIterator<Claim> for ClaimSet {
    fn from_iter<I: IntoIterator<Item = Claim>>(iter: I) -> Self {
        Self {
            claims: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ClaimSet {
    type Item = &'a Claim;
    type IntoIter = std::slice::Iter<'a, Claim>;

    fn into_iter(self) -> Self::IntoIter {
        self.claims.iter()
    }
}
