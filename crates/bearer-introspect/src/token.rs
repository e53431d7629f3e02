//! Bearer token retrieval from transport requests

use std::sync::Arc;

use http::{HeaderMap, Uri, header::AUTHORIZATION};

/// Extracts the raw token from a request
pub trait TokenRetriever: Send + Sync + std::fmt::Debug {
    /// The token, or `None` when the request carries none
    fn retrieve(&self, headers: &HeaderMap, uri: &Uri) -> Option<String>;
}

/// `Authorization: <scheme> <token>`
#[derive(Debug, Clone)]
pub struct FromAuthorizationHeader {
    scheme: String,
}

impl FromAuthorizationHeader {
    /// Accept a custom scheme (matched case-insensitively)
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
        }
    }
}

impl Default for FromAuthorizationHeader {
    fn default() -> Self {
        Self::new("Bearer")
    }
}

impl TokenRetriever for FromAuthorizationHeader {
    fn retrieve(&self, headers: &HeaderMap, _uri: &Uri) -> Option<String> {
        let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
        let (scheme, token) = value.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case(&self.scheme) {
            return None;
        }
        let token = token.trim();
        (!token.is_empty()).then(|| token.to_string())
    }
}

/// `?<name>=<token>` in the query string
#[derive(Debug, Clone)]
pub struct FromQueryString {
    name: String,
}

impl FromQueryString {
    /// Read the token from a custom parameter
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for FromQueryString {
    fn default() -> Self {
        Self::new("access_token")
    }
}

impl TokenRetriever for FromQueryString {
    fn retrieve(&self, _headers: &HeaderMap, uri: &Uri) -> Option<String> {
        let query = uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(name, _)| name == self.name.as_str())
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

/// Tries each retriever in order and returns the first token found
#[derive(Debug, Clone, Default)]
pub struct FirstOf {
    retrievers: Vec<Arc<dyn TokenRetriever>>,
}

impl FirstOf {
    /// Combine retrievers
    pub fn new(retrievers: Vec<Arc<dyn TokenRetriever>>) -> Self {
        Self { retrievers }
    }

    /// Append a retriever
    pub fn or(mut self, retriever: impl TokenRetriever + 'static) -> Self {
        self.retrievers.push(Arc::new(retriever));
        self
    }
}

impl TokenRetriever for FirstOf {
    fn retrieve(&self, headers: &HeaderMap, uri: &Uri) -> Option<String> {
        self.retrievers
            .iter()
            .find_map(|retriever| retriever.retrieve(headers, uri))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(authorization: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(authorization).unwrap());
        headers
    }

    #[test]
    fn test_bearer_header() {
        let retriever = FromAuthorizationHeader::default();
        let uri = Uri::from_static("/");
        assert_eq!(
            retriever.retrieve(&headers("Bearer abc123"), &uri),
            Some("abc123".to_string())
        );
        assert_eq!(
            retriever.retrieve(&headers("bearer  abc123 "), &uri),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn test_other_scheme_or_empty_is_none() {
        let retriever = FromAuthorizationHeader::default();
        let uri = Uri::from_static("/");
        assert_eq!(retriever.retrieve(&headers("Basic dXNlcjpwYXNz"), &uri), None);
        assert_eq!(retriever.retrieve(&headers("Bearer "), &uri), None);
        assert_eq!(retriever.retrieve(&headers("Bearer"), &uri), None);
        assert_eq!(retriever.retrieve(&HeaderMap::new(), &uri), None);
    }

    #[test]
    fn test_query_string() {
        let retriever = FromQueryString::default();
        let uri: Uri = "/resource?x=1&access_token=abc%2B123".parse().unwrap();
        assert_eq!(
            retriever.retrieve(&HeaderMap::new(), &uri),
            Some("abc+123".to_string())
        );

        let uri: Uri = "/resource?access_token=".parse().unwrap();
        assert_eq!(retriever.retrieve(&HeaderMap::new(), &uri), None);
    }

    #[test]
    fn test_blank_query_value_is_none() {
        let retriever = FromQueryString::default();
        for query in ["access_token=%20", "access_token=%09%20", "access_token=+"] {
            let uri: Uri = format!("/resource?{query}").parse().unwrap();
            assert_eq!(retriever.retrieve(&HeaderMap::new(), &uri), None, "{query}");
        }

        let uri: Uri = "/resource?access_token=%20abc%20".parse().unwrap();
        assert_eq!(
            retriever.retrieve(&HeaderMap::new(), &uri),
            Some("abc".to_string())
        );
    }

    #[test]
    fn test_first_of() {
        let retriever = FirstOf::default()
            .or(FromAuthorizationHeader::default())
            .or(FromQueryString::default());
        let uri: Uri = "/resource?access_token=from-query".parse().unwrap();

        assert_eq!(
            retriever.retrieve(&headers("Bearer from-header"), &uri),
            Some("from-header".to_string())
        );
        assert_eq!(
            retriever.retrieve(&HeaderMap::new(), &uri),
            Some("from-query".to_string())
        );
    }
}
