//! Common test utilities for integration tests
//!
//! A wiremock authorization server exposing an introspection endpoint and an
//! OpenID Connect discovery document, plus handler construction helpers.

#![allow(dead_code)]

use std::time::Duration;

use bearer_introspect::IntrospectionOptions;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, method, path},
};

pub const CLIENT_ID: &str = "api1";
pub const CLIENT_SECRET: &str = "secret";

/// Mock authorization server
pub struct MockIntrospectionServer {
    pub server: MockServer,
    pub introspection_endpoint: String,
}

impl MockIntrospectionServer {
    /// Start a new mock authorization server
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let introspection_endpoint = format!("{}/introspect", server.uri());

        Self {
            server,
            introspection_endpoint,
        }
    }

    /// Authority base URL (for discovery)
    pub fn authority(&self) -> String {
        self.server.uri()
    }

    /// Options pointing straight at the introspection endpoint
    pub fn options(&self) -> IntrospectionOptions {
        IntrospectionOptions::new(&self.introspection_endpoint, CLIENT_ID)
            .client_secret(CLIENT_SECRET)
    }

    /// Active response for `token`, expected exactly `calls` times
    pub async fn mock_active(&self, token: &str, exp_offset_secs: i64, calls: u64) {
        self.mock_active_delayed(token, exp_offset_secs, calls, Duration::ZERO)
            .await;
    }

    /// Active response served after `delay`
    pub async fn mock_active_delayed(
        &self,
        token: &str,
        exp_offset_secs: i64,
        calls: u64,
        delay: Duration,
    ) {
        let body = json!({
            "active": true,
            "sub": "248289761001",
            "name": "Jane Doe",
            "role": ["admin", "user"],
            "scope": "api1 api2",
            "client_id": CLIENT_ID,
            "exp": current_timestamp() + exp_offset_secs,
        });

        Mock::given(method("POST"))
            .and(path("/introspect"))
            .and(body_string_contains(format!("token={token}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(body)
                    .set_delay(delay),
            )
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    /// Inactive response for `token`
    pub async fn mock_inactive(&self, token: &str, calls: u64) {
        Mock::given(method("POST"))
            .and(path("/introspect"))
            .and(body_string_contains(format!("token={token}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "active": false })))
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    /// Legacy error-as-claim response for `token`
    pub async fn mock_error_claim(&self, token: &str, error: &str, description: &str) {
        Mock::given(method("POST"))
            .and(path("/introspect"))
            .and(body_string_contains(format!("token={token}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "active": true,
                "error": error,
                "error_description": description,
                "exp": current_timestamp() + 3600,
            })))
            .mount(&self.server)
            .await;
    }

    /// Bare status response (no body)
    pub async fn mock_status(&self, status: u16, calls: u64) {
        Mock::given(method("POST"))
            .and(path("/introspect"))
            .respond_with(ResponseTemplate::new(status))
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    /// OAuth error body with the given status
    pub async fn mock_oauth_error(&self, status: u16, error: &str, description: &str) {
        Mock::given(method("POST"))
            .and(path("/introspect"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "error": error,
                "error_description": description,
            })))
            .mount(&self.server)
            .await;
    }

    /// Discovery document advertising the introspection endpoint
    pub async fn mock_discovery(&self, calls: u64) {
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": self.server.uri(),
                "introspection_endpoint": self.introspection_endpoint,
            })))
            .expect(calls)
            .mount(&self.server)
            .await;
    }
}

/// Loopback introspection URL on a port nothing listens on
pub fn closed_port_endpoint() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    format!("http://127.0.0.1:{port}/introspect")
}

/// Current Unix timestamp
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// `GET /` carrying `Authorization: Bearer <token>`
pub fn bearer_request(token: &str) -> http::Request<()> {
    http::Request::builder()
        .uri("/resource")
        .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
        .body(())
        .expect("valid request")
}
