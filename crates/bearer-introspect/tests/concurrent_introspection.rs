//! Request coalescing under concurrent load
//!
//! Tests cover:
//! - Many concurrent requests with one token share a single introspection call
//! - Every coalesced caller observes the same outcome, including failures
//! - Distinct tokens never wait on each other
//! - The in-flight table is empty once all callers return

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bearer_introspect::{
    ClaimSet, IntrospectionFailure, IntrospectionHandler, IntrospectionOptions,
    IntrospectionOutcome, IntrospectionRequest, TokenIntrospector,
};
use common::{MockIntrospectionServer, bearer_request};
use tokio::sync::Notify;

const CONCURRENCY: usize = 32;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_one_call() {
    let mock = MockIntrospectionServer::start().await;
    mock.mock_active_delayed("shared-token", 60, 1, Duration::from_millis(300))
        .await;

    let handler = IntrospectionHandler::builder(mock.options()).build().unwrap();

    let tasks: Vec<_> = (0..CONCURRENCY)
        .map(|_| {
            let handler = handler.clone();
            tokio::spawn(async move {
                handler
                    .authenticate(&bearer_request("shared-token"))
                    .await
                    .principal()
                    .map(|p| p.claims.clone())
            })
        })
        .collect();

    let mut results = Vec::with_capacity(CONCURRENCY);
    for task in tasks {
        results.push(task.await.unwrap().expect("authenticated"));
    }

    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(handler.in_flight(), 0);
}

/// Introspector whose calls block until the token's gate is opened
#[derive(Debug, Default)]
struct GatedIntrospector {
    gates: HashMap<String, Arc<Notify>>,
    failure: Option<IntrospectionFailure>,
    calls: AtomicUsize,
}

impl GatedIntrospector {
    fn with_gate(mut self, token: &str) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gates.insert(token.to_string(), Arc::clone(&gate));
        (self, gate)
    }

    fn failing_with(mut self, failure: IntrospectionFailure) -> Self {
        self.failure = Some(failure);
        self
    }
}

#[async_trait]
impl TokenIntrospector for GatedIntrospector {
    async fn introspect(&self, request: &IntrospectionRequest) -> IntrospectionOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = self.gates.get(&request.token) {
            gate.notified().await;
        }
        if let Some(ref failure) = self.failure {
            return IntrospectionOutcome::Error(failure.clone());
        }
        IntrospectionOutcome::Active(ClaimSet::new().with("sub", request.token.clone()))
    }
}

fn options() -> IntrospectionOptions {
    IntrospectionOptions::new("https://auth.example.com/introspect", "api1")
}

async fn wait_until_in_flight(handler: &IntrospectionHandler, token: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !handler.is_in_flight(token) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("flight started");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_followers_join_outstanding_flight() {
    let (introspector, gate) = GatedIntrospector::default().with_gate("slow");
    let introspector = Arc::new(introspector);
    let handler = IntrospectionHandler::builder(options())
        .introspector(introspector.clone())
        .build()
        .unwrap();

    let leader = {
        let handler = handler.clone();
        tokio::spawn(async move { handler.authenticate(&bearer_request("slow")).await })
    };
    wait_until_in_flight(&handler, "slow").await;

    let followers: Vec<_> = (0..CONCURRENCY)
        .map(|_| {
            let handler = handler.clone();
            tokio::spawn(async move { handler.authenticate(&bearer_request("slow")).await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(50)).await;

    gate.notify_one();

    let leader = leader.await.unwrap();
    assert_eq!(leader.principal().unwrap().subject(), Some("slow"));
    for follower in followers {
        let outcome = follower.await.unwrap();
        assert_eq!(outcome.principal().unwrap().subject(), Some("slow"));
    }

    assert_eq!(introspector.calls.load(Ordering::SeqCst), 1);
    assert!(!handler.is_in_flight("slow"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_flight_shared_by_all_waiters() {
    let (introspector, gate) = GatedIntrospector::default().with_gate("down");
    let introspector = Arc::new(introspector.failing_with(IntrospectionFailure::new(
        "temporarily_unavailable",
        Some("connection refused".to_string()),
    )));
    let handler = IntrospectionHandler::builder(options())
        .introspector(introspector.clone())
        .build()
        .unwrap();

    let leader = {
        let handler = handler.clone();
        tokio::spawn(async move { handler.authenticate(&bearer_request("down")).await })
    };
    wait_until_in_flight(&handler, "down").await;

    let followers: Vec<_> = (0..CONCURRENCY)
        .map(|_| {
            let handler = handler.clone();
            tokio::spawn(async move { handler.authenticate(&bearer_request("down")).await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(50)).await;

    gate.notify_one();

    let expected = leader.await.unwrap().failure().cloned().expect("failed");
    assert_eq!(expected.reason, "introspection failed: temporarily_unavailable");
    for follower in followers {
        let outcome = follower.await.unwrap();
        assert_eq!(outcome.failure(), Some(&expected));
    }

    assert_eq!(introspector.calls.load(Ordering::SeqCst), 1);
    assert_eq!(handler.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_tokens_do_not_block() {
    let (introspector, gate) = GatedIntrospector::default().with_gate("slow");
    let handler = IntrospectionHandler::builder(options())
        .introspector(Arc::new(introspector))
        .build()
        .unwrap();

    let slow = {
        let handler = handler.clone();
        tokio::spawn(async move { handler.authenticate(&bearer_request("slow")).await })
    };
    wait_until_in_flight(&handler, "slow").await;

    let fast = tokio::time::timeout(
        Duration::from_secs(1),
        handler.authenticate(&bearer_request("fast")),
    )
    .await
    .expect("fast token not blocked by slow token");
    assert_eq!(fast.principal().unwrap().subject(), Some("fast"));
    assert!(handler.is_in_flight("slow"));

    gate.notify_one();
    assert!(slow.await.unwrap().principal().is_some());
    assert_eq!(handler.in_flight(), 0);
}

#[tokio::test]
async fn test_cancelled_waiter_does_not_pin_flight() {
    let (introspector, gate) = GatedIntrospector::default().with_gate("slow");
    let introspector = Arc::new(introspector);
    let handler = IntrospectionHandler::builder(options())
        .introspector(introspector.clone())
        .build()
        .unwrap();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        handler.authenticate(&bearer_request("slow")),
    )
    .await;
    assert!(abandoned.is_err());
    assert!(!handler.is_in_flight("slow"));

    // A later request starts a fresh flight
    let retry = {
        let handler = handler.clone();
        tokio::spawn(async move { handler.authenticate(&bearer_request("slow")).await })
    };
    wait_until_in_flight(&handler, "slow").await;
    gate.notify_one();

    assert!(retry.await.unwrap().principal().is_some());
    assert_eq!(introspector.calls.load(Ordering::SeqCst), 2);
}
