//! Runs concurrent bearer authentications against a real introspection endpoint
//!
//! ```text
//! INTROSPECT_CLIENT_SECRET=secret introspect-demo \
//!     --authority https://auth.example.com --client-id api1 --cache 60 -c 16 2YotnFZFEjr1zCsicMWpAA
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use bearer_introspect::{
    AuthenticateOutcome, FromAuthorizationHeader, IntrospectionHandler, IntrospectionOptions,
    MemoryStore, init_introspection_metrics,
};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Authenticate one token from many concurrent requests
#[derive(Parser, Debug)]
#[command(name = "introspect-demo", version, about)]
struct Cli {
    /// Introspection endpoint URL
    #[arg(long, env = "INTROSPECT_ENDPOINT", conflicts_with = "authority")]
    endpoint: Option<String>,

    /// Authority URL; the endpoint is discovered from its OpenID configuration
    #[arg(long, env = "INTROSPECT_AUTHORITY")]
    authority: Option<String>,

    /// Client id of this resource server
    #[arg(long, env = "INTROSPECT_CLIENT_ID")]
    client_id: String,

    /// Client secret of this resource server
    #[arg(long, env = "INTROSPECT_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Cache claims for up to this many seconds
    #[arg(long, value_name = "SECS")]
    cache: Option<u64>,

    /// Number of concurrent requests
    #[arg(short, long, default_value_t = 8)]
    concurrency: usize,

    /// Allow plain HTTP endpoints
    #[arg(long)]
    insecure: bool,

    /// Token to authenticate
    token: String,
}

impl Cli {
    fn options(&self) -> Result<IntrospectionOptions> {
        let mut options = match (&self.endpoint, &self.authority) {
            (Some(endpoint), _) => IntrospectionOptions::new(endpoint, &self.client_id),
            (None, Some(authority)) => {
                IntrospectionOptions::with_authority(authority, &self.client_id)
            }
            (None, None) => bail!("either --endpoint or --authority is required"),
        };
        if let Some(ref secret) = self.client_secret {
            options = options.client_secret(secret);
        }
        if let Some(secs) = self.cache {
            options = options.caching(Duration::from_secs(secs));
        }
        options.require_https = !self.insecure;
        Ok(options)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,bearer_introspect=debug"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_introspection_metrics();

    let cli = Cli::parse();
    let options = cli.options()?;

    let handler = IntrospectionHandler::builder(options)
        .store(Arc::new(MemoryStore::new()))
        .token_retriever(Arc::new(FromAuthorizationHeader::default()))
        .build()
        .context("invalid introspection configuration")?;

    let request = http::Request::builder()
        .uri("/")
        .header(http::header::AUTHORIZATION, format!("Bearer {}", cli.token))
        .body(())
        .context("token is not a valid header value")?;
    let request = Arc::new(request);

    info!(concurrency = cli.concurrency, "Starting authentications");
    let started = Instant::now();

    let tasks: Vec<_> = (0..cli.concurrency)
        .map(|_| {
            let handler = handler.clone();
            let request = Arc::clone(&request);
            tokio::spawn(async move { handler.authenticate(&request).await })
        })
        .collect();

    for (index, task) in tasks.into_iter().enumerate() {
        match task.await.context("authentication task panicked")? {
            AuthenticateOutcome::Authenticated(principal) => println!(
                "#{index}: authenticated subject={} name={} roles={:?}",
                principal.subject().unwrap_or("-"),
                principal.name().unwrap_or("-"),
                principal.roles()
            ),
            AuthenticateOutcome::Failed(failure) => println!(
                "#{index}: failed reason=\"{}\" challenge={}",
                failure.reason,
                failure.challenge.as_deref().unwrap_or("-")
            ),
            AuthenticateOutcome::Skipped => println!("#{index}: skipped"),
        }
    }

    // Served from the claims cache when caching is on and the token was active
    let again = handler.authenticate(&request).await;
    println!("repeat: {}", again.label());

    info!(
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "Done"
    );
    Ok(())
}
