//! Redis-backed [`DistributedStore`]
//!
//! Entries are written with `SET key value PX <ms>` so Redis drops them at the
//! absolute expiration computed by the claims cache.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tracing::{debug, trace};

use super::DistributedStore;
use crate::error::{IntrospectionError, Result};

/// Redis store sharing one multiplexed connection
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("connection", &"<redis::aio::MultiplexedConnection>")
            .finish()
    }
}

impl RedisStore {
    /// Connect to Redis and verify the server answers `PING`
    ///
    /// # Errors
    ///
    /// Returns [`IntrospectionError::Store`] if the URL is invalid or the server
    /// cannot be reached.
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let client = redis::Client::open(connection_string).map_err(store_error)?;
        let mut connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(store_error)?;

        let _: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(store_error)?;

        debug!("Redis connection established");
        Ok(Self { connection })
    }
}

fn store_error(err: redis::RedisError) -> IntrospectionError {
    IntrospectionError::Store(format!("redis: {err}"))
}

#[async_trait]
impl DistributedStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut connection = self.connection.clone();
        connection.get(key).await.map_err(store_error)
    }

    async fn set(&self, key: &str, value: Vec<u8>, expires_at: DateTime<Utc>) -> Result<()> {
        let remaining_ms = (expires_at - Utc::now()).num_milliseconds();
        if remaining_ms <= 0 {
            trace!(key, "skipping write of already expired entry");
            return Ok(());
        }

        let mut connection = self.connection.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(remaining_ms)
            .query_async(&mut connection)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut connection = self.connection.clone();
        let _: () = connection.del(key).await.map_err(store_error)?;
        Ok(())
    }
}
