//! A single Redis instance.
//!
//! Commands go through a multiplexed `ConnectionManager`, which reconnects on
//! its own after a dropped connection. Every command is bounded by a timeout.

use crate::error::{DbError, DbResult};
use crate::models::mask_credentials;
use redis::Client;
use redis::aio::ConnectionManager;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

#[derive(Clone)]
pub struct RedisClient {
    id: String,
    connection: ConnectionManager,
    command_timeout: Duration,
}

impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient")
            .field("id", &self.id)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisClient {
    /// Connect and verify the server answers PING.
    pub async fn connect(id: &str, url: &str, command_timeout: Duration) -> DbResult<Self> {
        info!(redis = %id, url = %mask_credentials(url), "Connecting to Redis");

        let client = Client::open(url).map_err(|e| {
            DbError::connection(
                format!("Invalid Redis URL: {}", e),
                "Use the form redis://[:password@]host[:port][/db]",
            )
        })?;

        let connection = match timeout(command_timeout, client.get_tokio_connection_manager()).await
        {
            Ok(result) => result?,
            Err(_) => return Err(DbError::timeout("redis connect", command_timeout.as_secs())),
        };

        let redis = Self {
            id: id.to_string(),
            connection,
            command_timeout,
        };
        redis.ping().await?;

        info!(redis = %id, "Connected to Redis");
        Ok(redis)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    async fn run<T, F>(&self, operation: &str, command: F) -> DbResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match timeout(self.command_timeout, command).await {
            Ok(result) => result.map_err(DbError::from),
            Err(_) => Err(DbError::timeout(
                format!("redis {}", operation),
                self.command_timeout.as_secs(),
            )),
        }
    }

    pub async fn ping(&self) -> DbResult<()> {
        let mut conn = self.connection.clone();
        let reply: String = self
            .run("PING", redis::cmd("PING").query_async(&mut conn))
            .await?;
        debug!(redis = %self.id, reply = %reply, "PING");
        Ok(())
    }

    /// Value stored at `key`, or `None` when the key does not exist.
    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let mut conn = self.connection.clone();
        self.run("GET", redis::cmd("GET").arg(key).query_async(&mut conn))
            .await
    }

    /// Store `value` at `key`, expiring after `ttl_secs` when given.
    pub async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> DbResult<()> {
        let mut conn = self.connection.clone();
        let mut command = redis::cmd("SET");
        command.arg(key).arg(value);
        if let Some(ttl) = ttl_secs.filter(|ttl| *ttl > 0) {
            command.arg("EX").arg(ttl);
        }
        self.run("SET", command.query_async::<_, ()>(&mut conn))
            .await
    }

    /// One SCAN step: the next cursor and the keys returned with it.
    ///
    /// A next cursor of 0 means the iteration is complete.
    pub async fn scan(&self, cursor: u64, pattern: &str, count: u32) -> DbResult<(u64, Vec<String>)> {
        let mut conn = self.connection.clone();
        let mut command = redis::cmd("SCAN");
        command
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count);
        self.run("SCAN", command.query_async(&mut conn)).await
    }
}
