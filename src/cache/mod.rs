//! Redis instances available to the cache tools.
//!
//! Instances are kept in a `BTreeMap` so listing is sorted and `first()` is
//! stable: insight caching always lands on the lowest id.

pub mod redis;

pub use self::redis::RedisClient;

use crate::error::{DbError, DbResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct CacheManager {
    clients: Arc<RwLock<BTreeMap<String, RedisClient>>>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connected client under its id.
    pub async fn insert(&self, client: RedisClient) -> DbResult<()> {
        let mut clients = self.clients.write().await;
        if clients.contains_key(client.id()) {
            return Err(DbError::connection(
                format!("Redis instance '{}' is already connected", client.id()),
                "Give each --redis entry a unique id (id=url)",
            ));
        }
        clients.insert(client.id().to_string(), client);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> DbResult<RedisClient> {
        let clients = self.clients.read().await;
        match clients.get(id) {
            Some(client) => Ok(client.clone()),
            None => {
                let available: Vec<String> = clients.keys().cloned().collect();
                Err(DbError::not_found("Redis instance", id, &available))
            }
        }
    }

    /// The client with the lowest id, if any are configured.
    pub async fn first(&self) -> Option<RedisClient> {
        self.clients.read().await.values().next().cloned()
    }

    /// Configured ids, sorted.
    pub async fn ids(&self) -> Vec<String> {
        self.clients.read().await.keys().cloned().collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Drop every client; their connections close with them.
    pub async fn close_all(&self) {
        let mut clients = self.clients.write().await;
        for id in clients.keys() {
            info!(redis = %id, "Closing Redis connection");
        }
        clients.clear();
    }
}
