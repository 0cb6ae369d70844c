//! Redis tools: `redis_get`, `redis_set` and `redis_scan`.

use crate::cache::CacheManager;
use crate::config::ToolSettings;
use crate::error::{DbError, DbResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const DEFAULT_SCAN_PATTERN: &str = "*";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RedisGetInput {
    /// Redis instance name from list_databases
    pub redis: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RedisGetOutput {
    pub redis: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub found: bool,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RedisSetInput {
    /// Redis instance name from list_databases
    pub redis: String,
    pub key: String,
    pub value: String,
    /// Expiry in seconds. Omit or 0 to keep the key forever
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RedisSetOutput {
    pub redis: String,
    pub key: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RedisScanInput {
    /// Redis instance name from list_databases
    pub redis: String,
    /// Glob-style key pattern. Default: `*`
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RedisScanOutput {
    pub redis: String,
    pub pattern: String,
    pub keys: Vec<String>,
    pub count: usize,
    /// True when the scan stopped at the server's key cap
    pub limited: bool,
}

pub struct CacheToolHandler {
    cache_manager: CacheManager,
    settings: Arc<ToolSettings>,
}

impl CacheToolHandler {
    pub fn new(cache_manager: CacheManager, settings: Arc<ToolSettings>) -> Self {
        Self {
            cache_manager,
            settings,
        }
    }

    pub async fn get(&self, input: RedisGetInput) -> DbResult<RedisGetOutput> {
        require_non_empty("key", &input.key)?;
        let client = self.cache_manager.get(&input.redis).await?;

        info!(redis = %input.redis, key = %input.key, "redis_get");

        let value = client.get(&input.key).await?;
        Ok(RedisGetOutput {
            found: value.is_some(),
            redis: input.redis,
            key: input.key,
            value,
        })
    }

    pub async fn set(&self, input: RedisSetInput) -> DbResult<RedisSetOutput> {
        require_non_empty("key", &input.key)?;
        require_non_empty("value", &input.value)?;
        let client = self.cache_manager.get(&input.redis).await?;
        let ttl_secs = input.ttl_secs.filter(|ttl| *ttl > 0);

        info!(redis = %input.redis, key = %input.key, ttl_secs = ?ttl_secs, "redis_set");

        client.set(&input.key, &input.value, ttl_secs).await?;
        Ok(RedisSetOutput {
            redis: input.redis,
            key: input.key,
            success: true,
            ttl_secs,
        })
    }

    pub async fn scan(&self, input: RedisScanInput) -> DbResult<RedisScanOutput> {
        let client = self.cache_manager.get(&input.redis).await?;
        let pattern = input
            .pattern
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_SCAN_PATTERN.to_string());
        let max_keys = self.settings.max_scan_keys as usize;

        info!(redis = %input.redis, pattern = %pattern, "redis_scan");

        let mut keys = Vec::new();
        let mut cursor = 0u64;
        loop {
            let (next, batch) = client
                .scan(cursor, &pattern, self.settings.scan_count)
                .await?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 || keys.len() >= max_keys {
                break;
            }
        }

        let limited = cursor != 0 || keys.len() > max_keys;
        keys.truncate(max_keys);

        Ok(RedisScanOutput {
            redis: input.redis,
            pattern,
            count: keys.len(),
            keys,
            limited,
        })
    }
}

fn require_non_empty(field: &str, value: &str) -> DbResult<()> {
    if value.is_empty() {
        return Err(DbError::invalid_input(format!("{} must not be empty", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> CacheToolHandler {
        CacheToolHandler::new(CacheManager::new(), Arc::new(ToolSettings::default()))
    }

    #[tokio::test]
    async fn test_set_rejects_empty_key_and_value() {
        let err = handler()
            .set(RedisSetInput {
                redis: "default".to_string(),
                key: String::new(),
                value: "v".to_string(),
                ttl_secs: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: key must not be empty");

        let err = handler()
            .set(RedisSetInput {
                redis: "default".to_string(),
                key: "k".to_string(),
                value: String::new(),
                ttl_secs: None,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("value must not be empty"));
    }

    #[tokio::test]
    async fn test_get_unknown_instance() {
        let err = handler()
            .get(RedisGetInput {
                redis: "sessions".to_string(),
                key: "user:1".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[test]
    fn test_scan_input_pattern_optional() {
        let input: RedisScanInput = serde_json::from_str(r#"{"redis": "default"}"#).unwrap();
        assert!(input.pattern.is_none());
    }
}
