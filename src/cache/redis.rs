//! Redis backing store over a `deadpool-redis` pool.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::{Config, Connection, Pool, Runtime};

use super::backend::{CacheBackend, CacheError, CacheResult};

const SCAN_BATCH: usize = 500;

pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    /// Build a lazily connecting pool; no connection is opened here.
    pub fn connect(url: &str) -> CacheResult<Self> {
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(CacheError::unavailable)?;
        Ok(Self { pool })
    }

    async fn connection(&self) -> CacheResult<Connection> {
        self.pool.get().await.map_err(CacheError::unavailable)
    }

    async fn scan_prefix(&self, conn: &mut Connection, prefix: &str) -> CacheResult<Vec<String>> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(conn)
                .await
                .map_err(CacheError::unavailable)?;
            keys.extend(batch);
            if next == 0 {
                return Ok(keys);
            }
            cursor = next;
        }
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(CacheError::unavailable)?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        let () = conn
            .set_ex(key, value.as_ref(), ttl.as_secs().max(1))
            .await
            .map_err(CacheError::unavailable)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection().await?;
        let removed: u64 = conn.del(key).await.map_err(CacheError::unavailable)?;
        Ok(removed > 0)
    }

    async fn clear(&self, prefix: &str) -> CacheResult<usize> {
        let mut conn = self.connection().await?;
        let keys = self.scan_prefix(&mut conn, prefix).await?;
        let mut removed = 0usize;
        for chunk in keys.chunks(SCAN_BATCH) {
            let count: u64 = conn.del(chunk).await.map_err(CacheError::unavailable)?;
            removed += count as usize;
        }
        Ok(removed)
    }

    async fn key_count(&self, prefix: &str) -> CacheResult<usize> {
        let mut conn = self.connection().await?;
        Ok(self.scan_prefix(&mut conn, prefix).await?.len())
    }

    async fn approx_memory(&self) -> CacheResult<u64> {
        let mut conn = self.connection().await?;
        let info: String = redis::cmd("INFO")
            .arg("memory")
            .query_async(&mut conn)
            .await
            .map_err(CacheError::unavailable)?;
        parse_used_memory(&info)
            .ok_or_else(|| CacheError::Codec("INFO memory lacks used_memory".to_string()))
    }
}

fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn parse_used_memory(info: &str) -> Option<u64> {
    info.lines()
        .find_map(|line| line.trim().strip_prefix("used_memory:"))
        .and_then(|value| value.trim().parse().ok())
}
