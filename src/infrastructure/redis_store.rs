//! Redis-backed shared window store.
//!
//! Lets several worker processes enforce one sliding window per
//! (actor, category).
//!
//! ## Architecture
//!
//! - Window keys are sorted sets. Each admitted request is one member scored
//!   with its unix timestamp.
//! - Prune, window count, burst count, and insert run inside one Lua script,
//!   so concurrent workers can never jointly exceed a window.
//! - Window keys expire a little after their window; violation counters carry
//!   their own TTL.
//! - Connection pooling via `redis::aio::ConnectionManager`.
//!
//! ## Blocking bridge
//!
//! The `SharedWindowStore` port is synchronous. Each call blocks on the async
//! client under `tokio::time::timeout`, so it never takes longer than
//! `operation_timeout`. Inside a multi-threaded runtime this uses
//! `block_in_place`. On a current-thread runtime the call returns
//! `StoreError::Unavailable` and the controller uses local state instead.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tiered_admission::{AdmissionController, RedisWindowStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = RedisWindowStore::connect("redis://127.0.0.1/")
//!         .await
//!         .expect("Failed to connect to Redis");
//!
//!     let controller = AdmissionController::builder()
//!         .with_shared_store(Arc::new(store))
//!         .build()
//!         .unwrap();
//! }
//! ```

use crate::application::ports::{SharedWindowStore, StoreError, WindowLimits, WindowVerdict};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};

/// Atomic prune, count, burst check and insert on one sorted set.
///
/// The burst range excludes its lower bound: `(now - cooldown, now]`.
/// Returns `{code, count, timestamp}`: code 0 recorded (count before insert),
/// 1 window full (timestamp of the oldest member), 2 burst full (timestamp
/// whose expiry frees a burst slot).
const WINDOW_SCRIPT: &str = r"
local key = KEYS[1]
local now = ARGV[1]
local window_start = ARGV[2]
local capacity = tonumber(ARGV[3])
local burst_start = ARGV[4]
local burst = tonumber(ARGV[5])
local expiry_ms = tonumber(ARGV[6])
local member = ARGV[7]

redis.call('ZREMRANGEBYSCORE', key, '-inf', '(' .. window_start)

local count = redis.call('ZCARD', key)
if count >= capacity then
    local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
    return {1, count, oldest[2] or now}
end

local recent = redis.call('ZRANGEBYSCORE', key, '(' .. burst_start, '+inf', 'WITHSCORES')
local in_burst = #recent / 2
if in_burst >= burst then
    local pivot = now
    if burst > 0 then
        pivot = recent[(in_burst - burst) * 2 + 2]
    end
    return {2, in_burst, pivot}
end

redis.call('ZADD', key, now, member)
redis.call('PEXPIRE', key, expiry_ms)
return {0, count, now}
";

/// Configuration for the Redis window store.
#[derive(Debug, Clone)]
pub struct RedisWindowStoreConfig {
    /// Key prefix for Redis keys (default: "admission:")
    pub key_prefix: String,
    /// Upper bound for one store call (default: 250ms)
    pub operation_timeout: Duration,
    /// How long window keys outlive their window (default: 5s)
    pub expiry_slack: Duration,
}

impl Default for RedisWindowStoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "admission:".to_string(),
            operation_timeout: Duration::from_millis(250),
            expiry_slack: Duration::from_secs(5),
        }
    }
}

impl From<RedisError> for StoreError {
    fn from(e: RedisError) -> Self {
        if e.is_timeout() {
            StoreError::Timeout(Duration::ZERO)
        } else if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
            StoreError::Connection(e.to_string())
        } else {
            StoreError::Protocol(e.to_string())
        }
    }
}

/// Redis-backed `SharedWindowStore`.
#[derive(Clone)]
pub struct RedisWindowStore {
    connection: ConnectionManager,
    config: RedisWindowStoreConfig,
    script: Arc<Script>,
    nonce: Arc<AtomicU64>,
}

impl fmt::Debug for RedisWindowStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisWindowStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisWindowStore {
    /// Connect to Redis with default configuration.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., "redis://127.0.0.1/")
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        Self::connect_with_config(url, RedisWindowStoreConfig::default()).await
    }

    /// Connect to Redis with custom configuration.
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect_with_config(
        url: &str,
        config: RedisWindowStoreConfig,
    ) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection,
            config,
            script: Arc::new(Script::new(WINDOW_SCRIPT)),
            nonce: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Get the store configuration.
    pub fn config(&self) -> &RedisWindowStoreConfig {
        &self.config
    }

    fn key(&self, logical: &str) -> String {
        format!("{}{}", self.config.key_prefix, logical)
    }

    /// Unique sorted-set member for a request admitted at `now`.
    fn member(&self, now: f64) -> String {
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        format!("{:.6}:{}:{}", now, std::process::id(), nonce)
    }

    /// Run a Redis future to completion within `operation_timeout`.
    fn run<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, RedisError>>,
    {
        let bound = self.config.operation_timeout;
        let bounded = async move {
            match tokio::time::timeout(bound, fut).await {
                Ok(result) => result.map_err(StoreError::from),
                Err(_) => Err(StoreError::Timeout(bound)),
            }
        };

        match Handle::try_current() {
            Ok(handle) => match handle.runtime_flavor() {
                RuntimeFlavor::CurrentThread => Err(StoreError::Unavailable(
                    "blocking calls need a multi-threaded tokio runtime".to_string(),
                )),
                _ => tokio::task::block_in_place(|| handle.block_on(bounded)),
            },
            Err(_) => {
                // Not in async context - create a runtime for this call
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
                runtime.block_on(bounded)
            }
        }
    }
}

fn parse_score(raw: &str) -> Result<f64, StoreError> {
    raw.parse::<f64>()
        .map_err(|_| StoreError::Protocol(format!("invalid score: {}", raw)))
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl SharedWindowStore for RedisWindowStore {
    fn check_and_record(
        &self,
        key: &str,
        now: f64,
        limits: WindowLimits,
    ) -> Result<WindowVerdict, StoreError> {
        let key = self.key(key);
        let expiry = Duration::from_secs_f64(limits.window_seconds.max(0.0)) + self.config.expiry_slack;
        let member = self.member(now);
        let mut conn = self.connection.clone();
        let script = Arc::clone(&self.script);

        let (code, count, timestamp): (i64, u64, String) = self.run(async move {
            script
                .key(&key)
                .arg(format!("{:.6}", now))
                .arg(format!("{:.6}", now - limits.window_seconds))
                .arg(limits.capacity)
                .arg(format!("{:.6}", now - limits.cooldown_seconds))
                .arg(limits.burst_size)
                .arg(millis(expiry))
                .arg(member)
                .invoke_async(&mut conn)
                .await
        })?;

        match code {
            0 => Ok(WindowVerdict::Recorded {
                count_before: count,
            }),
            1 => Ok(WindowVerdict::WindowFull {
                count,
                oldest: parse_score(&timestamp)?,
            }),
            2 => Ok(WindowVerdict::BurstFull {
                count,
                pivot: parse_score(&timestamp)?,
            }),
            other => Err(StoreError::Protocol(format!(
                "unexpected window script code: {}",
                other
            ))),
        }
    }

    fn count_in_range(&self, key: &str, start: f64, end: f64) -> Result<u64, StoreError> {
        let key = self.key(key);
        let mut conn = self.connection.clone();
        self.run(async move {
            conn.zcount(&key, format!("{:.6}", start), format!("{:.6}", end))
                .await
        })
    }

    fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let key = self.key(key);
        let mut conn = self.connection.clone();
        let (value,): (u64,) = self.run(async move {
            redis::pipe()
                .atomic()
                .incr(&key, 1u64)
                .pexpire(&key, millis(ttl))
                .ignore()
                .query_async(&mut conn)
                .await
        })?;
        Ok(value)
    }

    fn set_with_ttl(&self, key: &str, value: u64, ttl: Duration) -> Result<(), StoreError> {
        let key = self.key(key);
        let mut conn = self.connection.clone();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        self.run(async move { conn.pset_ex::<_, _, ()>(&key, value, ttl_ms).await })
    }

    fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let key = self.key(key);
        let mut conn = self.connection.clone();
        self.run(async move { conn.get::<_, Option<u64>>(&key).await })
    }

    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<u64>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = keys.iter().map(|k| self.key(k)).collect();
        let mut conn = self.connection.clone();
        self.run(async move { conn.mget::<_, Vec<Option<u64>>>(keys).await })
    }

    fn delete(&self, keys: &[String]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = keys.iter().map(|k| self.key(k)).collect();
        let mut conn = self.connection.clone();
        self.run(async move { conn.del::<_, ()>(keys).await })
    }

    fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let reply: String = self.run(async move {
            redis::cmd("PING").query_async(&mut conn).await
        })?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(StoreError::Protocol(format!("unexpected PING reply: {}", reply)))
        }
    }
}
