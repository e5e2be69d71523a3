//! Key-value store abstraction with a periodic cleanup tick for expired
//! entries.
//!
//! `InMemoryKv` is the only implementation shipped; a distributed backend
//! is an explicit out-of-scope external collaborator. The `KvStore`
//! trait is the pluggability seam.

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("key not found")]
    NotFound,
    #[error("backend failure: {0}")]
    Backend(String),
    #[error("operation would make the value negative")]
    WouldGoNegative,
}

/// -1 = no expiration, -2 = absent, >=0 seconds remaining.
pub type TtlSeconds = i64;

#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), KvError>;
    async fn delete(&self, key: &str) -> Result<bool, KvError>;
    async fn exists(&self, key: &str) -> Result<bool, KvError>;

    /// Atomic; returns the value after applying delta.
    async fn incr(&self, key: &str, delta: i64) -> Result<i64, KvError>;
    async fn decr(&self, key: &str, delta: i64) -> Result<i64, KvError> {
        self.incr(key, -delta).await
    }

    /// Returns true if the key was absent and is now set.
    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool, KvError>;

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, KvError> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await?);
        }
        Ok(out)
    }
    async fn multi_set(&self, entries: Vec<(String, Vec<u8>, Option<Duration>)>) -> Result<(), KvError> {
        for (key, value, ttl) in entries {
            self.set(&key, value, ttl).await?;
        }
        Ok(())
    }
    async fn multi_delete(&self, keys: &[String]) -> Result<u64, KvError> {
        let mut n = 0;
        for key in keys {
            if self.delete(key).await? {
                n += 1;
            }
        }
        Ok(n)
    }

    async fn keys_matching(&self, glob_pattern: &str) -> Result<Vec<String>, KvError>;
    async fn ttl(&self, key: &str) -> Result<TtlSeconds, KvError>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError>;
    async fn flush(&self) -> Result<(), KvError>;
    async fn ping(&self) -> Result<(), KvError>;
    async fn close(&self) -> Result<(), KvError>;

    /// Fractional-token rate-limit facet: atomic increment
    /// and decrement with "would go negative" rejection, plus a paired
    /// timestamp. Used by the rate limiter's optional persistence path.
    async fn rl_incr(&self, key: &str, delta: f64, capacity: f64) -> Result<f64, KvError>;
    async fn rl_decr(&self, key: &str, delta: f64) -> Result<f64, KvError>;
    async fn rl_get_timestamp(&self, key: &str) -> Result<Option<i64>, KvError>;
    async fn rl_set_timestamp(&self, key: &str, unix_millis: i64) -> Result<(), KvError>;
}

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct Shard {
    map: HashMap<String, Entry>,
    floats: HashMap<String, f64>,
    timestamps: HashMap<String, i64>,
}

/// Sharded `RwLock<HashMap>` — one lock per shard rather than one lock
/// over the whole keyspace, to keep contention local under concurrent
/// access.
const SHARD_COUNT: usize = 16;

pub struct InMemoryKv {
    shards: Vec<RwLock<Shard>>,
}

impl InMemoryKv {
    pub fn new() -> Arc<Self> {
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for _ in 0..SHARD_COUNT {
            shards.push(RwLock::new(Shard::default()));
        }
        Arc::new(Self { shards })
    }

    fn shard_for(&self, key: &str) -> &RwLock<Shard> {
        let idx = (seahash::hash(key.as_bytes()) as usize) % self.shards.len();
        &self.shards[idx]
    }

    /// Background expiry sweep. Started once at startup; never destroys
    /// rate-limit buckets (those live outside this TTL map).
    pub fn start_cleanup_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                let now = Instant::now();
                for shard in &self.shards {
                    shard
                        .write()
                        .await
                        .map
                        .retain(|_, entry| entry.expires_at.map_or(true, |exp| exp > now));
                }
            }
        });
    }
}

#[async_trait]
impl KvStore for InMemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let shard = self.shard_for(key).read().await;
        Ok(shard.map.get(key).and_then(|e| {
            if e.expires_at.map_or(true, |exp| exp > Instant::now()) {
                Some(e.value.clone())
            } else {
                None
            }
        }))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), KvError> {
        let mut shard = self.shard_for(key).write().await;
        shard.map.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let mut shard = self.shard_for(key).write().await;
        Ok(shard.map.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, KvError> {
        let mut shard = self.shard_for(key).write().await;
        let current = shard
            .map
            .get(key)
            .and_then(|e| std::str::from_utf8(&e.value).ok())
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + delta;
        shard.map.insert(
            key.to_string(),
            Entry {
                value: next.to_string().into_bytes(),
                expires_at: None,
            },
        );
        Ok(next)
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool, KvError> {
        let mut shard = self.shard_for(key).write().await;
        if shard.map.contains_key(key) {
            return Ok(false);
        }
        shard.map.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(true)
    }

    async fn keys_matching(&self, glob_pattern: &str) -> Result<Vec<String>, KvError> {
        let re = glob_to_regex(glob_pattern)
            .map_err(|e| KvError::Backend(format!("invalid glob pattern: {e}")))?;
        let mut out = Vec::new();
        for shard in &self.shards {
            let shard = shard.read().await;
            out.extend(shard.map.keys().filter(|k| re.is_match(k)).cloned());
        }
        Ok(out)
    }

    async fn ttl(&self, key: &str) -> Result<TtlSeconds, KvError> {
        let shard = self.shard_for(key).read().await;
        match shard.map.get(key) {
            None => Ok(-2),
            Some(entry) => match entry.expires_at {
                None => Ok(-1),
                Some(exp) => Ok(exp.saturating_duration_since(Instant::now()).as_secs() as i64),
            },
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut shard = self.shard_for(key).write().await;
        match shard.map.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn flush(&self) -> Result<(), KvError> {
        for shard in &self.shards {
            let mut shard = shard.write().await;
            shard.map.clear();
            shard.floats.clear();
            shard.timestamps.clear();
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), KvError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), KvError> {
        Ok(())
    }

    async fn rl_incr(&self, key: &str, delta: f64, capacity: f64) -> Result<f64, KvError> {
        let mut shard = self.shard_for(key).write().await;
        let current = *shard.floats.get(key).unwrap_or(&0.0);
        let next = (current + delta).min(capacity);
        shard.floats.insert(key.to_string(), next);
        Ok(next)
    }

    async fn rl_decr(&self, key: &str, delta: f64) -> Result<f64, KvError> {
        let mut shard = self.shard_for(key).write().await;
        let current = *shard.floats.get(key).unwrap_or(&0.0);
        if current < delta {
            return Err(KvError::WouldGoNegative);
        }
        let next = current - delta;
        shard.floats.insert(key.to_string(), next);
        Ok(next)
    }

    async fn rl_get_timestamp(&self, key: &str) -> Result<Option<i64>, KvError> {
        let shard = self.shard_for(key).read().await;
        Ok(shard.timestamps.get(key).copied())
    }

    async fn rl_set_timestamp(&self, key: &str, unix_millis: i64) -> Result<(), KvError> {
        let mut shard = self.shard_for(key).write().await;
        shard.timestamps.insert(key.to_string(), unix_millis);
        Ok(())
    }
}

/// Minimal glob (`*` and `?`) to regex translator — some ecosystems depend on
/// `glob` for filesystem globbing, but key enumeration here is over
/// in-memory strings, so a small anchored-regex translation avoids
/// depending on filesystem globbing semantics for a non-filesystem use.
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c if "\\.+()|[]{}^$".contains(c) => {
                re.push('\\');
                re.push(c);
            }
            c => re.push(c),
        }
    }
    re.push('$');
    Regex::new(&re)
}
