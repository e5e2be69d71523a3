//! Usage tracker: sharded per-identity, per-model, and
//! per-(identity, hour) accounting maps, pruned hourly, with best-effort
//! persistence to the Key-Value Store. Sharding follows the same
//! `RwLock<HashMap>`-per-shard discipline as `src/kv.rs`.

use crate::kv::KvStore;
use crate::pricing::Cost;
use crate::types::Identity;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct UsageRecord {
    pub requests: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_centi_cents: i64,
}

impl UsageRecord {
    fn add(&mut self, prompt_tokens: u32, completion_tokens: u32, cost: &Cost) {
        self.requests += 1;
        self.prompt_tokens += prompt_tokens as u64;
        self.completion_tokens += completion_tokens as u64;
        self.cost_centi_cents += (cost.total_usd() * 10_000.0).round() as i64;
    }

    pub fn cost_usd(&self) -> f64 {
        self.cost_centi_cents as f64 / 10_000.0
    }
}

const SHARD_COUNT: usize = 16;

struct Shard {
    per_identity: HashMap<String, UsageRecord>,
    per_identity_model: HashMap<(String, String), UsageRecord>,
    per_model: HashMap<String, UsageRecord>,
    /// (identity, hour-bucket-unix) -> record; pruned by `prune_older_than_24h`.
    per_identity_hour: HashMap<(String, i64), UsageRecord>,
}

impl Default for Shard {
    fn default() -> Self {
        Self {
            per_identity: HashMap::new(),
            per_identity_model: HashMap::new(),
            per_model: HashMap::new(),
            per_identity_hour: HashMap::new(),
        }
    }
}

pub struct UsageTracker<S: KvStore> {
    shards: Vec<RwLock<Shard>>,
    store: Option<Arc<S>>,
}

fn shard_index(identity: &str) -> usize {
    (seahash::hash(identity.as_bytes()) as usize) % SHARD_COUNT
}

fn hour_bucket(now_unix: i64) -> i64 {
    now_unix - (now_unix % 3600)
}

impl<S: KvStore> UsageTracker<S> {
    pub fn new(store: Option<Arc<S>>) -> Arc<Self> {
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for _ in 0..SHARD_COUNT {
            shards.push(RwLock::new(Shard::default()));
        }
        Arc::new(Self { shards, store })
    }

    pub async fn record(
        &self,
        identity: &Identity,
        model_id: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
        cost: &Cost,
        now_unix: i64,
    ) {
        let idx = shard_index(&identity.0);
        let mut shard = self.shards[idx].write().await;

        shard
            .per_identity
            .entry(identity.0.clone())
            .or_default()
            .add(prompt_tokens, completion_tokens, cost);
        shard
            .per_identity_model
            .entry((identity.0.clone(), model_id.to_string()))
            .or_default()
            .add(prompt_tokens, completion_tokens, cost);
        shard
            .per_model
            .entry(model_id.to_string())
            .or_default()
            .add(prompt_tokens, completion_tokens, cost);
        shard
            .per_identity_hour
            .entry((identity.0.clone(), hour_bucket(now_unix)))
            .or_default()
            .add(prompt_tokens, completion_tokens, cost);

        drop(shard);
        self.persist(identity, model_id, now_unix).await;
    }

    async fn persist(&self, identity: &Identity, model_id: &str, now_unix: i64) {
        let Some(store) = &self.store else { return };
        let record = self.identity_usage(identity).await;
        let key = format!("usage:{}:{}:{}", identity.0, model_id, hour_bucket(now_unix));
        if let Ok(bytes) = serde_json::to_vec(&record) {
            let _ = store.set(&key, bytes, Some(Duration::from_secs(7 * 24 * 3600))).await;
        }
    }

    pub async fn identity_usage(&self, identity: &Identity) -> UsageRecord {
        let idx = shard_index(&identity.0);
        self.shards[idx]
            .read()
            .await
            .per_identity
            .get(&identity.0)
            .copied()
            .unwrap_or_default()
    }

    pub async fn identity_model_usage(&self, identity: &Identity, model_id: &str) -> UsageRecord {
        let idx = shard_index(&identity.0);
        self.shards[idx]
            .read()
            .await
            .per_identity_model
            .get(&(identity.0.clone(), model_id.to_string()))
            .copied()
            .unwrap_or_default()
    }

    pub async fn model_usage(&self, model_id: &str) -> UsageRecord {
        // model aggregation is sharded by identity, not model, so it must
        // scan every shard — acceptable since this is an operator-facing
        // read, not on the hot request path.
        let mut total = UsageRecord::default();
        for shard in &self.shards {
            let shard = shard.read().await;
            if let Some(record) = shard.per_model.get(model_id) {
                total.requests += record.requests;
                total.prompt_tokens += record.prompt_tokens;
                total.completion_tokens += record.completion_tokens;
                total.cost_centi_cents += record.cost_centi_cents;
            }
        }
        total
    }

    /// Prunes `per_identity_hour` entries older than 24 hours. Intended to
    /// run on an hourly tick.
    pub async fn prune_older_than_24h(&self, now_unix: i64) {
        let cutoff = hour_bucket(now_unix) - 24 * 3600;
        for shard in &self.shards {
            shard.write().await.per_identity_hour.retain(|(_, hour), _| *hour >= cutoff);
        }
    }

    /// Spawns the hourly pruning tick as a background task.
    pub fn start_pruning_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));
            loop {
                interval.tick().await;
                self.prune_older_than_24h(chrono::Utc::now().timestamp()).await;
            }
        });
    }
}
