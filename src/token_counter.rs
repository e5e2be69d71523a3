//! Exact per-model token counting built on `tiktoken-rs`.

use crate::error::TokenCountError;
use crate::kv::KvStore;
use crate::models::ModelRegistry;
use crate::types::{ChatMessage, Role};
use std::sync::Arc;
use std::time::Duration;
use tiktoken_rs::CoreBPE;

fn bpe_for_encoding(encoding: &str) -> Result<CoreBPE, TokenCountError> {
    match encoding {
        "cl100k_base" => tiktoken_rs::cl100k_base(),
        "o200k_base" => tiktoken_rs::o200k_base(),
        "p50k_base" => tiktoken_rs::p50k_base(),
        "r50k_base" | "gpt2" => tiktoken_rs::r50k_base(),
        other => return Err(TokenCountError::UnknownEncoding(other.to_string())),
    }
    .map_err(|e| TokenCountError::Tokenizer(e.to_string()))
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
        Role::Function => "function",
    }
}

/// The exact counter. One `CoreBPE` per encoding name, built lazily and
/// reused across requests — `tiktoken-rs` BPE construction is not cheap.
pub struct TokenCounter {
    registry: Arc<ModelRegistry>,
    bpe_cache: std::sync::RwLock<std::collections::HashMap<String, Arc<CoreBPE>>>,
}

impl TokenCounter {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            bpe_cache: std::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }

    fn bpe(&self, encoding: &str) -> Result<Arc<CoreBPE>, TokenCountError> {
        if let Some(bpe) = self.bpe_cache.read().unwrap().get(encoding) {
            return Ok(bpe.clone());
        }
        let bpe = Arc::new(bpe_for_encoding(encoding)?);
        self.bpe_cache
            .write()
            .unwrap()
            .insert(encoding.to_string(), bpe.clone());
        Ok(bpe)
    }

    /// Formats one message as `<|im_start|>role\n{content}<|im_end|>\n`
    /// and counts its tokens exactly, rather than relying on the
    /// constant-overhead `tokens_per_message` approximation — production
    /// parity is the point here.
    pub fn count_chat(&self, messages: &[ChatMessage], model_id: &str) -> Result<u32, TokenCountError> {
        let model = self
            .registry
            .get(model_id)
            .ok_or_else(|| TokenCountError::UnknownEncoding(model_id.to_string()))?;
        let bpe = self.bpe(&model.encoding)?;

        let mut text = String::new();
        for message in messages {
            text.push_str("<|im_start|>");
            text.push_str(role_str(message.role));
            text.push('\n');
            text.push_str(&message.content);
            text.push_str("<|im_end|>\n");
        }
        text.push_str("<|im_start|>assistant\n");

        Ok(bpe.encode_with_special_tokens(&text).len() as u32)
    }

    pub fn count_text(&self, text: &str, model_id: &str) -> Result<u32, TokenCountError> {
        let model = self
            .registry
            .get(model_id)
            .ok_or_else(|| TokenCountError::UnknownEncoding(model_id.to_string()))?;
        let bpe = self.bpe(&model.encoding)?;
        Ok(bpe.encode_ordinary(text).len() as u32)
    }

    /// min(requested, model max); 0 (or absent) means "take the maximum".
    pub fn effective_output_budget(&self, requested: Option<u32>, model_id: &str) -> Result<u32, TokenCountError> {
        let model = self
            .registry
            .get(model_id)
            .ok_or_else(|| TokenCountError::UnknownEncoding(model_id.to_string()))?;
        Ok(match requested {
            None | Some(0) => model.max_output_tokens,
            Some(n) => n.min(model.max_output_tokens),
        })
    }

    pub fn validate_context(
        &self,
        input_tokens: u32,
        output_tokens: u32,
        model_id: &str,
    ) -> Result<(), TokenCountError> {
        let model = self
            .registry
            .get(model_id)
            .ok_or_else(|| TokenCountError::UnknownEncoding(model_id.to_string()))?;
        if input_tokens + output_tokens > model.context_window {
            return Err(TokenCountError::Tokenizer(format!(
                "context length exceeded: {} input + {} output > {} window",
                input_tokens, output_tokens, model.context_window
            )));
        }
        Ok(())
    }
}

/// Cache-key hash over (model, role, content)* — a best-effort speedup
/// that must never change correctness.
fn cache_key(model_id: &str, messages: &[ChatMessage]) -> String {
    let mut buf = String::with_capacity(64 + messages.len() * 16);
    buf.push_str(model_id);
    for message in messages {
        buf.push('\u{1}');
        buf.push_str(role_str(message.role));
        buf.push('\u{1}');
        buf.push_str(&message.content);
    }
    format!("tokcount:{:016x}", seahash::hash(buf.as_bytes()))
}

/// Wraps `TokenCounter` with a best-effort cache in the Key-Value Store.
/// A cache miss or store failure always falls back to recomputation —
/// never to a wrong answer.
pub struct CachedTokenCounter<S: KvStore> {
    inner: TokenCounter,
    store: Arc<S>,
    ttl: Duration,
}

impl<S: KvStore> CachedTokenCounter<S> {
    pub fn new(inner: TokenCounter, store: Arc<S>, ttl: Duration) -> Self {
        Self { inner, store, ttl }
    }

    pub async fn count_chat(
        &self,
        messages: &[ChatMessage],
        model_id: &str,
    ) -> Result<u32, TokenCountError> {
        let key = cache_key(model_id, messages);
        if let Ok(Some(bytes)) = self.store.get(&key).await {
            if let Ok(text) = std::str::from_utf8(&bytes) {
                if let Ok(n) = text.parse::<u32>() {
                    return Ok(n);
                }
            }
        }

        let count = self.inner.count_chat(messages, model_id)?;
        let _ = self
            .store
            .set(&key, count.to_string().into_bytes(), Some(self.ttl))
            .await;
        Ok(count)
    }

    /// Cached text-only counting, for fixture-content and embedding-input
    /// counts that recur across requests (e.g. the same fixture text
    /// priced repeatedly). Keyed separately from `count_chat` so the two
    /// never collide.
    pub async fn count_text(&self, text: &str, model_id: &str) -> Result<u32, TokenCountError> {
        let key = format!("tokcount:text:{:016x}", seahash::hash(format!("{model_id}\u{1}{text}").as_bytes()));
        if let Ok(Some(bytes)) = self.store.get(&key).await {
            if let Ok(s) = std::str::from_utf8(&bytes) {
                if let Ok(n) = s.parse::<u32>() {
                    return Ok(n);
                }
            }
        }

        let count = self.inner.count_text(text, model_id)?;
        let _ = self
            .store
            .set(&key, count.to_string().into_bytes(), Some(self.ttl))
            .await;
        Ok(count)
    }

    pub fn effective_output_budget(&self, requested: Option<u32>, model_id: &str) -> Result<u32, TokenCountError> {
        self.inner.effective_output_budget(requested, model_id)
    }

    pub fn validate_context(&self, input_tokens: u32, output_tokens: u32, model_id: &str) -> Result<(), TokenCountError> {
        self.inner.validate_context(input_tokens, output_tokens, model_id)
    }
}

/// A path-independent character-based estimator for pre-validation use
/// only — this must never back the rate limiter in production-parity
/// mode.
pub struct FastEstimator;

impl FastEstimator {
    const PER_MESSAGE_OVERHEAD: u32 = 4;

    pub fn estimate_chat(messages: &[ChatMessage]) -> u32 {
        messages
            .iter()
            .map(|m| (m.content.len() as u32) / 4 + Self::PER_MESSAGE_OVERHEAD)
            .sum()
    }

    pub fn estimate_text(text: &str) -> u32 {
        (text.len() as u32) / 4
    }
}
