//! Response Generator: given a validated request, selects a
//! fixture, counts tokens, and assembles the response envelope (unary or
//! the chunk sequence for streaming). Optionally backed by a response
//! cache, keyed separately from the token
//! counter's own cache.

use crate::error::FixtureError;
use crate::fixtures::matcher::Matcher;
use crate::fixtures::{Fixture, FixtureStore};
use crate::kv::KvStore;
use crate::models::ModelDescriptor;
use crate::token_counter::CachedTokenCounter;
use crate::types::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Choice,
    ChunkChoice, Delta, FunctionCall, Role, Usage,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Roughly groups realized output into ~3-token chunks for streaming.
const STREAM_CHUNK_TOKENS: usize = 3;

pub struct GeneratedResponse {
    pub response: ChatCompletionResponse,
    pub fixture_id: String,
    /// Whether this response was served from the response cache rather
    /// than freshly generated — the pipeline applies the latency
    /// simulator's small cache-assisted reduction when true.
    pub cache_hit: bool,
}

/// Response-cache tuning: TTL default one hour, plus the
/// latency reduction the cache hit advertises through the latency
/// simulator.
#[derive(Debug, Clone, Copy)]
pub struct ResponseCacheConfig {
    pub enabled: bool,
    pub ttl: Duration,
    pub latency_reduction: f64,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: Duration::from_secs(3600),
            latency_reduction: 0.10,
        }
    }
}

/// The subset of a generated response that's worth caching — fresh `id`
/// and `created` are stamped back on at read time so repeated hits still
/// look like distinct requests to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedGeneration {
    fixture_id: String,
    role: Role,
    content: String,
    function_call: Option<FunctionCall>,
    finish_reason: crate::types::FinishReason,
    prompt_tokens: u32,
    completion_tokens: u32,
}

fn response_cache_key(model_id: &str, request: &ChatCompletionRequest) -> String {
    let mut buf = String::with_capacity(64 + request.messages.len() * 16);
    buf.push_str(model_id);
    buf.push('\u{1}');
    for message in &request.messages {
        buf.push_str(&format!("{:?}", message.role));
        buf.push('\u{1}');
        buf.push_str(&message.content);
        buf.push('\u{1}');
    }
    buf.push_str(&format!("{:?}\u{1}{:?}", request.temperature, request.max_tokens));
    format!("respcache:{:016x}", seahash::hash(buf.as_bytes()))
}

/// A request is excluded from response caching when it already carries a
/// function call in its history — determinism there risks hiding bugs
/// rather than speeding up repeat traffic.
fn is_function_call_request(request: &ChatCompletionRequest) -> bool {
    request.messages.iter().any(|m| m.function_call.is_some())
}

pub struct ResponseGenerator<S: KvStore> {
    fixtures: Arc<FixtureStore>,
    matcher: Matcher,
    token_counter: Arc<CachedTokenCounter<S>>,
    cache_store: Option<Arc<S>>,
    cache_config: ResponseCacheConfig,
}

impl<S: KvStore> ResponseGenerator<S> {
    pub fn new(fixtures: Arc<FixtureStore>, matcher: Matcher, token_counter: Arc<CachedTokenCounter<S>>) -> Self {
        Self {
            fixtures,
            matcher,
            token_counter,
            cache_store: None,
            cache_config: ResponseCacheConfig::default(),
        }
    }

    pub fn with_response_cache(mut self, store: Arc<S>, config: ResponseCacheConfig) -> Self {
        self.cache_store = Some(store);
        self.cache_config = config;
        self
    }

    fn select_fixture(&self, request: &ChatCompletionRequest) -> Result<&Fixture, FixtureError> {
        let path = self.matcher.match_path(&request.matchable_text());
        match request.seed {
            Some(seed) => self.fixtures.seeded(path, seed),
            None => self.fixtures.weighted_random(path),
        }
    }

    fn role_for(&self, fixture: &Fixture) -> Role {
        match fixture.role.as_str() {
            "user" => Role::User,
            "system" => Role::System,
            "function" => Role::Function,
            _ => Role::Assistant,
        }
    }

    fn cache_usable(&self, request: &ChatCompletionRequest) -> bool {
        self.cache_config.enabled && self.cache_store.is_some() && !is_function_call_request(request)
    }

    async fn cache_lookup(&self, model_id: &str, request: &ChatCompletionRequest) -> Option<CachedGeneration> {
        let store = self.cache_store.as_ref()?;
        let key = response_cache_key(model_id, request);
        let bytes = store.get(&key).await.ok().flatten()?;
        serde_json::from_slice(&bytes).ok()
    }

    async fn cache_store(&self, model_id: &str, request: &ChatCompletionRequest, generation: &CachedGeneration) {
        let Some(store) = &self.cache_store else { return };
        let key = response_cache_key(model_id, request);
        if let Ok(bytes) = serde_json::to_vec(generation) {
            let _ = store.set(&key, bytes, Some(self.cache_config.ttl)).await;
        }
    }

    /// Returns the cache's latency reduction, for callers that got a
    /// cache hit out of `generate` and want to shrink the simulated delay.
    pub fn cache_latency_reduction(&self) -> f64 {
        self.cache_config.latency_reduction
    }

    fn envelope(
        &self,
        request: &ChatCompletionRequest,
        request_id: &str,
        now_unix: i64,
        generation: &CachedGeneration,
    ) -> ChatCompletionResponse {
        let message = ChatMessage {
            role: generation.role,
            content: generation.content.clone(),
            function_call: generation.function_call.clone(),
        };
        ChatCompletionResponse {
            id: format!("chatcmpl-{request_id}"),
            object: "chat.completion",
            created: now_unix,
            model: request.model.clone(),
            choices: vec![Choice {
                index: 0,
                message,
                finish_reason: generation.finish_reason,
            }],
            usage: Usage {
                prompt_tokens: generation.prompt_tokens,
                completion_tokens: generation.completion_tokens,
                total_tokens: generation.prompt_tokens + generation.completion_tokens,
            },
        }
    }

    /// Assembles the unary response envelope and returns it alongside the
    /// selected fixture's id (for logging/metrics). Checks the response
    /// cache first when enabled and eligible; a hit skips
    /// fixture matching and token counting entirely.
    pub async fn generate(
        &self,
        request: &ChatCompletionRequest,
        model: &ModelDescriptor,
        request_id: &str,
        now_unix: i64,
    ) -> Result<GeneratedResponse, FixtureError> {
        if self.cache_usable(request) {
            if let Some(cached) = self.cache_lookup(&model.id, request).await {
                return Ok(GeneratedResponse {
                    response: self.envelope(request, request_id, now_unix, &cached),
                    fixture_id: cached.fixture_id,
                    cache_hit: true,
                });
            }
        }

        let fixture = self.select_fixture(request)?;

        let prompt_tokens = self
            .token_counter
            .count_chat(&request.messages, &model.id)
            .await
            .unwrap_or(0);
        let completion_tokens = self
            .token_counter
            .count_text(&fixture.content, &model.id)
            .await
            .unwrap_or(0);

        let generation = CachedGeneration {
            fixture_id: fixture.id.clone(),
            role: self.role_for(fixture),
            content: fixture.content.clone(),
            function_call: fixture
                .function_call
                .as_ref()
                .map(|(name, arguments)| FunctionCall {
                    name: name.clone(),
                    arguments: arguments.clone(),
                }),
            finish_reason: fixture.finish_reason,
            prompt_tokens,
            completion_tokens,
        };

        if self.cache_usable(request) {
            self.cache_store(&model.id, request, &generation).await;
        }

        Ok(GeneratedResponse {
            response: self.envelope(request, request_id, now_unix, &generation),
            fixture_id: generation.fixture_id,
            cache_hit: false,
        })
    }

}

/// Splits realized fixture content into the chunk sequence a streaming
/// response emits: one role-only chunk, N content chunks of
/// ~`STREAM_CHUNK_TOKENS` words each, then one empty-delta finish-reason
/// chunk. Word-splitting approximates token grouping without re-running
/// the tokenizer per chunk. A free function (not tied to any `S`) since it
/// only transforms an already-assembled response.
pub fn build_stream_chunks(response: &ChatCompletionResponse, request_id: &str) -> Vec<ChatCompletionChunk> {
    let choice = &response.choices[0];
    let words: Vec<&str> = choice.message.content.split_whitespace().collect();
    let mut chunks = Vec::new();

    chunks.push(ChatCompletionChunk {
        id: response.id.clone(),
        object: "chat.completion.chunk",
        created: response.created,
        model: response.model.clone(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: Delta {
                role: Some(Role::Assistant),
                content: None,
            },
            finish_reason: None,
        }],
    });

    let word_groups: Vec<&[&str]> = words.chunks(STREAM_CHUNK_TOKENS).collect();
    let last_group = word_groups.len().saturating_sub(1);
    for (i, group) in word_groups.into_iter().enumerate() {
        let mut text = group.join(" ");
        if i != last_group {
            text.push(' ');
        }
        chunks.push(ChatCompletionChunk {
            id: response.id.clone(),
            object: "chat.completion.chunk",
            created: response.created,
            model: response.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: Delta {
                    role: None,
                    content: Some(text),
                },
                finish_reason: None,
            }],
        });
    }

    chunks.push(ChatCompletionChunk {
        id: response.id.clone(),
        object: "chat.completion.chunk",
        created: response.created,
        model: response.model.clone(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: Delta {
                role: None,
                content: None,
            },
            finish_reason: Some(choice.finish_reason),
        }],
    });

    let _ = request_id; // id is already embedded per-chunk from response.id
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Choice, FinishReason, Usage};

    fn response_with_content(content: &str) -> ChatCompletionResponse {
        ChatCompletionResponse {
            id: "chatcmpl-test".to_string(),
            object: "chat.completion",
            created: 0,
            model: "gpt-4o".to_string(),
            choices: vec![Choice {
                index: 0,
                message: ChatMessage {
                    role: Role::Assistant,
                    content: content.to_string(),
                    function_call: None,
                },
                finish_reason: FinishReason::Stop,
            }],
            usage: Usage { prompt_tokens: 0, completion_tokens: 0, total_tokens: 0 },
        }
    }

    /// The concatenation of content deltas must equal the fixture's
    /// content exactly, with no stray separators.
    #[test]
    fn concatenated_content_deltas_reconstruct_the_source_text() {
        let content = "Hello world, this is a longer fixture body to exercise multiple chunks";
        let response = response_with_content(content);
        let chunks = build_stream_chunks(&response, "req-1");

        let reconstructed: String = chunks
            .iter()
            .filter_map(|c| c.choices[0].delta.content.clone())
            .collect();
        assert_eq!(reconstructed, content);
    }

    #[test]
    fn first_chunk_is_role_only_and_last_chunk_carries_the_finish_reason() {
        let response = response_with_content("short reply");
        let chunks = build_stream_chunks(&response, "req-2");

        let first = &chunks[0].choices[0];
        assert_eq!(first.delta.role, Some(Role::Assistant));
        assert!(first.delta.content.is_none());
        assert!(first.finish_reason.is_none());

        let last = &chunks.last().unwrap().choices[0];
        assert!(last.delta.content.is_none());
        assert_eq!(last.finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn empty_content_still_yields_role_and_finish_chunks() {
        let mut response = response_with_content("");
        response.choices[0].finish_reason = FinishReason::FunctionCall;
        let chunks = build_stream_chunks(&response, "req-3");
        assert_eq!(chunks.len(), 2);
    }
}
