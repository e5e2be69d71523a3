use sentra_core::kv::InMemoryKv;
use sentra_core::models::ModelRegistry;
use sentra_core::token_counter::{CachedTokenCounter, FastEstimator, TokenCounter};
use sentra_core::types::{ChatMessage, Role};
use std::sync::Arc;
use std::time::Duration;

fn counter() -> TokenCounter {
    TokenCounter::new(Arc::new(ModelRegistry::with_defaults()))
}

fn msg(role: Role, content: &str) -> ChatMessage {
    ChatMessage { role, content: content.to_string(), function_call: None }
}

#[test]
fn count_chat_is_deterministic() {
    let counter = counter();
    let messages = vec![
        msg(Role::System, "You are a helpful assistant."),
        msg(Role::User, "What is the capital of France?"),
    ];
    let a = counter.count_chat(&messages, "gpt-4o").unwrap();
    let b = counter.count_chat(&messages, "gpt-4o").unwrap();
    assert_eq!(a, b);
    assert!(a > 0);
}

#[test]
fn longer_content_never_counts_fewer_tokens() {
    let counter = counter();
    let short = vec![msg(Role::User, "hi")];
    let long = vec![msg(Role::User, "hi there, this is a much longer message with many more words in it")];
    let short_count = counter.count_chat(&short, "gpt-4o").unwrap();
    let long_count = counter.count_chat(&long, "gpt-4o").unwrap();
    assert!(long_count > short_count);
}

#[test]
fn count_text_matches_plain_encoding_without_chat_framing() {
    let counter = counter();
    let chat_tokens = counter.count_chat(&[msg(Role::User, "hello world")], "gpt-4o").unwrap();
    let text_tokens = counter.count_text("hello world", "gpt-4o").unwrap();
    // The chat framing adds role markers and an assistant-priming suffix,
    // so it must always cost strictly more than the bare text encoding.
    assert!(chat_tokens > text_tokens);
}

#[test]
fn unknown_model_is_an_error() {
    let counter = counter();
    assert!(counter.count_chat(&[msg(Role::User, "hi")], "not-a-real-model").is_err());
}

#[test]
fn effective_output_budget_clamps_to_model_max() {
    let counter = counter();
    let budget = counter.effective_output_budget(Some(999_999), "gpt-4o-mini").unwrap();
    assert_eq!(budget, 16_384);
    let default_budget = counter.effective_output_budget(None, "gpt-4o-mini").unwrap();
    assert_eq!(default_budget, 16_384);
}

#[test]
fn validate_context_rejects_overflow() {
    let counter = counter();
    assert!(counter.validate_context(10, 10, "gpt-4o").is_ok());
    assert!(counter.validate_context(200_000, 1, "gpt-4o").is_err());
}

#[test]
fn fast_estimator_is_a_rough_lower_cost_approximation() {
    let messages = vec![msg(Role::User, "a reasonably sized message body for estimating")];
    let estimate = FastEstimator::estimate_chat(&messages);
    assert!(estimate > 0);
}

fn cached_counter() -> CachedTokenCounter<InMemoryKv> {
    CachedTokenCounter::new(counter(), InMemoryKv::new(), Duration::from_secs(60))
}

#[tokio::test]
async fn cached_count_chat_matches_the_uncached_result() {
    let cached = cached_counter();
    let messages = vec![msg(Role::User, "what is the capital of France?")];
    let direct = counter().count_chat(&messages, "gpt-4o").unwrap();
    let first = cached.count_chat(&messages, "gpt-4o").await.unwrap();
    let second = cached.count_chat(&messages, "gpt-4o").await.unwrap();
    assert_eq!(first, direct);
    assert_eq!(first, second);
}

#[tokio::test]
async fn cached_count_text_is_keyed_separately_from_count_chat() {
    let cached = cached_counter();
    let text_count = cached.count_text("hello world", "gpt-4o").await.unwrap();
    let chat_count = cached
        .count_chat(&[msg(Role::User, "hello world")], "gpt-4o")
        .await
        .unwrap();
    assert_ne!(text_count, chat_count);
    // Re-fetching returns the same cached value rather than a collision
    // from the chat-keyed entry.
    assert_eq!(cached.count_text("hello world", "gpt-4o").await.unwrap(), text_count);
}

#[tokio::test]
async fn cached_unknown_model_still_errors() {
    let cached = cached_counter();
    assert!(cached.count_chat(&[msg(Role::User, "hi")], "not-a-real-model").await.is_err());
}
