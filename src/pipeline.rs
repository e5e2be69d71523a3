//! Request Pipeline: the ordered phase sequence every chat
//! completion request passes through. HTTP handlers (`src/http`) drive
//! this type; it owns no transport concerns itself.

use crate::config::AppConfig;
use crate::error::{ApiError, ErrorKind};
use crate::error_injector::ErrorInjector;
use crate::generator::{build_stream_chunks, ResponseGenerator};
use crate::kv::KvStore;
use crate::latency::{LatencyConfig, LatencySimulator};
use crate::models::ModelRegistry;
use crate::pricing::CostCalculator;
use crate::rate_limiter::{LimitingFactor, RateLimiter, format_reset};
use crate::tiers::{TierBinding, TierRegistry};
use crate::token_counter::CachedTokenCounter;
use crate::types::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, Identity};
use crate::usage::UsageTracker;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Admission-relevant rate-limit headers, present on every
/// outcome — success or rejection.
#[derive(Debug, Clone)]
pub struct AdmissionHeaders {
    pub limit_requests: u32,
    pub remaining_requests: String,
    pub reset_requests: String,
    pub limit_tokens: u32,
    pub remaining_tokens: String,
    pub reset_tokens: String,
}

/// Cost/usage headers, present only on success.
#[derive(Debug, Clone)]
pub struct CostHeaders {
    pub cost_total: String,
    pub cost_currency: &'static str,
    pub cost_input: String,
    pub cost_output: String,
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub tokens_total: u32,
    pub model: String,
}

pub struct ChatOutcome {
    pub response: ChatCompletionResponse,
    pub admission_headers: AdmissionHeaders,
    pub cost_headers: CostHeaders,
    /// Unary: a single wait. Streaming: per-chunk delay vector alongside
    /// each frame, role-chunk first, terminal finish-reason chunk last.
    pub stream: Option<Vec<(ChatCompletionChunk, Duration)>>,
    pub unary_delay: Duration,
}

pub struct Pipeline<S: KvStore> {
    pub config: Arc<AppConfig>,
    pub models: Arc<ModelRegistry>,
    pub token_counter: Arc<CachedTokenCounter<S>>,
    pub rate_limiter: Arc<RateLimiter<S>>,
    pub tiers: Arc<TierRegistry>,
    pub tier_binding: Arc<TierBinding>,
    pub latency: Arc<LatencySimulator>,
    pub error_injector: Arc<ErrorInjector>,
    pub generator: Arc<ResponseGenerator<S>>,
    pub usage: Arc<UsageTracker<S>>,
}

impl<S: KvStore> Pipeline<S> {
    pub fn latency_simulator(&self) -> Arc<LatencySimulator> {
        self.latency.clone()
    }

    /// Resolves an identity to its bound tier, falling back to the
    /// registry's default tier when the identity has no explicit binding.
    pub fn resolve_tier(&self, identity: &Identity) -> String {
        self.tier_binding.tier_for(identity)
    }

    /// Runs the middle phases of the request pipeline for
    /// `/v1/chat/completions`: parse/validate, token estimation, rate
    /// check, error injection, response selection, latency, and cost
    /// accounting. Admission/request-id/span setup and final emit/
    /// metrics/log are the HTTP layer's responsibility since they're
    /// transport-shaped.
    pub async fn process_chat(
        &self,
        request_id: &str,
        identity: &Identity,
        tier: &str,
        request: ChatCompletionRequest,
    ) -> Result<ChatOutcome, ApiError> {
        let processing_started = Instant::now();
        // Phase 2: parse & validate.
        request.validate().map_err(|reason| ApiError::new(ErrorKind::InvalidRequestError, reason))?;
        let model = self
            .models
            .get(&request.model)
            .ok_or_else(|| ApiError::new(ErrorKind::ModelNotFound, format!("unknown model {}", request.model)))?
            .clone();

        // Phase 3: token estimation.
        let prompt_tokens = self
            .token_counter
            .count_chat(&request.messages, &model.id)
            .await
            .map_err(ApiError::from)?;
        let projected_output = self
            .token_counter
            .effective_output_budget(request.max_tokens, &model.id)
            .map_err(ApiError::from)?;
        self.token_counter
            .validate_context(prompt_tokens, projected_output, &model.id)
            .map_err(|_| {
                ApiError::new(
                    ErrorKind::ContextLengthExceeded,
                    format!(
                        "input tokens ({prompt_tokens}) + max_tokens ({projected_output}) exceeds {}'s context window",
                        model.id
                    ),
                )
            })?;
        let estimated_total = prompt_tokens + projected_output;

        // Phase 4: rate check.
        let admission = if self.config.rate_limiting_enabled() {
            self.rate_limiter.admit(identity, &model.id, tier, estimated_total).await
        } else {
            crate::rate_limiter::AdmissionResult {
                allowed: true,
                limiting_factor: LimitingFactor::None,
                remaining_requests: 0.0,
                remaining_tokens: 0.0,
                reset_in_requests: 0.0,
                reset_in_tokens: 0.0,
                limit_requests: 0,
                limit_tokens: 0,
            }
        };

        let admission_headers = AdmissionHeaders {
            limit_requests: admission.limit_requests,
            remaining_requests: format!("{:.0}", admission.remaining_requests),
            reset_requests: format_reset(admission.reset_in_requests),
            limit_tokens: admission.limit_tokens,
            remaining_tokens: format!("{:.0}", admission.remaining_tokens),
            reset_tokens: format_reset(admission.reset_in_tokens),
        };

        if !admission.allowed {
            let factor = match admission.limiting_factor {
                LimitingFactor::Tokens => "tokens",
                _ => "requests",
            };
            crate::metrics::record_rate_limit_rejection(&model.id, factor);
            let retry_after = match admission.limiting_factor {
                LimitingFactor::Requests => admission.reset_in_requests.ceil() as u64,
                LimitingFactor::Tokens => admission.reset_in_tokens.ceil() as u64,
                LimitingFactor::None => 1,
            };
            warn!(%request_id, model = %model.id, factor, "rate limit rejection");
            return Err(ApiError::new(ErrorKind::RateLimitExceeded, "rate limit exceeded")
                .with_retry_after(retry_after)
                .with_limiting_factor(factor));
        }

        // Phase 5: error injection. Already-consumed rate-limit capacity
        // is *not* refunded here — simulation errors match production
        // semantics of a failed downstream call still counting against
        // quota.
        let quota_fraction = if admission.limit_tokens > 0 {
            1.0 - (admission.remaining_tokens / admission.limit_tokens as f64)
        } else {
            0.0
        };
        if self.config.error_injection_enabled() {
            if let Some(injected) = self.error_injector.maybe_inject(quota_fraction) {
                let kind = injected.into_kind();
                crate::metrics::record_injected_error(&model.id, &format!("{kind:?}"));
                warn!(%request_id, model = %model.id, ?kind, "injected error");
                return Err(ApiError::new(kind, "simulated failure").with_retry_after(2));
            }
        }

        // Phase 6: response selection.
        let now_unix = chrono::Utc::now().timestamp();
        let generated = self
            .generator
            .generate(&request, &model, request_id, now_unix)
            .await
            .map_err(ApiError::from)?;
        let response = generated.response;
        let cache_reduction = if generated.cache_hit {
            self.generator.cache_latency_reduction()
        } else {
            0.0
        };

        // Phase 7: latency realization. A response-cache hit applies a
        // small fixed latency reduction on top of the normal simulated
        // delay rather than skipping it outright.
        let completion_tokens = response.usage.completion_tokens;
        let (unary_delay, stream) = if self.config.latency_enabled() {
            if request.stream {
                let chunks = build_stream_chunks(&response, request_id);
                let delays = self.latency.compute_streaming(&model, chunks.len());
                let delays = delays
                    .into_iter()
                    .map(|d| LatencySimulator::apply_cache_reduction(d, cache_reduction));
                (Duration::ZERO, Some(chunks.into_iter().zip(delays).collect()))
            } else {
                let delay = self.latency.compute(&model, completion_tokens);
                let delay = LatencySimulator::apply_cache_reduction(delay, cache_reduction);
                (delay, None)
            }
        } else if request.stream {
            let chunks = build_stream_chunks(&response, request_id);
            (Duration::ZERO, Some(chunks.into_iter().map(|c| (c, Duration::ZERO)).collect()))
        } else {
            (Duration::ZERO, None)
        };

        let simulated_latency_secs = match &stream {
            Some(chunks) => chunks.iter().map(|(_, d)| d.as_secs_f64()).sum(),
            None => unary_delay.as_secs_f64(),
        };
        crate::metrics::observe_simulated_latency(&model.id, request.stream, simulated_latency_secs);

        // Phase 8: cost accounting.
        let calculator = CostCalculator::new(&self.models);
        let cost = calculator
            .chat_cost(&model.id, response.usage.prompt_tokens, response.usage.completion_tokens, 0)
            .map_err(ApiError::from)?;

        self.usage
            .record(identity, &model.id, response.usage.prompt_tokens, response.usage.completion_tokens, &cost, now_unix)
            .await;

        crate::metrics::record_cost(&model.id, cost.total_usd());
        crate::metrics::record_tokens(&model.id, response.usage.prompt_tokens, response.usage.completion_tokens);
        crate::metrics::record_outcome(&model.id, "success");

        info!(
            %request_id,
            model = %model.id,
            fixture_id = %generated.fixture_id,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            cost_usd = cost.total_usd(),
            "request completed"
        );

        let cost_headers = CostHeaders {
            cost_total: format!("{:.6}", cost.total_usd()),
            cost_currency: "USD",
            cost_input: format!("{:.6}", cost.input_usd),
            cost_output: format!("{:.6}", cost.output_usd),
            tokens_input: response.usage.prompt_tokens,
            tokens_output: response.usage.completion_tokens,
            tokens_total: response.usage.total_tokens,
            model: model.id.clone(),
        };

        crate::metrics::observe_processing_duration(&model.id, processing_started.elapsed().as_secs_f64());

        Ok(ChatOutcome {
            response,
            admission_headers,
            cost_headers,
            stream,
            unary_delay,
        })
    }
}
