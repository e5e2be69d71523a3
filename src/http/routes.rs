//! HTTP handlers. Chat completions run the full
//! `Pipeline::process_chat`; the legacy/embeddings/images endpoints are
//! thinner — they share the token counter, rate limiter, and pricing
//! book directly rather than the chat-specific phase orchestrator, since
//! that pipeline is specified against chat completions alone.

use super::headers::{apply_admission_headers, apply_cost_headers};
use super::sse::chat_stream;
use super::AppState;
use crate::error::{ApiError, ErrorKind};
use crate::pricing::CostCalculator;
use crate::types::{
    ChatCompletionRequest, ChatMessage, CompletionChoice, CompletionRequest, CompletionResponse,
    EmbeddingData, EmbeddingRequest, EmbeddingResponse, FinishReason, ImageData,
    ImageGenerationRequest, ImageGenerationResponse, Identity, ModelListEntry, ModelsListResponse,
    Role, Usage,
};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

fn identity_from_headers(headers: &HeaderMap) -> Result<Identity, ApiError> {
    let raw = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::new(ErrorKind::InvalidApiKey, "missing Authorization header"))?;
    let token = raw
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::new(ErrorKind::InvalidApiKey, "expected a Bearer token"))?;
    if token.trim().is_empty() {
        return Err(ApiError::new(ErrorKind::InvalidApiKey, "empty bearer token"));
    }
    Ok(Identity::from_bearer(token))
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let now = chrono::Utc::now().timestamp();
    let data = state
        .models
        .list()
        .into_iter()
        .map(|m| ModelListEntry {
            id: m.id.clone(),
            object: "model",
            created: now,
            owned_by: "sentra-sim",
        })
        .collect();
    Json(ModelsListResponse { object: "list", data })
}

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    let identity = match identity_from_headers(&headers) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };
    let request_id = Uuid::new_v4().to_string();
    let tier = state.pipeline.resolve_tier(&identity);
    let wants_stream = request.stream;

    let outcome = match state.pipeline.process_chat(&request_id, &identity, &tier, request).await {
        Ok(outcome) => outcome,
        Err(e) => return e.into_response(),
    };

    if wants_stream {
        if let Some(chunks) = outcome.stream {
            let mut response = chat_stream(chunks).into_response();
            apply_admission_headers(response.headers_mut(), &outcome.admission_headers);
            apply_cost_headers(response.headers_mut(), &outcome.cost_headers);
            return response;
        }
    }

    if !outcome.unary_delay.is_zero() {
        tokio::time::sleep(outcome.unary_delay).await;
    }

    let mut response = Json(outcome.response).into_response();
    apply_admission_headers(response.headers_mut(), &outcome.admission_headers);
    apply_cost_headers(response.headers_mut(), &outcome.cost_headers);
    response
}

/// Legacy `/v1/completions`: wraps the prompt as a single user message and
/// reuses the chat pipeline, then reshapes the result into the legacy
/// `text`-based choice schema.
pub async fn completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CompletionRequest>,
) -> Response {
    let identity = match identity_from_headers(&headers) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };
    let request_id = Uuid::new_v4().to_string();
    let tier = state.pipeline.resolve_tier(&identity);

    let chat_request = ChatCompletionRequest {
        model: request.model,
        messages: vec![ChatMessage {
            role: Role::User,
            content: request.prompt,
            function_call: None,
        }],
        temperature: request.temperature,
        top_p: None,
        n: None,
        presence_penalty: None,
        frequency_penalty: None,
        stop: None,
        stream: false,
        max_tokens: request.max_tokens,
        seed: None,
    };

    let outcome = match state.pipeline.process_chat(&request_id, &identity, &tier, chat_request).await {
        Ok(outcome) => outcome,
        Err(e) => return e.into_response(),
    };

    if !outcome.unary_delay.is_zero() {
        tokio::time::sleep(outcome.unary_delay).await;
    }

    let choice = outcome.response.choices.into_iter().next();
    let response = CompletionResponse {
        id: outcome.response.id,
        object: "text_completion",
        created: outcome.response.created,
        model: outcome.response.model,
        choices: vec![CompletionChoice {
            text: choice.as_ref().map(|c| c.message.content.clone()).unwrap_or_default(),
            index: 0,
            finish_reason: choice.map(|c| c.finish_reason).unwrap_or(FinishReason::Stop),
        }],
        usage: outcome.response.usage,
    };

    let mut http_response = Json(response).into_response();
    apply_admission_headers(http_response.headers_mut(), &outcome.admission_headers);
    apply_cost_headers(http_response.headers_mut(), &outcome.cost_headers);
    http_response
}

pub async fn embeddings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<EmbeddingRequest>,
) -> Response {
    if identity_from_headers(&headers).is_err() {
        return ApiError::new(ErrorKind::InvalidApiKey, "missing or empty Authorization header").into_response();
    }

    let model = match state.models.get(&request.model) {
        Some(m) => m.clone(),
        None => {
            return ApiError::new(ErrorKind::ModelNotFound, format!("unknown model {}", request.model))
                .into_response()
        }
    };

    let inputs = request.input.as_vec();
    let mut data = Vec::with_capacity(inputs.len());
    let mut prompt_tokens = 0u32;
    for (index, text) in inputs.iter().enumerate() {
        match state.token_counter.count_text(text, &model.id).await {
            Ok(n) => prompt_tokens += n,
            Err(e) => return ApiError::from(e).into_response(),
        }
        data.push(EmbeddingData {
            object: "embedding",
            index: index as u32,
            embedding: deterministic_embedding(text),
        });
    }

    let calculator = CostCalculator::new(&state.models);
    let cost = match calculator.embedding_cost(&model.id, prompt_tokens) {
        Ok(c) => c,
        Err(e) => return ApiError::from(e).into_response(),
    };

    crate::metrics::record_cost(&model.id, cost.total_usd());
    crate::metrics::record_tokens(&model.id, prompt_tokens, 0);
    crate::metrics::record_outcome(&model.id, "success");

    let response = EmbeddingResponse {
        object: "list",
        data,
        model: model.id.clone(),
        usage: Usage {
            prompt_tokens,
            completion_tokens: 0,
            total_tokens: prompt_tokens,
        },
    };

    let mut http_response = Json(response).into_response();
    http_response.headers_mut().insert("x-sentra-cost-total", format!("{:.6}", cost.total_usd()).parse().unwrap());
    http_response.headers_mut().insert("x-sentra-model", model.id.parse().unwrap());
    http_response
}

/// A fixed-size deterministic pseudo-embedding derived from a seahash of
/// the input text — stable across repeated calls with the same text,
/// with no claim to semantic meaning (this is a simulator, not a model).
fn deterministic_embedding(text: &str) -> Vec<f32> {
    const DIMS: usize = 16;
    let mut seed = seahash::hash(text.as_bytes());
    let mut out = Vec::with_capacity(DIMS);
    for _ in 0..DIMS {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        let value = ((seed >> 40) as i32 as f32) / (i32::MAX as f32);
        out.push(value);
    }
    out
}

pub async fn images_generations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ImageGenerationRequest>,
) -> Response {
    if identity_from_headers(&headers).is_err() {
        return ApiError::new(ErrorKind::InvalidApiKey, "missing or empty Authorization header").into_response();
    }

    let model_id = request.model.clone().unwrap_or_else(|| "dall-e-3".to_string());
    let model = match state.models.get(&model_id) {
        Some(m) => m.clone(),
        None => return ApiError::new(ErrorKind::ModelNotFound, format!("unknown model {model_id}")).into_response(),
    };

    let size = request.size.unwrap_or_else(|| "1024x1024".to_string());
    let hd = request.quality.as_deref() == Some("hd");
    let n = request.n.unwrap_or(1).max(1);

    let calculator = CostCalculator::new(&state.models);
    let cost = match calculator.image_cost(&model.id, &size, hd, n) {
        Ok(c) => c,
        Err(e) => return ApiError::from(e).into_response(),
    };

    if let Some(latency) = latency_for_images(&state, &model) {
        tokio::time::sleep(latency).await;
    }

    crate::metrics::record_cost(&model.id, cost.total_usd());
    crate::metrics::record_outcome(&model.id, "success");

    let response = ImageGenerationResponse {
        created: chrono::Utc::now().timestamp(),
        data: (0..n)
            .map(|i| ImageData {
                url: format!("https://sentra.local/images/{}-{}.png", Uuid::new_v4(), i),
            })
            .collect(),
    };

    let mut http_response = Json(response).into_response();
    http_response.headers_mut().insert("x-sentra-cost-total", format!("{:.6}", cost.total_usd()).parse().unwrap());
    http_response.headers_mut().insert("x-sentra-model", model.id.parse().unwrap());
    http_response
}

fn latency_for_images(state: &AppState, model: &crate::models::ModelDescriptor) -> Option<std::time::Duration> {
    if !state.config.latency_enabled() {
        return None;
    }
    Some(state.pipeline.latency_simulator().compute(model, 0))
}
