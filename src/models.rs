//! Model descriptors: context window, pricing, and latency profile per
//! model id, plus the fixed per-message token overhead the exact token
//! counter adds on top of encoded content.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Capabilities {
    pub vision: bool,
    pub function_calling: bool,
    pub json_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePricing {
    /// size -> (standard_price, hd_price)
    pub by_size: HashMap<String, (f64, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub context_window: u32,
    pub max_output_tokens: u32,
    pub encoding: String,
    pub capabilities: Capabilities,

    // Latency profile
    pub base_latency_ms: f64,
    pub per_token_latency_ms: f64,
    pub jitter_percent: f64,
    pub min_latency_ms: Option<f64>,
    pub max_latency_ms: Option<f64>,

    // Pricing ($ per 1M tokens)
    pub input_per_1m: f64,
    pub output_per_1m: f64,
    pub cached_input_per_1m: Option<f64>,
    pub image_pricing: Option<ImagePricing>,

    /// Fixed per-message token overhead the exact counter adds on top of
    /// encoded content.
    pub tokens_per_message: usize,
}

impl ModelDescriptor {
    pub fn min_latency(&self) -> f64 {
        self.min_latency_ms.unwrap_or(self.base_latency_ms * 0.3)
    }

    pub fn max_latency(&self) -> f64 {
        self.max_latency_ms.unwrap_or(
            self.base_latency_ms + self.per_token_latency_ms * self.max_output_tokens as f64 * 3.0,
        )
    }
}

fn tiktoken_encoding_for(model_id: &str) -> &'static str {
    if model_id.starts_with("gpt-4") || model_id.starts_with("gpt-3.5") {
        "cl100k_base"
    } else {
        "o200k_base"
    }
}

fn preset_table() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor {
            id: "gpt-4o".to_string(),
            context_window: 128_000,
            max_output_tokens: 16_384,
            encoding: tiktoken_encoding_for("gpt-4o").to_string(),
            capabilities: Capabilities {
                vision: true,
                function_calling: true,
                json_mode: true,
            },
            base_latency_ms: 400.0,
            per_token_latency_ms: 15.0,
            jitter_percent: 0.15,
            min_latency_ms: None,
            max_latency_ms: None,
            input_per_1m: 2.50,
            output_per_1m: 10.00,
            cached_input_per_1m: Some(1.25),
            image_pricing: None,
            tokens_per_message: 3,
        },
        ModelDescriptor {
            id: "gpt-4o-mini".to_string(),
            context_window: 128_000,
            max_output_tokens: 16_384,
            encoding: tiktoken_encoding_for("gpt-4o-mini").to_string(),
            capabilities: Capabilities {
                vision: true,
                function_calling: true,
                json_mode: true,
            },
            base_latency_ms: 180.0,
            per_token_latency_ms: 6.0,
            jitter_percent: 0.10,
            min_latency_ms: None,
            max_latency_ms: None,
            input_per_1m: 0.15,
            output_per_1m: 0.60,
            cached_input_per_1m: Some(0.075),
            image_pricing: None,
            tokens_per_message: 3,
        },
        ModelDescriptor {
            id: "gpt-4-turbo".to_string(),
            context_window: 128_000,
            max_output_tokens: 4_096,
            encoding: "cl100k_base".to_string(),
            capabilities: Capabilities {
                vision: true,
                function_calling: true,
                json_mode: true,
            },
            base_latency_ms: 550.0,
            per_token_latency_ms: 22.0,
            jitter_percent: 0.18,
            min_latency_ms: None,
            max_latency_ms: None,
            input_per_1m: 10.00,
            output_per_1m: 30.00,
            cached_input_per_1m: None,
            image_pricing: None,
            tokens_per_message: 3,
        },
        ModelDescriptor {
            id: "gpt-3.5-turbo".to_string(),
            context_window: 16_385,
            max_output_tokens: 4_096,
            encoding: "cl100k_base".to_string(),
            capabilities: Capabilities {
                vision: false,
                function_calling: true,
                json_mode: true,
            },
            base_latency_ms: 120.0,
            per_token_latency_ms: 5.0,
            jitter_percent: 0.10,
            min_latency_ms: None,
            max_latency_ms: None,
            input_per_1m: 0.50,
            output_per_1m: 1.50,
            cached_input_per_1m: None,
            image_pricing: None,
            tokens_per_message: 4,
        },
        ModelDescriptor {
            id: "text-embedding-3-small".to_string(),
            context_window: 8_191,
            max_output_tokens: 0,
            encoding: "cl100k_base".to_string(),
            capabilities: Capabilities::default(),
            base_latency_ms: 60.0,
            per_token_latency_ms: 0.5,
            jitter_percent: 0.08,
            min_latency_ms: None,
            max_latency_ms: None,
            input_per_1m: 0.02,
            output_per_1m: 0.0,
            cached_input_per_1m: None,
            image_pricing: None,
            tokens_per_message: 0,
        },
        ModelDescriptor {
            id: "text-embedding-3-large".to_string(),
            context_window: 8_191,
            max_output_tokens: 0,
            encoding: "cl100k_base".to_string(),
            capabilities: Capabilities::default(),
            base_latency_ms: 90.0,
            per_token_latency_ms: 0.6,
            jitter_percent: 0.08,
            min_latency_ms: None,
            max_latency_ms: None,
            input_per_1m: 0.13,
            output_per_1m: 0.0,
            cached_input_per_1m: None,
            image_pricing: None,
            tokens_per_message: 0,
        },
        ModelDescriptor {
            id: "dall-e-3".to_string(),
            context_window: 4_000,
            max_output_tokens: 0,
            encoding: "cl100k_base".to_string(),
            capabilities: Capabilities::default(),
            base_latency_ms: 3_000.0,
            per_token_latency_ms: 0.0,
            jitter_percent: 0.25,
            min_latency_ms: Some(1_500.0),
            max_latency_ms: Some(12_000.0),
            input_per_1m: 0.0,
            output_per_1m: 0.0,
            cached_input_per_1m: None,
            image_pricing: Some(ImagePricing {
                by_size: HashMap::from([
                    ("1024x1024".to_string(), (0.040, 0.080)),
                    ("1024x1792".to_string(), (0.080, 0.120)),
                    ("1792x1024".to_string(), (0.080, 0.120)),
                ]),
            }),
            tokens_per_message: 0,
        },
    ]
}

/// Immutable after startup.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    by_id: HashMap<String, ModelDescriptor>,
}

impl ModelRegistry {
    pub fn with_defaults() -> Self {
        let by_id = preset_table()
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();
        Self { by_id }
    }

    /// Layer operator-supplied descriptors (from config) atop the built-in
    /// table; later entries win on id collision.
    pub fn with_extra(mut self, extra: Vec<ModelDescriptor>) -> Self {
        for model in extra {
            self.by_id.insert(model.id.clone(), model);
        }
        self
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.by_id.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ModelDescriptor> {
        self.by_id.get_mut(id)
    }

    pub fn list(&self) -> Vec<&ModelDescriptor> {
        self.by_id.values().collect()
    }
}
