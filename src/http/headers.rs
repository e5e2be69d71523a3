//! Response header application.

use crate::pipeline::{AdmissionHeaders, CostHeaders};
use axum::http::HeaderMap;

pub fn apply_admission_headers(headers: &mut HeaderMap, admission: &AdmissionHeaders) {
    insert(headers, "x-ratelimit-limit-requests", admission.limit_requests.to_string());
    insert(headers, "x-ratelimit-remaining-requests", admission.remaining_requests.clone());
    insert(headers, "x-ratelimit-reset-requests", admission.reset_requests.clone());
    insert(headers, "x-ratelimit-limit-tokens", admission.limit_tokens.to_string());
    insert(headers, "x-ratelimit-remaining-tokens", admission.remaining_tokens.clone());
    insert(headers, "x-ratelimit-reset-tokens", admission.reset_tokens.clone());
}

pub fn apply_cost_headers(headers: &mut HeaderMap, cost: &CostHeaders) {
    insert(headers, "x-sentra-cost-total", cost.cost_total.clone());
    insert(headers, "x-sentra-cost-currency", cost.cost_currency.to_string());
    insert(headers, "x-sentra-cost-input", cost.cost_input.clone());
    insert(headers, "x-sentra-cost-output", cost.cost_output.clone());
    insert(headers, "x-sentra-tokens-input", cost.tokens_input.to_string());
    insert(headers, "x-sentra-tokens-output", cost.tokens_output.to_string());
    insert(headers, "x-sentra-tokens-total", cost.tokens_total.to_string());
    insert(headers, "x-sentra-model", cost.model.clone());
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: String) {
    if let Ok(value) = value.parse() {
        headers.insert(name, value);
    }
}
