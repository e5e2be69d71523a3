//! Client-facing error taxonomy plus the typed internal errors
//! that feed into it at the pipeline boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// The stable error kinds the HTTP surface may return. Status codes are
/// fixed per kind; never inferred from caller context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimitExceeded,
    ServerError,
    ServiceUnavailable,
    InvalidRequestError,
    Timeout,
    InvalidApiKey,
    InsufficientQuota,
    ModelNotFound,
    ContextLengthExceeded,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::InvalidRequestError => StatusCode::BAD_REQUEST,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::InvalidApiKey => StatusCode::UNAUTHORIZED,
            ErrorKind::InsufficientQuota => StatusCode::FORBIDDEN,
            ErrorKind::ModelNotFound => StatusCode::NOT_FOUND,
            ErrorKind::ContextLengthExceeded => StatusCode::BAD_REQUEST,
        }
    }

    /// Whether a client may usefully retry this kind of failure.
    pub fn retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimitExceeded | ErrorKind::ServerError | ErrorKind::ServiceUnavailable
        )
    }
}

/// The error body every failing request returns: `{"error":{"type":...,"message":...}}`.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    /// Present on 429s; seconds until retry is worth attempting.
    pub retry_after: Option<u64>,
    /// Present on capacity/injected rejections; surfaced as `X-Sentra-Limiting-Factor`.
    pub limiting_factor: Option<&'static str>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
            limiting_factor: None,
        }
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after = Some(secs);
        self
    }

    pub fn with_limiting_factor(mut self, factor: &'static str) -> Self {
        self.limiting_factor = Some(factor);
        self
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ApiError {}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    #[serde(rename = "type")]
    kind: ErrorKind,
    message: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        let body = Json(ErrorBody {
            error: ErrorDetail {
                kind: self.kind,
                message: &self.message,
            },
        });
        let mut response = (status, body).into_response();
        if let Some(secs) = self.retry_after {
            if let Ok(value) = secs.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        if let Some(factor) = self.limiting_factor {
            if let Ok(value) = factor.parse() {
                response.headers_mut().insert("X-Sentra-Limiting-Factor", value);
            }
        }
        response
    }
}

/// Configuration loading/validation failures. Fatal at startup; `anyhow`
/// wraps these at the very outermost layer (`main`), with `thiserror`
/// component errors feeding into one `anyhow::Result` entry point.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(&'static str),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum TokenCountError {
    #[error("no encoding registered for model {0}")]
    UnknownEncoding(String),
    #[error("tokenizer construction failed: {0}")]
    Tokenizer(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("fixture file {path} failed to parse: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("fixture {id} in {path} is invalid: {reason}")]
    Invalid {
        path: String,
        id: String,
        reason: String,
    },
    #[error("duplicate fixture id {id} in {path}")]
    DuplicateId { path: String, id: String },
    #[error("no fixture path registered for category {0}")]
    UnknownCategory(String),
    #[error("fixture path {0} has no fixtures")]
    EmptyPath(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("no pricing record for model {0}")]
    UnknownModel(String),
    #[error("no pricing for image size/quality pair ({size}, {quality})")]
    UnknownImagePricing { size: String, quality: String },
}

impl From<TokenCountError> for ApiError {
    fn from(e: TokenCountError) -> Self {
        ApiError::new(ErrorKind::InvalidRequestError, e.to_string())
    }
}

impl From<FixtureError> for ApiError {
    fn from(e: FixtureError) -> Self {
        ApiError::new(ErrorKind::ServerError, e.to_string())
    }
}

impl From<PricingError> for ApiError {
    fn from(e: PricingError) -> Self {
        ApiError::new(ErrorKind::ServerError, e.to_string())
    }
}
