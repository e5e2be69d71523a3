//! Configuration loading for Sentra: an inline loader that hard-rejects
//! malformed input, plus a separate soft "lint" pass.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::{env, time::Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorMode {
    Production,
    Fast,
    Debug,
}

impl Default for BehaviorMode {
    fn default() -> Self {
        BehaviorMode::Production
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    pub bind: String,
    pub metrics_bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            metrics_bind: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorSection {
    pub mode: BehaviorMode,
}

impl Default for BehaviorSection {
    fn default() -> Self {
        Self {
            mode: BehaviorMode::Production,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencySection {
    pub jitter_distribution: JitterDistribution,
    pub peak_hours_utc: (u8, u8),
    pub load_multiplier: f64,
    pub cache_latency_reduction: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterDistribution {
    Uniform,
    Normal,
}

impl Default for LatencySection {
    fn default() -> Self {
        Self {
            jitter_distribution: JitterDistribution::Uniform,
            peak_hours_utc: (9, 17),
            load_multiplier: 1.3,
            cache_latency_reduction: 0.10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingSection {
    pub enabled: bool,
    pub default_tier: String,
    pub fallback_rpm: u32,
    pub fallback_tpm: u32,
    /// Out-of-band identity -> tier binding, keyed by the raw bearer
    /// token an operator would hand out. Absent tokens fall back to
    /// `default_tier`.
    #[serde(default)]
    pub tier_bindings: std::collections::HashMap<String, String>,
}

impl Default for RateLimitingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            default_tier: "free".to_string(),
            fallback_rpm: 60,
            fallback_tpm: 100_000,
            tier_bindings: std::collections::HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInjectionSection {
    pub enabled: bool,
    pub base_error_rate: f64,
    pub burst_error_rate: f64,
    pub quota_error_rate: f64,
    pub load_threshold_rps: f64,
    pub quota_threshold: f64,
}

impl Default for ErrorInjectionSection {
    fn default() -> Self {
        Self {
            enabled: true,
            base_error_rate: 0.005,
            burst_error_rate: 0.05,
            quota_error_rate: 0.10,
            load_threshold_rps: 100.0,
            quota_threshold: 0.90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRuleConfig {
    pub name: String,
    pub pattern: String,
    pub target_path: String,
    #[serde(default)]
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixturesSection {
    pub dir: String,
    pub default_path: String,
    #[serde(default)]
    pub rules: Vec<MatchRuleConfig>,
}

impl Default for FixturesSection {
    fn default() -> Self {
        Self {
            dir: "fixtures".to_string(),
            default_path: "responses/chat/generic.yaml".to_string(),
            rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachingSection {
    pub token_cache_ttl_secs: u64,
    pub response_cache_enabled: bool,
    pub response_cache_ttl_secs: u64,
}

impl Default for CachingSection {
    fn default() -> Self {
        Self {
            token_cache_ttl_secs: 300,
            response_cache_enabled: true,
            response_cache_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PricingSection {
    /// Optional runtime overrides layered atop the built-in pricing book.
    #[serde(default)]
    pub overrides: Vec<crate::pricing::PricingRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySection {
    pub log_level: String,
}

impl Default for ObservabilitySection {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelsSection {
    /// Optional additional model descriptors layered atop the built-in table.
    #[serde(default)]
    pub extra: Vec<crate::models::ModelDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub behavior: BehaviorSection,
    #[serde(default)]
    pub latency: LatencySection,
    #[serde(default)]
    pub rate_limiting: RateLimitingSection,
    #[serde(default)]
    pub error_injection: ErrorInjectionSection,
    #[serde(default)]
    pub fixtures: FixturesSection,
    #[serde(default)]
    pub caching: CachingSection,
    #[serde(default)]
    pub pricing: PricingSection,
    #[serde(default)]
    pub observability: ObservabilitySection,
    #[serde(default)]
    pub models: ModelsSection,
}

/// Mode-level toggles: fast disables latency/rate-limit/error
/// injection; debug disables response caching; production enables all.
impl AppConfig {
    pub fn latency_enabled(&self) -> bool {
        !matches!(self.behavior.mode, BehaviorMode::Fast)
    }

    pub fn rate_limiting_enabled(&self) -> bool {
        self.rate_limiting.enabled && !matches!(self.behavior.mode, BehaviorMode::Fast)
    }

    pub fn error_injection_enabled(&self) -> bool {
        self.error_injection.enabled && !matches!(self.behavior.mode, BehaviorMode::Fast)
    }

    pub fn response_cache_enabled(&self) -> bool {
        self.caching.response_cache_enabled && !matches!(self.behavior.mode, BehaviorMode::Debug)
    }

    /// Load + hard-validate. Env vars win over the YAML file; the YAML file
    /// wins over built-in defaults. Mirrors `Config::from_env`'s layering,
    /// generalized to a file source via the `config` crate.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config_path =
            env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.yaml".to_string());

        let path_exists = std::path::Path::new(&config_path).exists();
        let mut cfg: AppConfig = if path_exists {
            config::Config::builder()
                .add_source(config::File::with_name(&config_path))
                .build()
                .map_err(ConfigError::Parse)?
                .try_deserialize()
                .map_err(ConfigError::Parse)?
        } else {
            AppConfig::default()
        };

        if let Ok(port) = env::var("PORT") {
            let host = cfg
                .server
                .bind
                .rsplit_once(':')
                .map(|(h, _)| h.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            cfg.server.bind = format!("{host}:{port}");
        }
        if let Ok(metrics_port) = env::var("METRICS_PORT") {
            let host = cfg
                .server
                .metrics_bind
                .rsplit_once(':')
                .map(|(h, _)| h.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            cfg.server.metrics_bind = format!("{host}:{metrics_port}");
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            cfg.observability.log_level = level;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Inline hard validation — rejects anything that would make the
    /// service behave incorrectly. Runs before `lint`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind.rsplit_once(':').is_none() {
            return Err(ConfigError::InvalidValue {
                field: "server.bind",
                reason: "must be host:port".to_string(),
            });
        }
        if self.error_injection.base_error_rate < 0.0 || self.error_injection.base_error_rate > 1.0
        {
            return Err(ConfigError::InvalidValue {
                field: "error_injection.base_error_rate",
                reason: "must be in [0, 1]".to_string(),
            });
        }
        if self.rate_limiting.fallback_rpm == 0 || self.rate_limiting.fallback_tpm == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limiting.fallback_{rpm,tpm}",
                reason: "must be nonzero".to_string(),
            });
        }
        if self.latency.peak_hours_utc.0 > 23 || self.latency.peak_hours_utc.1 > 23 {
            return Err(ConfigError::InvalidValue {
                field: "latency.peak_hours_utc",
                reason: "hours must be 0..=23".to_string(),
            });
        }
        Ok(())
    }

    /// Soft structured warnings — never blocks startup. The inline
    /// validator above hard-rejects; this one only reports.
    pub fn lint(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.error_injection.quota_threshold < self.error_injection.load_threshold_rps / 1000.0
        {
            warnings.push(
                "quota_threshold is suspiciously low relative to load_threshold_rps".to_string(),
            );
        }
        if self.caching.response_cache_enabled && matches!(self.behavior.mode, BehaviorMode::Debug)
        {
            warnings.push(
                "response_cache_enabled is set but debug mode always disables it".to_string(),
            );
        }
        warnings
    }
}

pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "duration",
            reason: "empty string".to_string(),
        });
    }
    let pos = s
        .find(|c: char| c.is_alphabetic())
        .ok_or_else(|| ConfigError::InvalidValue {
            field: "duration",
            reason: "missing unit (s, m, h, d)".to_string(),
        })?;
    let (number_part, unit_part) = s.split_at(pos);
    let number: u64 = number_part.parse().map_err(|_| ConfigError::InvalidValue {
        field: "duration",
        reason: "invalid number".to_string(),
    })?;
    let duration = match unit_part {
        "s" | "sec" | "second" | "seconds" => Duration::from_secs(number),
        "m" | "min" | "minute" | "minutes" => Duration::from_secs(number * 60),
        "h" | "hr" | "hour" | "hours" => Duration::from_secs(number * 3600),
        "d" | "day" | "days" => Duration::from_secs(number * 86400),
        other => {
            return Err(ConfigError::InvalidValue {
                field: "duration",
                reason: format!("unknown unit {other}"),
            })
        }
    };
    Ok(duration)
}
