//! Tier registry: (tier, model) -> (RPM, TPM, RPD?, TPD?).
//! Preloaded with industry-realistic defaults; missing combinations fall
//! back to a conservative pair.

use crate::types::Identity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierLimits {
    pub rpm: u32,
    pub tpm: u32,
    pub rpd: Option<u32>,
    pub tpd: Option<u32>,
}

pub struct TierRegistry {
    table: HashMap<(String, String), TierLimits>,
    fallback: TierLimits,
    pub default_tier: String,
}

impl TierRegistry {
    pub fn with_defaults(default_tier: impl Into<String>, fallback_rpm: u32, fallback_tpm: u32) -> Self {
        let mut table = HashMap::new();

        let tiers: &[(&str, &[(&str, u32, u32)])] = &[
            (
                "free",
                &[("gpt-4o", 3, 40_000), ("gpt-4o-mini", 3, 60_000), ("gpt-3.5-turbo", 3, 40_000)],
            ),
            (
                "tier1",
                &[
                    ("gpt-4o", 500, 800_000),
                    ("gpt-4o-mini", 500, 2_000_000),
                    ("gpt-4-turbo", 500, 600_000),
                    ("gpt-3.5-turbo", 3_500, 2_000_000),
                ],
            ),
            (
                "tier2",
                &[
                    ("gpt-4o", 5_000, 2_000_000),
                    ("gpt-4o-mini", 5_000, 4_000_000),
                    ("gpt-4-turbo", 5_000, 1_000_000),
                    ("gpt-3.5-turbo", 5_000, 4_000_000),
                ],
            ),
            (
                "tier3",
                &[
                    ("gpt-4o", 5_000, 4_000_000),
                    ("gpt-4o-mini", 5_000, 8_000_000),
                    ("gpt-4-turbo", 5_000, 2_000_000),
                ],
            ),
            (
                "tier4",
                &[
                    ("gpt-4o", 10_000, 8_000_000),
                    ("gpt-4o-mini", 10_000, 16_000_000),
                    ("gpt-4-turbo", 10_000, 4_000_000),
                ],
            ),
            (
                "tier5",
                &[
                    ("gpt-4o", 10_000, 30_000_000),
                    ("gpt-4o-mini", 30_000, 150_000_000),
                    ("gpt-4-turbo", 10_000, 15_000_000),
                ],
            ),
        ];

        for (tier_name, models) in tiers {
            for (model, rpm, tpm) in *models {
                table.insert(
                    (tier_name.to_string(), model.to_string()),
                    TierLimits {
                        rpm: *rpm,
                        tpm: *tpm,
                        rpd: None,
                        tpd: None,
                    },
                );
            }
        }

        Self {
            table,
            fallback: TierLimits {
                rpm: fallback_rpm,
                tpm: fallback_tpm,
                rpd: None,
                tpd: None,
            },
            default_tier: default_tier.into(),
        }
    }

    pub fn limits_for(&self, tier: &str, model: &str) -> TierLimits {
        self.table
            .get(&(tier.to_string(), model.to_string()))
            .copied()
            .unwrap_or(self.fallback)
    }

    pub fn set_limits(&mut self, tier: &str, model: &str, limits: TierLimits) {
        self.table.insert((tier.to_string(), model.to_string()), limits);
    }
}

/// The out-of-band identity -> tier binding. Configured by raw bearer
/// token (the operator's view) but keyed internally by `Identity` (the
/// hashed view every other component uses), so lookups never need the
/// raw token in hand. Identities absent from the binding fall back to
/// the registry's default tier.
pub struct TierBinding {
    bindings: HashMap<Identity, String>,
    default_tier: String,
}

impl TierBinding {
    /// `raw_token_bindings` maps a raw bearer token to a tier name, as an
    /// operator would write it in configuration.
    pub fn new(default_tier: impl Into<String>, raw_token_bindings: &HashMap<String, String>) -> Self {
        let bindings = raw_token_bindings
            .iter()
            .map(|(token, tier)| (Identity::from_bearer(token), tier.clone()))
            .collect();
        Self {
            bindings,
            default_tier: default_tier.into(),
        }
    }

    pub fn tier_for(&self, identity: &Identity) -> String {
        self.bindings.get(identity).cloned().unwrap_or_else(|| self.default_tier.clone())
    }
}
