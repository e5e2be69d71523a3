//! Fixture store. Loads YAML fixture files under a configured directory,
//! indexes them by path and by category, and exposes four retrieval
//! modes: uniform random, weighted random, seeded, and direct by-id.

pub mod matcher;

use crate::error::FixtureError;
use crate::types::FinishReason;
use rand::Rng;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
struct RawFixtureFile {
    #[serde(default)]
    description: String,
    category: String,
    responses: Vec<RawFixture>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawFixture {
    id: String,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    function_call: Option<RawFunctionCall>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    weight: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawFunctionCall {
    name: String,
    arguments: String,
}

/// A fully validated, default-applied fixture.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub id: String,
    pub pattern: Option<String>,
    pub content: String,
    pub role: String,
    pub function_call: Option<(String, String)>,
    pub finish_reason: FinishReason,
    pub metadata: HashMap<String, String>,
    pub weight: f64,
}

impl Fixture {
    fn from_raw(raw: RawFixture, path: &str) -> Result<Self, FixtureError> {
        if raw.content.is_empty() && raw.function_call.is_none() {
            return Err(FixtureError::Invalid {
                path: path.to_string(),
                id: raw.id.clone(),
                reason: "empty content with no function call".to_string(),
            });
        }
        if let Some(weight) = raw.weight {
            if weight < 0.0 {
                return Err(FixtureError::Invalid {
                    path: path.to_string(),
                    id: raw.id.clone(),
                    reason: "weight must be non-negative".to_string(),
                });
            }
        }
        if let Some(pattern) = &raw.pattern {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(FixtureError::Invalid {
                    path: path.to_string(),
                    id: raw.id.clone(),
                    reason: format!("invalid pattern regex: {e}"),
                });
            }
        }
        let finish_reason = match raw.finish_reason.as_deref() {
            None | Some("") => FinishReason::Stop,
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some("function_call") => FinishReason::FunctionCall,
            Some("tool_calls") => FinishReason::ToolCalls,
            Some(other) => {
                return Err(FixtureError::Invalid {
                    path: path.to_string(),
                    id: raw.id.clone(),
                    reason: format!("unknown finish_reason {other}"),
                })
            }
        };

        Ok(Fixture {
            id: raw.id,
            pattern: raw.pattern,
            content: raw.content,
            role: match raw.role.as_deref() {
                None | Some("") => "assistant".to_string(),
                Some(r) => r.to_string(),
            },
            function_call: raw.function_call.map(|f| (f.name, f.arguments)),
            finish_reason,
            metadata: raw.metadata,
            weight: if raw.weight.unwrap_or(0.0) == 0.0 { 1.0 } else { raw.weight.unwrap() },
        })
    }
}

struct FixtureFile {
    category: String,
    fixtures: Vec<Fixture>,
}

/// Immutable after load.
pub struct FixtureStore {
    by_path: HashMap<String, FixtureFile>,
    by_category: HashMap<String, Vec<String>>,
}

impl FixtureStore {
    /// Loads every `*.yaml`/`*.yml` file under `dir`, recursively, keyed
    /// by its path relative to `dir` (e.g. `chat/generic.yaml`).
    pub fn load_dir(dir: &Path) -> Result<Self, FixtureError> {
        let mut by_path = HashMap::new();
        let mut by_category: HashMap<String, Vec<String>> = HashMap::new();

        let mut entries = Vec::new();
        collect_yaml_files(dir, dir, &mut entries);

        for (rel_path, full_path) in entries {
            let text = std::fs::read_to_string(&full_path).map_err(|e| FixtureError::Invalid {
                path: rel_path.clone(),
                id: String::new(),
                reason: format!("read failed: {e}"),
            })?;
            let raw: RawFixtureFile = serde_yaml::from_str(&text).map_err(|e| FixtureError::Parse {
                path: rel_path.clone(),
                source: e,
            })?;

            if raw.responses.is_empty() {
                return Err(FixtureError::EmptyPath(rel_path));
            }

            let mut seen_ids = std::collections::HashSet::new();
            let mut fixtures = Vec::with_capacity(raw.responses.len());
            for raw_fixture in raw.responses {
                if !seen_ids.insert(raw_fixture.id.clone()) {
                    return Err(FixtureError::DuplicateId {
                        path: rel_path.clone(),
                        id: raw_fixture.id,
                    });
                }
                fixtures.push(Fixture::from_raw(raw_fixture, &rel_path)?);
            }

            by_category
                .entry(raw.category.clone())
                .or_default()
                .push(rel_path.clone());
            let _ = &raw.description; // descriptive only, not load-bearing

            by_path.insert(
                rel_path,
                FixtureFile {
                    category: raw.category,
                    fixtures,
                },
            );
        }

        Ok(Self { by_path, by_category })
    }

    pub fn path_exists(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    fn fixtures_at(&self, path: &str) -> Result<&[Fixture], FixtureError> {
        self.by_path
            .get(path)
            .map(|f| f.fixtures.as_slice())
            .ok_or_else(|| FixtureError::UnknownCategory(path.to_string()))
    }

    pub fn uniform_random(&self, path: &str) -> Result<&Fixture, FixtureError> {
        let fixtures = self.fixtures_at(path)?;
        if fixtures.is_empty() {
            return Err(FixtureError::EmptyPath(path.to_string()));
        }
        let idx = rand::rng().random_range(0..fixtures.len());
        Ok(&fixtures[idx])
    }

    pub fn weighted_random(&self, path: &str) -> Result<&Fixture, FixtureError> {
        let fixtures = self.fixtures_at(path)?;
        if fixtures.is_empty() {
            return Err(FixtureError::EmptyPath(path.to_string()));
        }
        let total: f64 = fixtures.iter().map(|f| f.weight).sum();
        let mut draw = rand::rng().random::<f64>() * total;
        for f in fixtures {
            if draw < f.weight {
                return Ok(f);
            }
            draw -= f.weight;
        }
        Ok(fixtures.last().unwrap())
    }

    /// Deterministic selection for seeded requests:
    /// `index = seed mod |candidates|`.
    pub fn seeded(&self, path: &str, seed: u64) -> Result<&Fixture, FixtureError> {
        let fixtures = self.fixtures_at(path)?;
        if fixtures.is_empty() {
            return Err(FixtureError::EmptyPath(path.to_string()));
        }
        let idx = (seed as usize) % fixtures.len();
        Ok(&fixtures[idx])
    }

    pub fn by_id(&self, path: &str, id: &str) -> Result<&Fixture, FixtureError> {
        let fixtures = self.fixtures_at(path)?;
        fixtures.iter().find(|f| f.id == id).ok_or_else(|| FixtureError::Invalid {
            path: path.to_string(),
            id: id.to_string(),
            reason: "no fixture with this id".to_string(),
        })
    }

    /// Picks a random path within a category, then weighted-random within it.
    pub fn by_category(&self, category: &str) -> Result<&Fixture, FixtureError> {
        let paths = self
            .by_category
            .get(category)
            .ok_or_else(|| FixtureError::UnknownCategory(category.to_string()))?;
        if paths.is_empty() {
            return Err(FixtureError::UnknownCategory(category.to_string()));
        }
        let idx = rand::rng().random_range(0..paths.len());
        self.weighted_random(&paths[idx])
    }
}

fn collect_yaml_files(root: &Path, dir: &Path, out: &mut Vec<(String, PathBuf)>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_yaml_files(root, &path, out);
        } else if matches!(path.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml")) {
            if let Ok(rel) = path.strip_prefix(root) {
                out.push((rel.to_string_lossy().replace('\\', "/"), path.clone()));
            }
        }
    }
}
