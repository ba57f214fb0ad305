//! Typed engine settings read from the process environment.
//!
//! [`crate::load_and_apply`] fills the environment from `.env`/XDG first; this module then
//! turns the relevant `APIWEAVE_*` keys into one plain struct the engine is constructed with.

use std::time::Duration;

/// Engine settings: model names, limits, and the outbound base-URL alias map.
///
/// Every field has a default so `EngineSettings::from_env()` never fails; malformed
/// numeric values fall back to the default for that field.
#[derive(Clone, Debug)]
pub struct EngineSettings {
    /// Chat-completion model for planning, judging, and healing. `APIWEAVE_CHAT_MODEL`.
    pub chat_model: String,
    /// Embedding model for intent scoring. `APIWEAVE_EMBEDDING_MODEL`.
    pub embedding_model: String,
    /// Max concurrent in-flight LLM calls across the process. `APIWEAVE_LLM_CONCURRENCY`.
    pub llm_concurrency: usize,
    /// Outbound HTTP timeout per dispatch. `APIWEAVE_HTTP_TIMEOUT_SECS`.
    pub http_timeout: Duration,
    /// Max full pipeline restarts per request. `APIWEAVE_RETRY_BUDGET`.
    pub retry_budget: usize,
    /// Base-URL prefix rewrites applied to outgoing request URLs, as
    /// `(from_prefix, to_prefix)` pairs. `APIWEAVE_URL_ALIASES` with the format
    /// `from=>to,from2=>to2`. Replaces legacy per-host path patching.
    pub url_aliases: Vec<(String, String)>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            llm_concurrency: 4,
            http_timeout: Duration::from_secs(30),
            retry_budget: 2,
            url_aliases: Vec::new(),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses `from=>to,from2=>to2` into pairs; entries without `=>` are skipped.
fn parse_aliases(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|entry| {
            let (from, to) = entry.split_once("=>")?;
            let (from, to) = (from.trim(), to.trim());
            if from.is_empty() || to.is_empty() {
                None
            } else {
                Some((from.to_string(), to.to_string()))
            }
        })
        .collect()
}

impl EngineSettings {
    /// Reads settings from the environment, falling back to defaults per field.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            chat_model: std::env::var("APIWEAVE_CHAT_MODEL").unwrap_or(defaults.chat_model),
            embedding_model: std::env::var("APIWEAVE_EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            llm_concurrency: env_or("APIWEAVE_LLM_CONCURRENCY", defaults.llm_concurrency).max(1),
            http_timeout: Duration::from_secs(env_or(
                "APIWEAVE_HTTP_TIMEOUT_SECS",
                defaults.http_timeout.as_secs(),
            )),
            retry_budget: env_or("APIWEAVE_RETRY_BUDGET", defaults.retry_budget),
            url_aliases: std::env::var("APIWEAVE_URL_ALIASES")
                .map(|v| parse_aliases(&v))
                .unwrap_or_default(),
        }
    }
}
