//! Intent resolver: ranks a project's endpoints against a user query.
//!
//! Hybrid score per endpoint, each signal clamped to [0, 1]:
//! `0.4·semantic + 0.3·keyword + 0.3·intent`, plus a 0.1 bonus for endpoints with a
//! substantial prompt text. Endpoints scoring below the match threshold are dropped;
//! when nothing passes, the resolver fails open and returns the full catalog so the
//! planner can still choose.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::llm::LlmGateway;
use crate::metadata::EndpointDetail;

/// Minimum score for an endpoint to count as a match.
pub const MATCH_THRESHOLD: f64 = 0.2;

const SEMANTIC_WEIGHT: f64 = 0.4;
const KEYWORD_WEIGHT: f64 = 0.3;
const INTENT_WEIGHT: f64 = 0.3;
const PROMPT_BONUS: f64 = 0.1;
const PROMPT_BONUS_MIN_LEN: usize = 20;

/// An endpoint with its relevance score. Max score is 1.1 (signals plus bonus).
#[derive(Clone, Debug)]
pub struct ScoredEndpoint {
    pub detail: EndpointDetail,
    pub score: f64,
}

fn query_tokens(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Cosine similarity clamped to [0, 1]; 0 when either vector is missing or the
/// dimensions disagree (embeddings are fixed-dimension per project).
fn semantic_score(query: &[f32], endpoint: &[f32]) -> f64 {
    if query.is_empty() || endpoint.is_empty() || query.len() != endpoint.len() {
        return 0.0;
    }
    let dot: f32 = query.iter().zip(endpoint).map(|(a, b)| a * b).sum();
    let na: f32 = query.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = endpoint.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na * nb)).clamp(0.0, 1.0) as f64
}

/// Share of the endpoint's keywords that some query token substring-matches,
/// in either direction.
fn keyword_score(tokens: &[String], detail: &EndpointDetail) -> f64 {
    let keywords = &detail.endpoint.keywords;
    if keywords.is_empty() {
        return 0.0;
    }
    let matched = keywords
        .iter()
        .filter(|kw| {
            let kw = kw.to_lowercase();
            tokens.iter().any(|t| kw.contains(t.as_str()) || t.contains(&kw))
        })
        .count();
    (matched as f64 / keywords.len() as f64).clamp(0.0, 1.0)
}

/// Share of the pattern's words also present in the query.
fn word_overlap_ratio(query_words: &[String], pattern: &str) -> f64 {
    let pattern_words: Vec<String> = query_tokens(pattern);
    if pattern_words.is_empty() {
        return 0.0;
    }
    let common = pattern_words
        .iter()
        .filter(|w| query_words.contains(w))
        .count();
    common as f64 / pattern_words.len() as f64
}

/// Max over intent patterns: 1.0 on substring containment either way, else
/// 0.7 × word-overlap ratio.
fn intent_score(query: &str, tokens: &[String], detail: &EndpointDetail) -> f64 {
    let query_lower = query.to_lowercase();
    detail
        .endpoint
        .intent_patterns
        .iter()
        .map(|pattern| {
            let pattern_lower = pattern.to_lowercase();
            if query_lower.contains(&pattern_lower) || pattern_lower.contains(&query_lower) {
                1.0
            } else {
                0.7 * word_overlap_ratio(tokens, pattern)
            }
        })
        .fold(0.0, f64::max)
        .clamp(0.0, 1.0)
}

fn score_endpoint(query: &str, tokens: &[String], query_embedding: &[f32], detail: &EndpointDetail) -> f64 {
    let semantic = semantic_score(query_embedding, &detail.endpoint.embedding);
    let keyword = keyword_score(tokens, detail);
    let intent = intent_score(query, tokens, detail);
    let bonus = if detail.endpoint.prompt_text.len() > PROMPT_BONUS_MIN_LEN {
        PROMPT_BONUS
    } else {
        0.0
    };
    SEMANTIC_WEIGHT * semantic + KEYWORD_WEIGHT * keyword + INTENT_WEIGHT * intent + bonus
}

/// Ranks candidate endpoints for a query. See module docs for the formula.
pub struct IntentResolver {
    gateway: Arc<dyn LlmGateway>,
}

impl IntentResolver {
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self { gateway }
    }

    /// Scores and sorts the catalog. Embedding failure degrades to keyword+intent
    /// signals only; an empty result never occurs for a non-empty catalog (fail-open).
    pub async fn rank(&self, query: &str, catalog: &[EndpointDetail]) -> Vec<ScoredEndpoint> {
        let query_embedding = match self.gateway.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "query embedding failed; scoring without semantic signal");
                Vec::new()
            }
        };
        let tokens = query_tokens(query);

        let mut scored: Vec<ScoredEndpoint> = catalog
            .iter()
            .map(|detail| ScoredEndpoint {
                score: score_endpoint(query, &tokens, &query_embedding, detail),
                detail: detail.clone(),
            })
            .collect();

        // Stable ordering: score desc, then (method, path) lex.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    (a.detail.endpoint.method, a.detail.endpoint.path.as_str())
                        .cmp(&(b.detail.endpoint.method, b.detail.endpoint.path.as_str()))
                })
        });

        let matched: Vec<ScoredEndpoint> = scored
            .iter()
            .filter(|s| s.score >= MATCH_THRESHOLD)
            .cloned()
            .collect();
        if matched.is_empty() {
            debug!(catalog = scored.len(), "no endpoint above threshold; failing open");
            return scored;
        }
        matched
    }
}
