//! Error analyzer and schema healer: turn a failed pass into a corrected query and
//! idempotent metadata deltas.
//!
//! Two independent LLM roles share one failure prompt: the retry analyst decides
//! whether a rephrased query is worth another pass, and the metadata extractor
//! proposes catalog corrections (missing parameters, renames, error messages).
//! Delta application is best-effort: every failure is logged and skipped, partial
//! progress is acceptable, and applying the same delta set twice changes nothing.

mod prompt;

pub use prompt::{build_failure_prompt, METADATA_EXTRACTOR_SYSTEM, RETRY_ANALYST_SYSTEM};

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::executor::StepResult;
use crate::llm::LlmGateway;
use crate::metadata::{parse_label, MetadataRepository, NewParameter, ParamLocation};
use crate::planner::ExecutionPlan;

const HEALER_TEMPERATURE: f32 = 0.2;

/// Retry analyst verdict. A retry happens only when `should_retry` is set *and* a
/// corrected query is present.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryAdvice {
    pub should_retry: bool,
    pub corrected_query: Option<String>,
    pub analysis: String,
}

impl RetryAdvice {
    /// The corrected query to rerun with, when the analyst approved a retry.
    pub fn corrected(&self) -> Option<&str> {
        if !self.should_retry {
            return None;
        }
        self.corrected_query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
    }
}

/// A parameter the catalog is missing, per the extractor.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MissingParameter {
    pub endpoint_path: String,
    pub method: String,
    pub parameter_name: String,
    pub parameter_type: String,
    pub is_required: bool,
    pub location: String,
}

/// A parameter whose stored name does not match the service.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterCorrection {
    pub endpoint_path: String,
    pub method: String,
    pub old_parameter_name: String,
    pub new_parameter_name: String,
}

/// A status message worth recording for future failures.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorMessageDelta {
    pub endpoint_path: String,
    pub method: String,
    pub status_code: u16,
    pub message: String,
    pub suggestion: String,
}

/// Structural catalog corrections proposed by the extractor.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataDeltas {
    pub missing_parameters: Vec<MissingParameter>,
    pub parameter_corrections: Vec<ParameterCorrection>,
    pub error_messages: Vec<ErrorMessageDelta>,
}

impl MetadataDeltas {
    pub fn is_empty(&self) -> bool {
        self.missing_parameters.is_empty()
            && self.parameter_corrections.is_empty()
            && self.error_messages.is_empty()
    }
}

/// Healer over an [`LlmGateway`] and the metadata repository.
pub struct Healer {
    gateway: Arc<dyn LlmGateway>,
    repo: Arc<MetadataRepository>,
}

impl Healer {
    pub fn new(gateway: Arc<dyn LlmGateway>, repo: Arc<MetadataRepository>) -> Self {
        Self { gateway, repo }
    }

    /// Asks whether a corrected query is worth another pipeline pass. Gateway failure
    /// degrades to "do not retry".
    pub async fn advise_retry(
        &self,
        query: &str,
        error: &str,
        plan: Option<&ExecutionPlan>,
        results: &[StepResult],
    ) -> RetryAdvice {
        let user = build_failure_prompt(query, error, plan, results);
        match self
            .gateway
            .json(RETRY_ANALYST_SYSTEM, &user, HEALER_TEMPERATURE)
            .await
        {
            Ok(value) => match serde_json::from_value::<RetryAdvice>(value) {
                Ok(advice) => advice,
                Err(e) => {
                    warn!(error = %e, "retry analyst reply did not match contract");
                    RetryAdvice::default()
                }
            },
            Err(e) => {
                warn!(error = %e, "retry analyst unavailable");
                RetryAdvice::default()
            }
        }
    }

    /// Asks for catalog corrections the failure demonstrates. Gateway failure
    /// degrades to no deltas.
    pub async fn extract_deltas(
        &self,
        query: &str,
        error: &str,
        plan: Option<&ExecutionPlan>,
        results: &[StepResult],
    ) -> MetadataDeltas {
        let user = build_failure_prompt(query, error, plan, results);
        match self
            .gateway
            .json(METADATA_EXTRACTOR_SYSTEM, &user, HEALER_TEMPERATURE)
            .await
        {
            Ok(value) => match serde_json::from_value::<MetadataDeltas>(value) {
                Ok(deltas) => deltas,
                Err(e) => {
                    warn!(error = %e, "metadata extractor reply did not match contract");
                    MetadataDeltas::default()
                }
            },
            Err(e) => {
                warn!(error = %e, "metadata extractor unavailable");
                MetadataDeltas::default()
            }
        }
    }

    /// Applies deltas through the repository; returns how many were applied. Each
    /// failure is logged and skipped. Upsert/rename/insert-if-absent semantics make
    /// a second application of the same set a no-op.
    pub async fn apply_deltas(&self, project_id: i64, deltas: &MetadataDeltas) -> usize {
        let mut applied = 0;

        for mp in &deltas.missing_parameters {
            let Some(endpoint) = self.endpoint_id(project_id, &mp.method, &mp.endpoint_path).await
            else {
                continue;
            };
            let location = ParamLocation::parse(&mp.location).unwrap_or(ParamLocation::Body);
            let parameter = NewParameter {
                name: mp.parameter_name.clone(),
                location,
                param_type: if mp.parameter_type.is_empty() {
                    "string".to_string()
                } else {
                    mp.parameter_type.clone()
                },
                required: mp.is_required,
                description: String::new(),
            };
            match self
                .repo
                .upsert_parameter(project_id, endpoint, parameter)
                .await
            {
                Ok(()) => {
                    debug!(endpoint, name = %mp.parameter_name, "healed missing parameter");
                    applied += 1;
                }
                Err(e) => warn!(error = %e, name = %mp.parameter_name, "parameter heal failed"),
            }
        }

        for pc in &deltas.parameter_corrections {
            let Some(endpoint) = self.endpoint_id(project_id, &pc.method, &pc.endpoint_path).await
            else {
                continue;
            };
            match self
                .repo
                .rename_parameter(
                    project_id,
                    endpoint,
                    &pc.old_parameter_name,
                    &pc.new_parameter_name,
                )
                .await
            {
                Ok(true) => {
                    debug!(endpoint, old = %pc.old_parameter_name, new = %pc.new_parameter_name, "healed parameter name");
                    applied += 1;
                }
                Ok(false) => {}
                Err(e) => warn!(error = %e, "parameter rename heal failed"),
            }
        }

        for em in &deltas.error_messages {
            let Some(endpoint) = self.endpoint_id(project_id, &em.method, &em.endpoint_path).await
            else {
                continue;
            };
            match self
                .repo
                .upsert_response_message(
                    project_id,
                    endpoint,
                    em.status_code,
                    &em.message,
                    &em.suggestion,
                )
                .await
            {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) => warn!(error = %e, "error message heal failed"),
            }
        }

        if applied > 0 {
            self.repo.invalidate(project_id);
        }
        applied
    }

    async fn endpoint_id(&self, project_id: i64, method: &str, path: &str) -> Option<i64> {
        let label = format!("{} {}", method, path);
        if parse_label(&label).is_none() {
            warn!(method, path, "healer delta names an unparseable endpoint");
            return None;
        }
        match self.repo.find_by_label(project_id, &label).await {
            Ok(Some(detail)) => Some(detail.endpoint.id),
            Ok(None) => {
                warn!(method, path, "healer delta names an unknown endpoint");
                None
            }
            Err(e) => {
                warn!(error = %e, "endpoint lookup for heal failed");
                None
            }
        }
    }
}
