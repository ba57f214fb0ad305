//! Executor: runs a validated plan step by step against the project's base URL.
//!
//! Per step: resolve parameter values (literals and `$.steps[i]` references), build the
//! URL (encoded path segments, query pairs), place header/body parameters, forward the
//! caller's credentials, dispatch with timeout and one retry on reset/timeout/5xx, then
//! ask the termination judge whether the request is already satisfied.

mod http;
mod jsonpath;
mod messages;

pub use http::{
    DispatchError, HttpCall, HttpDispatcher, HttpReply, MockDispatcher, ReqwestDispatcher,
    DEFAULT_HTTP_TIMEOUT,
};
pub use jsonpath::{resolve, JsonPathError};
pub use messages::{generic_status_message, status_message};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::judge::TerminationJudge;
use crate::llm::LlmGateway;
use crate::metadata::{EndpointDetail, MetadataError, MetadataRepository, ParamLocation};
use crate::planner::{endpoint_for_step, ExecutionPlan, ParamValue, PlanStep};
use crate::progress::ProgressSender;

const STEP_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Caller credentials forwarded on every outbound call.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AuthBlob {
    Bearer {
        token: String,
    },
    Cookie {
        name: String,
        value: String,
    },
    #[default]
    None,
}

impl AuthBlob {
    /// The header this credential renders to, if any.
    pub fn header(&self) -> Option<(String, String)> {
        match self {
            AuthBlob::Bearer { token } => {
                Some(("Authorization".to_string(), format!("Bearer {}", token)))
            }
            AuthBlob::Cookie { name, value } => {
                Some(("Cookie".to_string(), format!("{}={}", name, value)))
            }
            AuthBlob::None => None,
        }
    }
}

/// Outcome of one executed step.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub index: usize,
    pub endpoint: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub satisfies_intent: Option<bool>,
}

/// Outcome of a whole plan run. Step-level failures land here, not in `Err`.
#[derive(Clone, Debug, Default)]
pub struct ExecutionOutcome {
    pub results: Vec<StepResult>,
    pub success: bool,
    pub early_termination: bool,
    pub termination_reason: Option<String>,
    /// The failing step's user-facing message, when `success` is false.
    pub error: Option<String>,
}

/// Infrastructure failure; step failures are reported in [`ExecutionOutcome`] instead.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The project's base URL is not an absolute http/https URL.
    #[error("bad base url: {0}")]
    BadBaseUrl(String),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("execution cancelled")]
    Cancelled,
}

enum StepError {
    Cancelled,
    Failed { status: Option<u16>, error: String },
}

/// Renders a resolved parameter value for a URL or header position.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Plan parameters split by their declared location. Unknown names are dropped.
#[derive(Default)]
struct PlacedParams {
    path: HashMap<String, Value>,
    query: Vec<(String, Value)>,
    header: Vec<(String, Value)>,
    body: Map<String, Value>,
}

/// Runs execution plans. One instance per process; per-request state stays on the stack.
pub struct Executor {
    repo: Arc<MetadataRepository>,
    dispatcher: Arc<dyn HttpDispatcher>,
    judge: TerminationJudge,
    url_aliases: Vec<(String, String)>,
}

impl Executor {
    pub fn new(
        repo: Arc<MetadataRepository>,
        dispatcher: Arc<dyn HttpDispatcher>,
        gateway: Arc<dyn LlmGateway>,
    ) -> Self {
        Self {
            repo,
            dispatcher,
            judge: TerminationJudge::new(gateway),
            url_aliases: Vec::new(),
        }
    }

    /// Prefix rewrites applied to outgoing URLs (configured alias map, no ad-hoc
    /// host patching).
    pub fn with_url_aliases(mut self, aliases: Vec<(String, String)>) -> Self {
        self.url_aliases = aliases;
        self
    }

    /// Executes the plan. `Err` is reserved for infrastructure problems and
    /// cancellation; a failed step yields `Ok` with `success == false`.
    pub async fn execute(
        &self,
        project_id: i64,
        plan: &ExecutionPlan,
        query: &str,
        auth: &AuthBlob,
        cancel: &CancellationToken,
        progress: &ProgressSender,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let project = self.repo.project(project_id).await?;
        let base = Url::parse(&project.base_url)
            .map_err(|e| ExecutionError::BadBaseUrl(format!("{}: {}", project.base_url, e)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ExecutionError::BadBaseUrl(format!(
                "{}: scheme must be http or https",
                project.base_url
            )));
        }
        let catalog = self.repo.endpoints(project_id).await?;

        let total = plan.steps.len();
        let mut steps_ctx: Vec<Value> = Vec::new();
        let mut results: Vec<StepResult> = Vec::new();

        for (i, step) in plan.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ExecutionError::Cancelled);
            }

            let Some(detail) = endpoint_for_step(&catalog, &step.endpoint) else {
                let error = format!("endpoint {:?} is no longer in the catalog", step.endpoint);
                results.push(StepResult {
                    index: i,
                    endpoint: step.endpoint.clone(),
                    success: false,
                    status_code: None,
                    response: None,
                    error: Some(error.clone()),
                    duration_ms: 0,
                    satisfies_intent: None,
                });
                return Ok(ExecutionOutcome {
                    results,
                    error: Some(error),
                    ..Default::default()
                });
            };
            let label = detail.label();
            progress.executing(i, total, &label).await;

            let interpolation_ctx = json!({ "steps": steps_ctx });
            let started = std::time::Instant::now();
            match self
                .run_step(step, detail, &base, auth, &interpolation_ctx, cancel)
                .await
            {
                Ok(reply) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    let body = reply.body;
                    steps_ctx.push(json!({ "response": body.clone(), "statusCode": reply.status }));
                    let mut result = StepResult {
                        index: i,
                        endpoint: label.clone(),
                        success: true,
                        status_code: Some(reply.status),
                        response: Some(body.clone()),
                        error: None,
                        duration_ms,
                        satisfies_intent: None,
                    };

                    if i + 1 < total {
                        if let Some(reason) = self
                            .judge
                            .satisfied(query, &label, i, total, &body)
                            .await
                        {
                            result.satisfies_intent = Some(true);
                            progress.step_completed(i, total, Some(body)).await;
                            results.push(result);
                            return Ok(ExecutionOutcome {
                                results,
                                success: true,
                                early_termination: true,
                                termination_reason: Some(reason),
                                error: None,
                            });
                        }
                        result.satisfies_intent = Some(false);
                    }

                    progress.step_completed(i, total, Some(body)).await;
                    results.push(result);
                }
                Err(StepError::Cancelled) => return Err(ExecutionError::Cancelled),
                Err(StepError::Failed { status, error }) => {
                    results.push(StepResult {
                        index: i,
                        endpoint: label,
                        success: false,
                        status_code: status,
                        response: None,
                        error: Some(error.clone()),
                        duration_ms: started.elapsed().as_millis() as u64,
                        satisfies_intent: None,
                    });
                    return Ok(ExecutionOutcome {
                        results,
                        error: Some(error),
                        ..Default::default()
                    });
                }
            }
        }

        Ok(ExecutionOutcome {
            results,
            success: true,
            early_termination: false,
            termination_reason: None,
            error: None,
        })
    }

    async fn run_step(
        &self,
        step: &PlanStep,
        detail: &EndpointDetail,
        base: &Url,
        auth: &AuthBlob,
        interpolation_ctx: &Value,
        cancel: &CancellationToken,
    ) -> Result<HttpReply, StepError> {
        let placed = place_params(step, detail, interpolation_ctx)?;
        let url = build_step_url(base, detail, &placed)?;
        let url = self.apply_alias(url);

        let mut headers: Vec<(String, String)> = placed
            .header
            .iter()
            .map(|(name, value)| (name.clone(), value_to_string(value)))
            .collect();
        if let Some(header) = auth.header() {
            headers.push(header);
        }

        let body = if detail.endpoint.method.takes_body() && !placed.body.is_empty() {
            Some(Value::Object(placed.body))
        } else {
            None
        };

        let call = HttpCall {
            method: detail.endpoint.method,
            url,
            headers,
            body,
        };

        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(StepError::Cancelled);
            }
            match self.dispatcher.dispatch(&call).await {
                Ok(reply) if reply.is_success() => return Ok(reply),
                Ok(reply) if reply.status >= 500 && attempt == 0 => {
                    debug!(status = reply.status, endpoint = %detail.label(), "retrying after server error");
                    self.backoff(attempt, cancel).await?;
                    attempt += 1;
                }
                Ok(reply) => {
                    let raw = format!("{} returned HTTP {}", detail.label(), reply.status);
                    let error = status_message(
                        &self.repo,
                        detail.endpoint.project_id,
                        detail.endpoint.id,
                        reply.status,
                        &raw,
                    )
                    .await;
                    return Err(StepError::Failed {
                        status: Some(reply.status),
                        error,
                    });
                }
                Err(e) if e.is_retryable() && attempt == 0 => {
                    debug!(error = %e, endpoint = %detail.label(), "retrying after transport error");
                    self.backoff(attempt, cancel).await?;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(StepError::Failed {
                        status: None,
                        error: format!("{} failed: {}", detail.label(), e),
                    });
                }
            }
        }
    }

    /// Backoff `1s × (attempt + 1)`, interruptible by cancellation.
    async fn backoff(&self, attempt: u32, cancel: &CancellationToken) -> Result<(), StepError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(StepError::Cancelled),
            _ = tokio::time::sleep(STEP_RETRY_BACKOFF * (attempt + 1)) => Ok(()),
        }
    }

    fn apply_alias(&self, url: Url) -> Url {
        for (from, to) in &self.url_aliases {
            if let Some(rest) = url.as_str().strip_prefix(from.as_str()) {
                match Url::parse(&format!("{}{}", to, rest)) {
                    Ok(rewritten) => return rewritten,
                    Err(e) => {
                        warn!(from, to, error = %e, "url alias produced an invalid url; keeping original");
                        return url;
                    }
                }
            }
        }
        url
    }
}

/// Resolves each plan parameter and buckets it by its declared location.
fn place_params(
    step: &PlanStep,
    detail: &EndpointDetail,
    interpolation_ctx: &Value,
) -> Result<PlacedParams, StepError> {
    let mut placed = PlacedParams::default();
    for (name, value) in &step.params {
        let resolved = match value {
            ParamValue::Literal(v) => v.clone(),
            ParamValue::Reference(r) => {
                resolve(&r.render(), interpolation_ctx).map_err(|e| StepError::Failed {
                    status: None,
                    error: format!("parameter {:?}: {}", name, e),
                })?
            }
        };
        let Some(declared) = detail.parameter(name) else {
            warn!(endpoint = %detail.label(), name = %name, "dropping undeclared parameter");
            continue;
        };
        match declared.location {
            ParamLocation::Path => {
                placed.path.insert(name.clone(), resolved);
            }
            ParamLocation::Query => placed.query.push((name.clone(), resolved)),
            ParamLocation::Header => placed.header.push((name.clone(), resolved)),
            ParamLocation::Body => {
                placed.body.insert(name.clone(), resolved);
            }
        }
    }
    Ok(placed)
}

/// Joins the endpoint path onto the base URL, substituting `{name}` segments with
/// URL-encoded values, then appends query pairs (RFC 3986 serialization).
fn build_step_url(
    base: &Url,
    detail: &EndpointDetail,
    placed: &PlacedParams,
) -> Result<Url, StepError> {
    let mut url = base.clone();
    {
        let mut segments = url.path_segments_mut().map_err(|_| StepError::Failed {
            status: None,
            error: format!("base url {:?} cannot take a path", base.as_str()),
        })?;
        segments.pop_if_empty();
        for segment in detail.endpoint.path.split('/').filter(|s| !s.is_empty()) {
            if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                let value = placed.path.get(name).ok_or_else(|| StepError::Failed {
                    status: None,
                    error: format!(
                        "{} is missing path parameter {:?}",
                        detail.label(),
                        name
                    ),
                })?;
                segments.push(&value_to_string(value));
            } else {
                segments.push(segment);
            }
        }
    }
    for (name, value) in &placed.query {
        url.query_pairs_mut()
            .append_pair(name, &value_to_string(value));
    }
    Ok(url)
}
