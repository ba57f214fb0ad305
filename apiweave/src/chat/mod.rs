//! Chat service: the public entry wiring context, planning, execution, judging, and
//! healing into one request pipeline.
//!
//! Pipeline per request: relevant context → plan → execute step-by-step (judge after
//! each non-final step) → on failure, ask the healer for a corrected query and catalog
//! deltas, then restart, at most `retry_budget` times. Progress updates flow
//! through a per-request channel; a cancellation token is honored at every suspension
//! point.

mod request;

pub use request::{AuthBlob, ChatRequest, ChatResponse, ExecutionDetails};

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use stream_update::ChatStreamUpdate;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::{CachedResponse, ContextCache};
use crate::executor::{ExecutionError, ExecutionOutcome, Executor, HttpDispatcher, StepResult};
use crate::healer::Healer;
use crate::llm::{LlmGateway, RetryingGateway};
use crate::metadata::MetadataRepository;
use crate::planner::{ExecutionPlan, PlanError, Planner};
use crate::progress::ProgressSender;
use crate::render::ResponseFormatter;
use env_config::EngineSettings;

/// Capacity of the update channel handed out by [`ChatService::stream_updates`].
const UPDATE_CHANNEL_CAPACITY: usize = 32;

/// Public chat entry point. One instance per process; all contained state is shared
/// and thread-safe, so concurrent requests run on independent tasks.
pub struct ChatService {
    repo: Arc<MetadataRepository>,
    cache: Arc<ContextCache>,
    planner: Planner,
    executor: Executor,
    healer: Healer,
    formatter: Arc<dyn ResponseFormatter>,
    retry_budget: usize,
}

impl ChatService {
    /// Wires the pipeline. The gateway is wrapped with the transient retry and the
    /// concurrency limit here, so callers pass the bare provider gateway.
    pub fn new(
        repo: Arc<MetadataRepository>,
        cache: Arc<ContextCache>,
        gateway: Arc<dyn LlmGateway>,
        dispatcher: Arc<dyn HttpDispatcher>,
        formatter: Arc<dyn ResponseFormatter>,
        settings: &EngineSettings,
    ) -> Self {
        let gateway: Arc<dyn LlmGateway> = Arc::new(RetryingGateway::new(
            gateway,
            settings.llm_concurrency,
        ));
        Self {
            planner: Planner::new(Arc::clone(&repo), Arc::clone(&gateway)),
            executor: Executor::new(Arc::clone(&repo), dispatcher, Arc::clone(&gateway))
                .with_url_aliases(settings.url_aliases.clone()),
            healer: Healer::new(gateway, Arc::clone(&repo)),
            repo,
            cache,
            formatter,
            retry_budget: settings.retry_budget,
        }
    }

    /// Blocking entry: runs the pipeline without progress updates.
    pub async fn process(&self, request: ChatRequest) -> ChatResponse {
        self.run(request, ProgressSender::disabled(), CancellationToken::new())
            .await
    }

    /// Streaming entry: progress updates go to `tx`; `cancel` aborts at the next
    /// suspension point.
    pub async fn process_stream(
        &self,
        request: ChatRequest,
        tx: mpsc::Sender<ChatStreamUpdate>,
        cancel: CancellationToken,
    ) -> ChatResponse {
        self.run(request, ProgressSender::new(tx), cancel).await
    }

    /// Convenience for embedders without channel plumbing: spawns the run, returns
    /// the update stream and the response handle.
    pub fn stream_updates(
        self: &Arc<Self>,
        request: ChatRequest,
    ) -> (
        ReceiverStream<ChatStreamUpdate>,
        tokio::task::JoinHandle<ChatResponse>,
    ) {
        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let service = Arc::clone(self);
        let handle = tokio::spawn(async move {
            service
                .process_stream(request, tx, CancellationToken::new())
                .await
        });
        (ReceiverStream::new(rx), handle)
    }

    async fn run(
        &self,
        request: ChatRequest,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> ChatResponse {
        let started = Instant::now();
        let request_id = uuid::Uuid::new_v4();
        debug!(
            %request_id,
            project_id = request.project_id,
            user_id = ?request.user_id,
            "chat request started"
        );
        progress.planning("Understanding your request", 10).await;

        let context = self.cache.find_relevant_context(
            request.project_id,
            &request.message,
            request.user_id.as_deref(),
        );
        if !context.is_empty() {
            progress
                .planning(
                    &format!("Found {} related past result(s)", context.len()),
                    20,
                )
                .await;
        }

        let mut query = request.message.clone();
        let mut retry_count = 0usize;

        loop {
            if cancel.is_cancelled() {
                return self.cancelled(&progress, started, retry_count).await;
            }

            progress
                .planning(
                    if retry_count == 0 {
                        "Planning API calls"
                    } else {
                        "Replanning with the corrected request"
                    },
                    30,
                )
                .await;

            let plan = match self.planner.plan(request.project_id, &query, &context).await {
                Ok(plan) => plan,
                Err(e @ (PlanError::NoEndpoints | PlanError::NoSuitablePlan)) => {
                    return self
                        .fail(
                            &progress,
                            format!("Could not plan this request: {}", e),
                            ExecutionDetails {
                                retry_count,
                                execution_time_ms: started.elapsed().as_millis() as u64,
                                ..Default::default()
                            },
                        )
                        .await;
                }
                Err(e) => {
                    let error = e.to_string();
                    debug!(error = %error, "planning failed; consulting healer");
                    if self
                        .try_heal(
                            request.project_id,
                            &error,
                            None,
                            &[],
                            &mut query,
                            &mut retry_count,
                            &cancel,
                        )
                        .await
                    {
                        continue;
                    }
                    return self
                        .fail(
                            &progress,
                            format!("Could not plan this request: {}", error),
                            ExecutionDetails {
                                retry_count,
                                execution_time_ms: started.elapsed().as_millis() as u64,
                                ..Default::default()
                            },
                        )
                        .await;
                }
            };
            progress
                .planning(&format!("Plan ready: {} step(s)", plan.steps.len()), 40)
                .await;

            let outcome = match self
                .executor
                .execute(
                    request.project_id,
                    &plan,
                    &query,
                    &request.auth,
                    &cancel,
                    &progress,
                )
                .await
            {
                Ok(outcome) => outcome,
                Err(ExecutionError::Cancelled) => {
                    return self.cancelled(&progress, started, retry_count).await;
                }
                Err(e) => {
                    return self
                        .fail(
                            &progress,
                            e.to_string(),
                            ExecutionDetails {
                                plan_steps: plan.steps.len(),
                                retry_count,
                                execution_time_ms: started.elapsed().as_millis() as u64,
                                ..Default::default()
                            },
                        )
                        .await;
                }
            };

            if outcome.success {
                return self
                    .finish_success(&request, plan, outcome, retry_count, started, &progress)
                    .await;
            }

            let error = outcome
                .error
                .clone()
                .unwrap_or_else(|| "execution failed".to_string());
            if self
                .try_heal(
                    request.project_id,
                    &error,
                    Some(&plan),
                    &outcome.results,
                    &mut query,
                    &mut retry_count,
                    &cancel,
                )
                .await
            {
                continue;
            }

            return self
                .fail(
                    &progress,
                    error,
                    ExecutionDetails {
                        plan_steps: plan.steps.len(),
                        steps_executed: outcome.results.len(),
                        retry_count,
                        execution_time_ms: started.elapsed().as_millis() as u64,
                        ..Default::default()
                    },
                )
                .await;
        }
    }

    /// Runs both healer roles. Returns `true` when the pipeline should restart with
    /// the corrected query (budget left, analyst approved, query present).
    #[allow(clippy::too_many_arguments)]
    async fn try_heal(
        &self,
        project_id: i64,
        error: &str,
        plan: Option<&ExecutionPlan>,
        results: &[StepResult],
        query: &mut String,
        retry_count: &mut usize,
        cancel: &CancellationToken,
    ) -> bool {
        if *retry_count >= self.retry_budget || cancel.is_cancelled() {
            return false;
        }

        let advice = self.healer.advise_retry(query, error, plan, results).await;
        let deltas = self.healer.extract_deltas(query, error, plan, results).await;
        if !deltas.is_empty() {
            let applied = self.healer.apply_deltas(project_id, &deltas).await;
            debug!(applied, "healer applied metadata deltas");
        }

        match advice.corrected() {
            Some(corrected) => {
                debug!(corrected, analysis = %advice.analysis, "retrying with corrected query");
                *query = corrected.to_string();
                *retry_count += 1;
                true
            }
            None => false,
        }
    }

    async fn finish_success(
        &self,
        request: &ChatRequest,
        plan: ExecutionPlan,
        outcome: ExecutionOutcome,
        retry_count: usize,
        started: Instant,
        progress: &ProgressSender,
    ) -> ChatResponse {
        let last = outcome.results.last();
        let data: Option<Value> = last.and_then(|r| r.response.clone());
        let endpoint = last.map(|r| r.endpoint.clone()).unwrap_or_default();

        progress.formatting().await;
        let formatted = match self
            .formatter
            .format(data.as_ref().unwrap_or(&Value::Null), &endpoint)
            .await
        {
            Ok(f) => Some(f),
            Err(e) => {
                warn!(error = %e, "formatter failed; returning raw data only");
                None
            }
        };

        let message = outcome.termination_reason.clone().unwrap_or_else(|| {
            format!(
                "Executed {} of {} step(s)",
                outcome.results.len(),
                plan.steps.len()
            )
        });

        self.cache.store_response(CachedResponse {
            project_id: request.project_id,
            query: request.message.clone(),
            user_id: request.user_id.clone(),
            endpoint,
            data: data.clone().unwrap_or(Value::Null),
            created_at: Utc::now(),
        });
        self.cache
            .append_history(request.user_id.as_deref(), &request.message, &message);

        let execution_time_ms = started.elapsed().as_millis() as u64;
        progress.completed(&message, data.clone(), execution_time_ms).await;

        let (formatted_response, visual_response) = match formatted {
            Some(f) => (Some(f.text), f.visual),
            None => (None, None),
        };

        ChatResponse {
            success: true,
            message,
            data,
            formatted_response,
            visual_response,
            execution_details: ExecutionDetails {
                plan_steps: plan.steps.len(),
                steps_executed: outcome.results.len(),
                execution_time_ms,
                retry_count,
                early_termination: outcome.early_termination,
                termination_reason: outcome.termination_reason,
            },
            error: None,
        }
    }

    async fn fail(
        &self,
        progress: &ProgressSender,
        error: String,
        execution_details: ExecutionDetails,
    ) -> ChatResponse {
        progress.error(&error).await;
        ChatResponse {
            success: false,
            message: error.clone(),
            data: None,
            formatted_response: None,
            visual_response: None,
            execution_details,
            error: Some(error),
        }
    }

    async fn cancelled(
        &self,
        progress: &ProgressSender,
        started: Instant,
        retry_count: usize,
    ) -> ChatResponse {
        self.fail(
            progress,
            "Request cancelled".to_string(),
            ExecutionDetails {
                retry_count,
                execution_time_ms: started.elapsed().as_millis() as u64,
                ..Default::default()
            },
        )
        .await
    }

    /// Chat history for a user or the anonymous bucket (transport surfaces expose it).
    pub fn history(&self, user_id: Option<&str>) -> Vec<crate::context::HistoryEntry> {
        self.cache.history(user_id)
    }

    /// The metadata repository this service runs against (ingestion/admin surfaces).
    pub fn repository(&self) -> &Arc<MetadataRepository> {
        &self.repo
    }
}
