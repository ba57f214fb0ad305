//! # Apiweave
//!
//! A natural-language-to-API orchestration engine. Given a free-form user message and a
//! project id, apiweave ranks the project's registered HTTP endpoints against the
//! message, asks an LLM for a multi-step execution plan, runs the plan against the
//! target service with the caller's credentials forwarded, cuts execution short when a
//! partial result already answers the request, and on failure lets an LLM propose a
//! corrected query plus catalog fixes before retrying.
//!
//! ## Pipeline
//!
//! `ChatRequest → context → intent ranking → plan → execute(step i) → judge → done |
//! next step | heal + retry`, with progress updates emitted at each milestone and a
//! bounded retry budget per request.
//!
//! ## Main modules
//!
//! - [`metadata`]: persisted endpoint catalog ([`MetadataRepository`],
//!   [`SqliteMetadataStore`]) with per-project snapshot caching.
//! - [`context`]: TTL-tiered cache of past results and chat history
//!   ([`ContextCache`]).
//! - [`llm`]: the [`LlmGateway`] trait with [`OpenAiGateway`], [`MockGateway`], and
//!   the retrying/concurrency-limiting wrapper.
//! - [`intent`]: hybrid semantic + keyword + intent-pattern ranking
//!   ([`IntentResolver`]).
//! - [`planner`]: plan types, validation, and LLM plan generation ([`Planner`],
//!   [`ExecutionPlan`]).
//! - [`executor`]: step execution (interpolation, URL construction, auth
//!   forwarding, retries) with [`Executor`] and [`HttpDispatcher`].
//! - [`judge`]: early-termination oracle ([`TerminationJudge`]).
//! - [`healer`]: retry analyst and schema healer ([`Healer`]).
//! - [`chat`]: the public [`ChatService`] entry with blocking and streaming modes.
//! - [`render`]: the [`ResponseFormatter`] seam for the external display layer.
//!
//! Transport shells (HTTP, WebSocket) and OpenAPI ingestion live outside this crate;
//! they marshal [`ChatRequest`]/[`ChatResponse`] and drive the repository's admin
//! operations.

pub mod chat;
pub mod context;
pub mod executor;
pub mod healer;
pub mod intent;
pub mod judge;
pub mod llm;
pub mod metadata;
pub mod planner;
pub mod progress;
pub mod render;

pub use chat::{AuthBlob, ChatRequest, ChatResponse, ChatService, ExecutionDetails};
pub use context::{CachedResponse, CacheTtls, ContextCache, HistoryEntry};
pub use executor::{
    DispatchError, ExecutionError, ExecutionOutcome, Executor, HttpCall, HttpDispatcher,
    HttpReply, MockDispatcher, ReqwestDispatcher, StepResult,
};
pub use healer::{Healer, MetadataDeltas, RetryAdvice};
pub use intent::{IntentResolver, ScoredEndpoint, MATCH_THRESHOLD};
pub use judge::TerminationJudge;
pub use llm::{LlmError, LlmGateway, MockGateway, OpenAiGateway, RetryingGateway};
pub use metadata::{
    Endpoint, EndpointDetail, HttpMethod, MetadataError, MetadataRepository, NewEndpoint,
    NewFieldLink, NewParameter, NewProject, NewResponseField, ParamLocation, Project,
    SqliteMetadataStore,
};
pub use planner::{ExecutionPlan, ParamValue, PlanError, PlanStep, Planner};
pub use progress::ProgressSender;
pub use render::{FormattedResponse, PassthroughFormatter, ResponseFormatter};
pub use stream_update::{ChatStreamUpdate, UpdateKind};
