//! Planner: user query + ranked endpoints + cached context → validated execution plan.
//!
//! The LLM reply goes through extraction, parsing, and [`validate_plan`] before anything
//! executes. A reply that fails to parse (or an LLM failure after its retry) falls back
//! to a one-step plan over a parameterless endpoint; validation failures propagate so the
//! healer can correct the query.

mod plan;
mod prompt;

pub use plan::{
    endpoint_for_step, parse_step_ref, validate_plan, ExecutionPlan, ParamValue, PlanError,
    PlanStep, StepRef,
};
pub use prompt::{build_planner_prompt, PLANNER_SYSTEM};

use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::CachedResponse;
use crate::intent::IntentResolver;
use crate::llm::{extract_json_object, LlmGateway};
use crate::metadata::{EndpointDetail, MetadataRepository};

/// Ranked endpoints passed to the prompt, at most.
pub const TOP_CANDIDATES: usize = 10;

/// Temperature for plan generation; low for determinism.
const PLAN_TEMPERATURE: f32 = 0.1;

/// Produces validated execution plans. One instance per process.
pub struct Planner {
    repo: Arc<MetadataRepository>,
    resolver: IntentResolver,
    gateway: Arc<dyn LlmGateway>,
}

impl Planner {
    pub fn new(repo: Arc<MetadataRepository>, gateway: Arc<dyn LlmGateway>) -> Self {
        Self {
            repo,
            resolver: IntentResolver::new(Arc::clone(&gateway)),
            gateway,
        }
    }

    /// Plans the given query. Errors:
    /// [`PlanError::NoEndpoints`] for an empty catalog, [`PlanError::NoSuitablePlan`]
    /// when even the fallback has nothing to call, and validation variants for plans
    /// the healer may be able to fix.
    pub async fn plan(
        &self,
        project_id: i64,
        query: &str,
        context: &[CachedResponse],
    ) -> Result<ExecutionPlan, PlanError> {
        let catalog = self.repo.endpoints(project_id).await?;
        if catalog.is_empty() {
            return Err(PlanError::NoEndpoints);
        }

        let ranked = self.resolver.rank(query, &catalog).await;
        let candidates: Vec<EndpointDetail> = ranked
            .into_iter()
            .take(TOP_CANDIDATES)
            .map(|s| s.detail)
            .collect();

        let user_prompt = build_planner_prompt(query, context, &candidates, &catalog);
        let plan = match self
            .gateway
            .chat(PLANNER_SYSTEM, &user_prompt, PLAN_TEMPERATURE, None)
            .await
        {
            Ok(raw) => match parse_plan(&raw) {
                Some(plan) if !plan.steps.is_empty() => plan,
                Some(_) => {
                    debug!("model returned an empty plan; using fallback");
                    fallback_plan(&catalog)?
                }
                None => {
                    warn!("model reply was not a valid plan; using fallback");
                    fallback_plan(&catalog)?
                }
            },
            Err(e) => {
                warn!(error = %e, "plan generation failed; using fallback");
                fallback_plan(&catalog)?
            }
        };

        validate_plan(&plan, &catalog)?;
        Ok(plan)
    }
}

fn parse_plan(raw: &str) -> Option<ExecutionPlan> {
    let region = extract_json_object(raw)?;
    serde_json::from_str(region).ok()
}

/// Fallback when the model produced nothing usable: the first GET with no path
/// parameters and no required parameters, else any endpoint with no required
/// parameters, else "no suitable plan".
pub fn fallback_plan(catalog: &[EndpointDetail]) -> Result<ExecutionPlan, PlanError> {
    let simple_get = catalog.iter().find(|d| {
        d.endpoint.method == crate::metadata::HttpMethod::Get
            && d.path_parameters().next().is_none()
            && d.required_parameters().next().is_none()
    });
    let chosen = simple_get.or_else(|| {
        catalog
            .iter()
            .find(|d| d.required_parameters().next().is_none())
    });
    match chosen {
        Some(detail) => Ok(ExecutionPlan::single(detail.label())),
        None => Err(PlanError::NoSuitablePlan),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockGateway;
    use crate::metadata::{
        HttpMethod, MetadataRepository, NewEndpoint, NewParameter, ParamLocation,
        SqliteMetadataStore,
    };

    async fn repo_with(
        endpoints: Vec<NewEndpoint>,
    ) -> (tempfile::TempDir, Arc<MetadataRepository>, i64) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteMetadataStore::new(dir.path().join("meta.db")).unwrap();
        let repo = Arc::new(MetadataRepository::new(Arc::new(store)));
        let project = repo
            .create_project(crate::metadata::NewProject {
                name: "petstore".to_string(),
                version: "1".to_string(),
                base_url: "https://petstore.example".to_string(),
                domain: None,
                description: None,
            })
            .await
            .unwrap();
        for e in endpoints {
            repo.insert_endpoint(project.id, e).await.unwrap();
        }
        (dir, repo, project.id)
    }

    fn find_by_status() -> NewEndpoint {
        let mut e = NewEndpoint::new(HttpMethod::Get, "/pet/findByStatus", "find pets by status");
        e.parameters.push(NewParameter {
            name: "status".to_string(),
            location: ParamLocation::Query,
            param_type: "string".to_string(),
            required: true,
            description: String::new(),
        });
        e
    }

    #[tokio::test]
    async fn valid_model_plan_passes_through() {
        let (_dir, repo, project_id) = repo_with(vec![find_by_status()]).await;
        let gateway = Arc::new(MockGateway::with_reply(
            r#"{"steps":[{"endpoint":"GET /pet/findByStatus","params":{"status":"available"}}]}"#,
        ));
        let planner = Planner::new(repo, gateway);

        let plan = planner.plan(project_id, "Find available pets", &[]).await.unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].endpoint, "GET /pet/findByStatus");
        assert_eq!(
            plan.steps[0].params["status"],
            ParamValue::literal("available")
        );
    }

    #[tokio::test]
    async fn empty_catalog_fails_cleanly() {
        let (_dir, repo, project_id) = repo_with(vec![]).await;
        let planner = Planner::new(repo, Arc::new(MockGateway::with_reply("{}")));
        let err = planner.plan(project_id, "anything", &[]).await.unwrap_err();
        assert!(matches!(err, PlanError::NoEndpoints));
    }

    #[tokio::test]
    async fn empty_steps_fall_back_to_parameterless_get() {
        let (_dir, repo, project_id) = repo_with(vec![
            find_by_status(),
            NewEndpoint::new(HttpMethod::Get, "/store/inventory", "inventory"),
        ])
        .await;
        let gateway = Arc::new(MockGateway::with_reply(r#"{"steps":[]}"#));
        let planner = Planner::new(repo, gateway);

        let plan = planner.plan(project_id, "whatever", &[]).await.unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].endpoint, "GET /store/inventory");
        assert!(plan.steps[0].params.is_empty());
    }

    #[tokio::test]
    async fn unparseable_reply_falls_back() {
        let (_dir, repo, project_id) = repo_with(vec![NewEndpoint::new(
            HttpMethod::Get,
            "/store/inventory",
            "inventory",
        )])
        .await;
        let gateway = Arc::new(MockGateway::with_reply("I cannot help with that."));
        let planner = Planner::new(repo, gateway);

        let plan = planner.plan(project_id, "inventory", &[]).await.unwrap();
        assert_eq!(plan.steps[0].endpoint, "GET /store/inventory");
    }

    #[tokio::test]
    async fn no_parameterless_endpoint_means_no_suitable_plan() {
        let (_dir, repo, project_id) = repo_with(vec![find_by_status()]).await;
        let gateway = Arc::new(MockGateway::with_reply(r#"{"steps":[]}"#));
        let planner = Planner::new(repo, gateway);

        let err = planner.plan(project_id, "whatever", &[]).await.unwrap_err();
        assert!(matches!(err, PlanError::NoSuitablePlan));
    }

    #[tokio::test]
    async fn invalid_reference_surfaces_for_healing() {
        let (_dir, repo, project_id) = repo_with(vec![find_by_status()]).await;
        let gateway = Arc::new(MockGateway::with_reply(
            r#"{"steps":[{"endpoint":"GET /pet/findByStatus","params":{"status":"$.steps[3].response.x"}}]}"#,
        ));
        let planner = Planner::new(repo, gateway);
        let err = planner.plan(project_id, "pets", &[]).await.unwrap_err();
        assert!(matches!(err, PlanError::ForwardReference { .. }));
    }
}
