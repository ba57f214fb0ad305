//! Shared fixtures for the end-to-end tests: a petstore-like catalog, a scripted
//! gateway, a scripted dispatcher, and a fully wired [`ChatService`].
//!
//! Include `mod common;` in an integration test file. Run with logs:
//!
//! ```bash
//! RUST_LOG=apiweave=debug cargo test -p apiweave -- --nocapture
//! ```

// Each test binary compiles its own copy; not every binary uses every fixture.
#![allow(dead_code)]

use std::sync::Arc;

use apiweave::{
    ChatService, ContextCache, HttpMethod, MetadataRepository, MockDispatcher, MockGateway,
    NewEndpoint, NewParameter, NewProject, NewResponseField, ParamLocation, PassthroughFormatter,
    SqliteMetadataStore,
};
use ctor::ctor;
use env_config::EngineSettings;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[ctor]
fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_test_writer()
                .with_filter(filter),
        )
        .try_init();
}

pub const BASE_URL: &str = "https://petstore.example";

/// Everything a scenario needs to drive and inspect one service instance.
pub struct Harness {
    pub _dir: tempfile::TempDir,
    pub repo: Arc<MetadataRepository>,
    pub cache: Arc<ContextCache>,
    pub gateway: Arc<MockGateway>,
    pub dispatcher: Arc<MockDispatcher>,
    pub service: Arc<ChatService>,
    pub project_id: i64,
}

/// Wires a service over the given catalog, gateway script, and dispatcher script.
pub async fn harness(
    endpoints: Vec<NewEndpoint>,
    gateway: MockGateway,
    dispatcher: MockDispatcher,
) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteMetadataStore::new(dir.path().join("meta.db")).expect("store");
    let repo = Arc::new(MetadataRepository::new(Arc::new(store)));
    let project = repo
        .create_project(NewProject {
            name: "petstore".to_string(),
            version: "1.0.0".to_string(),
            base_url: BASE_URL.to_string(),
            domain: Some("pets".to_string()),
            description: None,
        })
        .await
        .expect("project");
    for endpoint in endpoints {
        repo.insert_endpoint(project.id, endpoint)
            .await
            .expect("endpoint");
    }

    let cache = Arc::new(ContextCache::new());
    let gateway = Arc::new(gateway);
    let dispatcher = Arc::new(dispatcher);
    let service = Arc::new(ChatService::new(
        Arc::clone(&repo),
        Arc::clone(&cache),
        gateway.clone(),
        dispatcher.clone(),
        Arc::new(PassthroughFormatter),
        &EngineSettings::default(),
    ));

    Harness {
        _dir: dir,
        repo,
        cache,
        gateway,
        dispatcher,
        service,
        project_id: project.id,
    }
}

fn param(name: &str, location: ParamLocation, required: bool) -> NewParameter {
    NewParameter {
        name: name.to_string(),
        location,
        param_type: "string".to_string(),
        required,
        description: String::new(),
    }
}

/// `GET /pet/findByStatus` with a required `status` query parameter.
pub fn find_by_status_endpoint() -> NewEndpoint {
    let mut e = NewEndpoint::new(HttpMethod::Get, "/pet/findByStatus", "Finds pets by status");
    e.keywords = ["pet", "status", "available"]
        .into_iter()
        .map(String::from)
        .collect();
    e.intent_patterns = vec!["find available pets".to_string()];
    e.parameters.push(param("status", ParamLocation::Query, true));
    e
}

/// `GET /user/{username}` returning `{id, username}`.
pub fn user_endpoint() -> NewEndpoint {
    let mut e = NewEndpoint::new(HttpMethod::Get, "/user/{username}", "Gets a user by name");
    e.keywords = ["user", "username"].into_iter().map(String::from).collect();
    e.parameters.push(param("username", ParamLocation::Path, true));
    e.response_fields.push(NewResponseField {
        json_path: "$.id".to_string(),
        field_type: "integer".to_string(),
        description: "user id".to_string(),
    });
    e
}

/// `GET /orders` taking a required `userId` query parameter.
pub fn orders_endpoint() -> NewEndpoint {
    let mut e = NewEndpoint::new(HttpMethod::Get, "/orders", "Lists a user's orders");
    e.keywords = ["order", "orders"].into_iter().map(String::from).collect();
    e.parameters.push(param("userId", ParamLocation::Query, true));
    e
}

/// `POST /pet` with only `name` declared (photoUrls intentionally absent).
pub fn add_pet_endpoint() -> NewEndpoint {
    let mut e = NewEndpoint::new(HttpMethod::Post, "/pet", "Adds a new pet");
    e.keywords = ["pet", "add", "new"].into_iter().map(String::from).collect();
    e.parameters.push(param("name", ParamLocation::Body, true));
    e
}
