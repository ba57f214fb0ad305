//! Metadata repository: persisted endpoint catalog with a per-project read cache.
//!
//! Reads go through a denormalized `DashMap` snapshot keyed by project id; any write to a
//! project (or an explicit [`MetadataRepository::invalidate`]) drops that project's snapshot.
//! The healer and admin/ingestion paths are the only writers after startup.

pub mod entities;
mod sqlite;
mod store;

pub use entities::{
    parse_label, Endpoint, EndpointDetail, FieldLink, HttpMethod, NewEndpoint, NewFieldLink,
    NewParameter, NewProject, NewResponseField, ParamLocation, Project, RequestParameter,
    ResponseField, ResponseMessage,
};
pub use sqlite::SqliteMetadataStore;
pub use store::{MetadataError, MetadataStore};

use std::sync::Arc;

use dashmap::DashMap;

/// Catalog facade the rest of the engine talks to.
///
/// Thread-safe; one instance per process, created at startup.
pub struct MetadataRepository {
    store: Arc<dyn MetadataStore>,
    cache: DashMap<i64, Arc<Vec<EndpointDetail>>>,
}

impl MetadataRepository {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
        }
    }

    pub async fn project(&self, id: i64) -> Result<Project, MetadataError> {
        self.store.project(id).await
    }

    pub async fn create_project(&self, project: NewProject) -> Result<Project, MetadataError> {
        self.store.create_project(project).await
    }

    /// Denormalized endpoint list for a project, served from cache when warm.
    pub async fn endpoints(&self, project_id: i64) -> Result<Arc<Vec<EndpointDetail>>, MetadataError> {
        if let Some(cached) = self.cache.get(&project_id) {
            return Ok(Arc::clone(&cached));
        }
        let loaded = Arc::new(self.store.endpoints(project_id).await?);
        self.cache.insert(project_id, Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Drops the cached snapshot for a project.
    pub fn invalidate(&self, project_id: i64) {
        self.cache.remove(&project_id);
    }

    /// Exact `(method, path)` lookup over the cached snapshot. Method comparison is
    /// case-insensitive (normalized at parse time); path comparison is case-sensitive.
    pub async fn find_endpoint(
        &self,
        project_id: i64,
        method: HttpMethod,
        path: &str,
    ) -> Result<Option<EndpointDetail>, MetadataError> {
        let endpoints = self.endpoints(project_id).await?;
        Ok(endpoints
            .iter()
            .find(|d| d.endpoint.method == method && d.endpoint.path == path)
            .cloned())
    }

    /// Lookup by a `METHOD /path` label; `None` when the label is malformed or unknown.
    pub async fn find_by_label(
        &self,
        project_id: i64,
        label: &str,
    ) -> Result<Option<EndpointDetail>, MetadataError> {
        let Some((method, path)) = parse_label(label) else {
            return Ok(None);
        };
        self.find_endpoint(project_id, method, path).await
    }

    /// Status message ladder steps (a) and (b): the endpoint's own message for `status`,
    /// else any message in the project for `status` (lowest endpoint id wins).
    pub async fn message_for_status(
        &self,
        project_id: i64,
        endpoint_id: i64,
        status: u16,
    ) -> Result<Option<ResponseMessage>, MetadataError> {
        let endpoints = self.endpoints(project_id).await?;
        let specific = endpoints
            .iter()
            .filter(|d| d.endpoint.id == endpoint_id)
            .flat_map(|d| d.messages.iter())
            .find(|m| m.status_code == status);
        if let Some(m) = specific {
            return Ok(Some(m.clone()));
        }
        Ok(endpoints
            .iter()
            .flat_map(|d| d.messages.iter())
            .find(|m| m.status_code == status)
            .cloned())
    }

    pub async fn insert_endpoint(
        &self,
        project_id: i64,
        endpoint: NewEndpoint,
    ) -> Result<i64, MetadataError> {
        let id = self.store.insert_endpoint(project_id, endpoint).await?;
        self.invalidate(project_id);
        Ok(id)
    }

    pub async fn link_fields(
        &self,
        project_id: i64,
        link: NewFieldLink,
    ) -> Result<i64, MetadataError> {
        let id = self.store.link_fields(link).await?;
        self.invalidate(project_id);
        Ok(id)
    }

    pub async fn upsert_parameter(
        &self,
        project_id: i64,
        endpoint_id: i64,
        parameter: NewParameter,
    ) -> Result<(), MetadataError> {
        self.store.upsert_parameter(endpoint_id, parameter).await?;
        self.invalidate(project_id);
        Ok(())
    }

    pub async fn rename_parameter(
        &self,
        project_id: i64,
        endpoint_id: i64,
        old_name: &str,
        new_name: &str,
    ) -> Result<bool, MetadataError> {
        let applied = self
            .store
            .rename_parameter(endpoint_id, old_name, new_name)
            .await?;
        if applied {
            self.invalidate(project_id);
        }
        Ok(applied)
    }

    pub async fn upsert_response_message(
        &self,
        project_id: i64,
        endpoint_id: i64,
        status_code: u16,
        message: &str,
        suggestion: &str,
    ) -> Result<bool, MetadataError> {
        let inserted = self
            .store
            .upsert_response_message(endpoint_id, status_code, message, suggestion)
            .await?;
        if inserted {
            self.invalidate(project_id);
        }
        Ok(inserted)
    }

    pub async fn set_endpoint_embedding(
        &self,
        project_id: i64,
        endpoint_id: i64,
        embedding: &[f32],
    ) -> Result<(), MetadataError> {
        self.store
            .set_endpoint_embedding(endpoint_id, embedding)
            .await?;
        self.invalidate(project_id);
        Ok(())
    }
}
