//! Metadata store trait: persisted catalog operations behind one async seam.
//!
//! The repository layers its cache on top of this; [`super::SqliteMetadataStore`] is the
//! shipped implementation.

use async_trait::async_trait;
use thiserror::Error;

use super::entities::{
    EndpointDetail, NewEndpoint, NewFieldLink, NewParameter, NewProject, Project,
};

/// Metadata persistence error.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Underlying storage failed (connection, SQL, blocking task).
    #[error("metadata storage: {0}")]
    Storage(String),

    /// A referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint was violated, e.g. `(project, method, path)`.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Encoding or decoding a JSON column failed.
    #[error("metadata encoding: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Persisted catalog of projects and endpoints. Writes are transactional per call;
/// row-level writes are linearizable.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn create_project(&self, project: NewProject) -> Result<Project, MetadataError>;

    async fn project(&self, id: i64) -> Result<Project, MetadataError>;

    /// Inserts an endpoint with its parameters and response fields; returns the endpoint id.
    /// Fails with [`MetadataError::Duplicate`] when `(project_id, method, path)` exists.
    async fn insert_endpoint(
        &self,
        project_id: i64,
        endpoint: NewEndpoint,
    ) -> Result<i64, MetadataError>;

    /// Declares a field link; returns its id.
    async fn link_fields(&self, link: NewFieldLink) -> Result<i64, MetadataError>;

    /// All endpoints of a project, denormalized, ordered by endpoint id.
    async fn endpoints(&self, project_id: i64) -> Result<Vec<EndpointDetail>, MetadataError>;

    /// Inserts the parameter or, when `(endpoint_id, name)` exists, updates its
    /// location, type, required flag, and description.
    async fn upsert_parameter(
        &self,
        endpoint_id: i64,
        parameter: NewParameter,
    ) -> Result<(), MetadataError>;

    /// Renames a parameter. Returns `false` (no-op) when the old name does not exist
    /// or the new name is already taken on the same endpoint.
    async fn rename_parameter(
        &self,
        endpoint_id: i64,
        old_name: &str,
        new_name: &str,
    ) -> Result<bool, MetadataError>;

    /// Records a status message. Returns `false` (kept existing) when
    /// `(endpoint_id, status_code)` already has one.
    async fn upsert_response_message(
        &self,
        endpoint_id: i64,
        status_code: u16,
        message: &str,
        suggestion: &str,
    ) -> Result<bool, MetadataError>;

    /// Replaces the stored embedding vector of an endpoint.
    async fn set_endpoint_embedding(
        &self,
        endpoint_id: i64,
        embedding: &[f32],
    ) -> Result<(), MetadataError>;
}
