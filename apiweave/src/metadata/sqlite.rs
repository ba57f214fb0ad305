//! SQLite-backed metadata store. Persistent across process restarts.
//!
//! One file per store; connections are opened per call inside `spawn_blocking` so async
//! callers never hold a blocking handle. List-shaped columns (keywords, intent patterns,
//! embeddings) are stored as JSON text.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::entities::{
    Endpoint, EndpointDetail, FieldLink, HttpMethod, NewEndpoint, NewFieldLink, NewParameter,
    NewProject, ParamLocation, Project, RequestParameter, ResponseField, ResponseMessage,
};
use super::store::{MetadataError, MetadataStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    version     TEXT NOT NULL DEFAULT '',
    base_url    TEXT NOT NULL,
    domain      TEXT,
    description TEXT,
    created_at  INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS endpoints (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id      INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    method          TEXT NOT NULL,
    path            TEXT NOT NULL,
    summary         TEXT NOT NULL DEFAULT '',
    prompt_text     TEXT NOT NULL DEFAULT '',
    keywords        TEXT NOT NULL DEFAULT '[]',
    intent_patterns TEXT NOT NULL DEFAULT '[]',
    embedding       TEXT NOT NULL DEFAULT '[]',
    UNIQUE (project_id, method, path)
);
CREATE TABLE IF NOT EXISTS request_parameters (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    endpoint_id INTEGER NOT NULL REFERENCES endpoints(id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    location    TEXT NOT NULL,
    param_type  TEXT NOT NULL DEFAULT 'string',
    required    INTEGER NOT NULL DEFAULT 0,
    description TEXT NOT NULL DEFAULT '',
    UNIQUE (endpoint_id, name)
);
CREATE TABLE IF NOT EXISTS response_fields (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    endpoint_id INTEGER NOT NULL REFERENCES endpoints(id) ON DELETE CASCADE,
    json_path   TEXT NOT NULL,
    field_type  TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS field_links (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    from_field_id INTEGER NOT NULL REFERENCES response_fields(id) ON DELETE CASCADE,
    to_endpoint_id INTEGER NOT NULL REFERENCES endpoints(id) ON DELETE CASCADE,
    to_param_name TEXT NOT NULL,
    relation_type TEXT NOT NULL DEFAULT '',
    description   TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS response_messages (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    endpoint_id INTEGER NOT NULL REFERENCES endpoints(id) ON DELETE CASCADE,
    status_code INTEGER NOT NULL,
    message     TEXT NOT NULL,
    suggestion  TEXT NOT NULL DEFAULT '',
    UNIQUE (endpoint_id, status_code)
);
"#;

fn storage_err(e: impl std::fmt::Display) -> MetadataError {
    MetadataError::Storage(e.to_string())
}

/// Maps a rusqlite error, turning constraint violations into [`MetadataError::Duplicate`].
fn sql_err(e: rusqlite::Error, what: &str) -> MetadataError {
    if let rusqlite::Error::SqliteFailure(inner, _) = &e {
        if inner.code == rusqlite::ErrorCode::ConstraintViolation {
            return MetadataError::Duplicate(format!("{}: {}", what, e));
        }
    }
    storage_err(e)
}

fn method_from_column(raw: &str) -> Result<HttpMethod, MetadataError> {
    HttpMethod::parse(raw)
        .ok_or_else(|| MetadataError::Storage(format!("unknown method in store: {}", raw)))
}

fn location_from_column(raw: &str) -> Result<ParamLocation, MetadataError> {
    ParamLocation::parse(raw)
        .ok_or_else(|| MetadataError::Storage(format!("unknown param location in store: {}", raw)))
}

/// SQLite-backed [`MetadataStore`]. Single-node; the repository cache sits above it.
pub struct SqliteMetadataStore {
    db_path: std::path::PathBuf,
}

impl SqliteMetadataStore {
    /// Opens (or creates) the store at `path` and ensures the schema exists.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, MetadataError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = Connection::open(&db_path).map_err(storage_err)?;
        conn.execute_batch(SCHEMA).map_err(storage_err)?;
        Ok(Self { db_path })
    }

    fn open(db_path: &Path) -> Result<Connection, MetadataError> {
        let conn = Connection::open(db_path).map_err(storage_err)?;
        conn.execute("PRAGMA foreign_keys = ON", []).map_err(storage_err)?;
        Ok(conn)
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, MetadataError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, MetadataError> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = Self::open(&db_path)?;
            f(&mut conn)
        })
        .await
        .map_err(storage_err)?
    }
}

fn read_project_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, String, String, String, Option<String>, Option<String>, i64)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn project_from_row(
    (id, name, version, base_url, domain, description, created_ms): (
        i64,
        String,
        String,
        String,
        Option<String>,
        Option<String>,
        i64,
    ),
) -> Project {
    let created_at = DateTime::<Utc>::from_timestamp_millis(created_ms).unwrap_or_default();
    Project {
        id,
        name,
        version,
        base_url,
        domain,
        description,
        created_at,
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn create_project(&self, project: NewProject) -> Result<Project, MetadataError> {
        self.with_conn(move |conn| {
            let created_ms = Utc::now().timestamp_millis();
            conn.execute(
                "INSERT INTO projects (name, version, base_url, domain, description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    project.name,
                    project.version,
                    project.base_url,
                    project.domain,
                    project.description,
                    created_ms
                ],
            )
            .map_err(|e| sql_err(e, "project"))?;
            let id = conn.last_insert_rowid();
            Ok(Project {
                id,
                name: project.name,
                version: project.version,
                base_url: project.base_url,
                domain: project.domain,
                description: project.description,
                created_at: DateTime::<Utc>::from_timestamp_millis(created_ms)
                    .unwrap_or_default(),
            })
        })
        .await
    }

    async fn project(&self, id: i64) -> Result<Project, MetadataError> {
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, version, base_url, domain, description, created_at
                     FROM projects WHERE id = ?1",
                    params![id],
                    read_project_row,
                )
                .optional()
                .map_err(storage_err)?;
            row.map(project_from_row)
                .ok_or_else(|| MetadataError::NotFound(format!("project {}", id)))
        })
        .await
    }

    async fn insert_endpoint(
        &self,
        project_id: i64,
        endpoint: NewEndpoint,
    ) -> Result<i64, MetadataError> {
        let keywords = serde_json::to_string(&endpoint.keywords)?;
        let patterns = serde_json::to_string(&endpoint.intent_patterns)?;
        let embedding = serde_json::to_string(&endpoint.embedding)?;
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(storage_err)?;
            tx.execute(
                "INSERT INTO endpoints
                     (project_id, method, path, summary, prompt_text, keywords, intent_patterns, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    project_id,
                    endpoint.method.as_str(),
                    endpoint.path,
                    endpoint.summary,
                    endpoint.prompt_text,
                    keywords,
                    patterns,
                    embedding
                ],
            )
            .map_err(|e| sql_err(e, "endpoint"))?;
            let endpoint_id = tx.last_insert_rowid();

            for p in &endpoint.parameters {
                tx.execute(
                    "INSERT INTO request_parameters
                         (endpoint_id, name, location, param_type, required, description)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        endpoint_id,
                        p.name,
                        p.location.as_str(),
                        p.param_type,
                        p.required as i64,
                        p.description
                    ],
                )
                .map_err(|e| sql_err(e, "parameter"))?;
            }
            for f in &endpoint.response_fields {
                tx.execute(
                    "INSERT INTO response_fields (endpoint_id, json_path, field_type, description)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![endpoint_id, f.json_path, f.field_type, f.description],
                )
                .map_err(|e| sql_err(e, "response field"))?;
            }

            tx.commit().map_err(storage_err)?;
            Ok(endpoint_id)
        })
        .await
    }

    async fn link_fields(&self, link: NewFieldLink) -> Result<i64, MetadataError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO field_links
                     (from_field_id, to_endpoint_id, to_param_name, relation_type, description)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    link.from_field_id,
                    link.to_endpoint_id,
                    link.to_param_name,
                    link.relation_type,
                    link.description
                ],
            )
            .map_err(|e| sql_err(e, "field link"))?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn endpoints(&self, project_id: i64) -> Result<Vec<EndpointDetail>, MetadataError> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, method, path, summary, prompt_text, keywords, intent_patterns, embedding
                     FROM endpoints WHERE project_id = ?1 ORDER BY id",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(params![project_id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                })
                .map_err(storage_err)?;

            let mut details: Vec<EndpointDetail> = Vec::new();
            let mut index_by_id: std::collections::HashMap<i64, usize> =
                std::collections::HashMap::new();
            for row in rows {
                let (id, method, path, summary, prompt_text, keywords, patterns, embedding) =
                    row.map_err(storage_err)?;
                let endpoint = Endpoint {
                    id,
                    project_id,
                    method: method_from_column(&method)?,
                    path,
                    summary,
                    prompt_text,
                    keywords: serde_json::from_str(&keywords)?,
                    intent_patterns: serde_json::from_str(&patterns)?,
                    embedding: serde_json::from_str(&embedding)?,
                };
                index_by_id.insert(id, details.len());
                details.push(EndpointDetail {
                    endpoint,
                    parameters: Vec::new(),
                    response_fields: Vec::new(),
                    links: Vec::new(),
                    messages: Vec::new(),
                });
            }

            let mut stmt = conn
                .prepare(
                    "SELECT p.id, p.endpoint_id, p.name, p.location, p.param_type, p.required, p.description
                     FROM request_parameters p
                     JOIN endpoints e ON p.endpoint_id = e.id
                     WHERE e.project_id = ?1 ORDER BY p.id",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(params![project_id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                })
                .map_err(storage_err)?;
            for row in rows {
                let (id, endpoint_id, name, location, param_type, required, description) =
                    row.map_err(storage_err)?;
                if let Some(&i) = index_by_id.get(&endpoint_id) {
                    details[i].parameters.push(RequestParameter {
                        id,
                        endpoint_id,
                        name,
                        location: location_from_column(&location)?,
                        param_type,
                        required: required != 0,
                        description,
                    });
                }
            }

            let mut stmt = conn
                .prepare(
                    "SELECT f.id, f.endpoint_id, f.json_path, f.field_type, f.description
                     FROM response_fields f
                     JOIN endpoints e ON f.endpoint_id = e.id
                     WHERE e.project_id = ?1 ORDER BY f.id",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(params![project_id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })
                .map_err(storage_err)?;
            for row in rows {
                let (id, endpoint_id, json_path, field_type, description) =
                    row.map_err(storage_err)?;
                if let Some(&i) = index_by_id.get(&endpoint_id) {
                    details[i].response_fields.push(ResponseField {
                        id,
                        endpoint_id,
                        json_path,
                        field_type,
                        description,
                    });
                }
            }

            let mut stmt = conn
                .prepare(
                    "SELECT l.id, l.from_field_id, l.to_endpoint_id, l.to_param_name,
                            l.relation_type, l.description, f.endpoint_id
                     FROM field_links l
                     JOIN response_fields f ON l.from_field_id = f.id
                     JOIN endpoints e ON f.endpoint_id = e.id
                     WHERE e.project_id = ?1 ORDER BY l.id",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(params![project_id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                })
                .map_err(storage_err)?;
            for row in rows {
                let (id, from_field_id, to_endpoint_id, to_param_name, relation_type, description, owner) =
                    row.map_err(storage_err)?;
                if let Some(&i) = index_by_id.get(&owner) {
                    details[i].links.push(FieldLink {
                        id,
                        from_field_id,
                        to_endpoint_id,
                        to_param_name,
                        relation_type,
                        description,
                    });
                }
            }

            let mut stmt = conn
                .prepare(
                    "SELECT m.id, m.endpoint_id, m.status_code, m.message, m.suggestion
                     FROM response_messages m
                     JOIN endpoints e ON m.endpoint_id = e.id
                     WHERE e.project_id = ?1 ORDER BY m.id",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(params![project_id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })
                .map_err(storage_err)?;
            for row in rows {
                let (id, endpoint_id, status_code, message, suggestion) =
                    row.map_err(storage_err)?;
                if let Some(&i) = index_by_id.get(&endpoint_id) {
                    details[i].messages.push(ResponseMessage {
                        id,
                        endpoint_id,
                        status_code: status_code as u16,
                        message,
                        suggestion,
                    });
                }
            }

            Ok(details)
        })
        .await
    }

    async fn upsert_parameter(
        &self,
        endpoint_id: i64,
        parameter: NewParameter,
    ) -> Result<(), MetadataError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO request_parameters
                     (endpoint_id, name, location, param_type, required, description)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (endpoint_id, name) DO UPDATE SET
                     location = excluded.location,
                     param_type = excluded.param_type,
                     required = excluded.required,
                     description = CASE
                         WHEN excluded.description != '' THEN excluded.description
                         ELSE request_parameters.description
                     END",
                params![
                    endpoint_id,
                    parameter.name,
                    parameter.location.as_str(),
                    parameter.param_type,
                    parameter.required as i64,
                    parameter.description
                ],
            )
            .map_err(|e| sql_err(e, "parameter"))?;
            Ok(())
        })
        .await
    }

    async fn rename_parameter(
        &self,
        endpoint_id: i64,
        old_name: &str,
        new_name: &str,
    ) -> Result<bool, MetadataError> {
        let old_name = old_name.to_string();
        let new_name = new_name.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(storage_err)?;
            let new_exists: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM request_parameters WHERE endpoint_id = ?1 AND name = ?2",
                    params![endpoint_id, new_name],
                    |row| row.get(0),
                )
                .map_err(storage_err)?;
            if new_exists > 0 {
                return Ok(false);
            }
            let changed = tx
                .execute(
                    "UPDATE request_parameters SET name = ?3 WHERE endpoint_id = ?1 AND name = ?2",
                    params![endpoint_id, old_name, new_name],
                )
                .map_err(|e| sql_err(e, "parameter rename"))?;
            tx.commit().map_err(storage_err)?;
            Ok(changed > 0)
        })
        .await
    }

    async fn upsert_response_message(
        &self,
        endpoint_id: i64,
        status_code: u16,
        message: &str,
        suggestion: &str,
    ) -> Result<bool, MetadataError> {
        let message = message.to_string();
        let suggestion = suggestion.to_string();
        self.with_conn(move |conn| {
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO response_messages
                         (endpoint_id, status_code, message, suggestion)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![endpoint_id, status_code as i64, message, suggestion],
                )
                .map_err(|e| sql_err(e, "response message"))?;
            Ok(inserted > 0)
        })
        .await
    }

    async fn set_endpoint_embedding(
        &self,
        endpoint_id: i64,
        embedding: &[f32],
    ) -> Result<(), MetadataError> {
        let encoded = serde_json::to_string(embedding)?;
        self.with_conn(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE endpoints SET embedding = ?2 WHERE id = ?1",
                    params![endpoint_id, encoded],
                )
                .map_err(storage_err)?;
            if changed == 0 {
                return Err(MetadataError::NotFound(format!("endpoint {}", endpoint_id)));
            }
            Ok(())
        })
        .await
    }
}
