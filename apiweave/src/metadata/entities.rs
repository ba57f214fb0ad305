//! Catalog entities: projects, endpoints, parameters, response fields, field links,
//! response messages. Normalized rows with integer keys; the denormalized
//! [`EndpointDetail`] is the read-only snapshot the planner and executor work from.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// HTTP method of an endpoint. Parsing is case-insensitive; rendering is upper-case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            "PATCH" => Some(Self::Patch),
            "HEAD" => Some(Self::Head),
            "OPTIONS" => Some(Self::Options),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Methods whose body params are combined into a JSON request body.
    pub fn takes_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a request parameter is placed on the outgoing call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Body,
}

impl ParamLocation {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "body" => Some(Self::Body),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Body => "body",
        }
    }
}

/// A registered API project; owns endpoints. Destroyed when its API document is replaced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub version: String,
    /// Absolute http/https base URL the executor dispatches against.
    pub base_url: String,
    pub domain: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One `(method, path)` of a project's API, with the retrieval signals ingestion produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: i64,
    pub project_id: i64,
    pub method: HttpMethod,
    pub path: String,
    pub summary: String,
    pub prompt_text: String,
    pub keywords: BTreeSet<String>,
    /// Ordered: earlier patterns are the more canonical utterances.
    pub intent_patterns: Vec<String>,
    /// Empty when no embedding has been computed yet.
    pub embedding: Vec<f32>,
}

impl Endpoint {
    /// Canonical `METHOD /path` label used in plans, prompts, and lookups.
    pub fn label(&self) -> String {
        format!("{} {}", self.method.as_str(), self.path)
    }
}

/// Declared request parameter of an endpoint. Unique on `(endpoint_id, name)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestParameter {
    pub id: i64,
    pub endpoint_id: i64,
    pub name: String,
    pub location: ParamLocation,
    pub param_type: String,
    pub required: bool,
    pub description: String,
}

/// A field of an endpoint's response, addressed by JSONPath (`$`, `.field`, `[i]`, `[*]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseField {
    pub id: i64,
    pub endpoint_id: i64,
    pub json_path: String,
    pub field_type: String,
    pub description: String,
}

/// Data-flow hint: the value at `from_field`'s path may feed `to_param_name` of `to_endpoint`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldLink {
    pub id: i64,
    pub from_field_id: i64,
    pub to_endpoint_id: i64,
    pub to_param_name: String,
    pub relation_type: String,
    pub description: String,
}

/// User-visible text for an HTTP status returned by an endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub id: i64,
    pub endpoint_id: i64,
    pub status_code: u16,
    pub message: String,
    pub suggestion: String,
}

/// Denormalized endpoint snapshot: the row plus everything hanging off it.
///
/// This is what the repository cache stores per project and what C4/C5/C6 read.
#[derive(Clone, Debug)]
pub struct EndpointDetail {
    pub endpoint: Endpoint,
    pub parameters: Vec<RequestParameter>,
    pub response_fields: Vec<ResponseField>,
    /// Links whose `from_field_id` belongs to this endpoint's response fields.
    pub links: Vec<FieldLink>,
    pub messages: Vec<ResponseMessage>,
}

impl EndpointDetail {
    pub fn label(&self) -> String {
        self.endpoint.label()
    }

    pub fn parameter(&self, name: &str) -> Option<&RequestParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn required_parameters(&self) -> impl Iterator<Item = &RequestParameter> {
        self.parameters.iter().filter(|p| p.required)
    }

    pub fn path_parameters(&self) -> impl Iterator<Item = &RequestParameter> {
        self.parameters
            .iter()
            .filter(|p| p.location == ParamLocation::Path)
    }

    /// The json_path of a response field owned by this endpoint, by id.
    pub fn field_path(&self, field_id: i64) -> Option<&str> {
        self.response_fields
            .iter()
            .find(|f| f.id == field_id)
            .map(|f| f.json_path.as_str())
    }
}

/// Input for creating a project.
#[derive(Clone, Debug, Default)]
pub struct NewProject {
    pub name: String,
    pub version: String,
    pub base_url: String,
    pub domain: Option<String>,
    pub description: Option<String>,
}

/// Input for creating or upserting a request parameter.
#[derive(Clone, Debug)]
pub struct NewParameter {
    pub name: String,
    pub location: ParamLocation,
    pub param_type: String,
    pub required: bool,
    pub description: String,
}

/// Input for creating a response field.
#[derive(Clone, Debug)]
pub struct NewResponseField {
    pub json_path: String,
    pub field_type: String,
    pub description: String,
}

/// Input for registering an endpoint with its parameters and response fields.
#[derive(Clone, Debug)]
pub struct NewEndpoint {
    pub method: HttpMethod,
    pub path: String,
    pub summary: String,
    pub prompt_text: String,
    pub keywords: BTreeSet<String>,
    pub intent_patterns: Vec<String>,
    pub embedding: Vec<f32>,
    pub parameters: Vec<NewParameter>,
    pub response_fields: Vec<NewResponseField>,
}

impl NewEndpoint {
    /// Minimal endpoint with no parameters; tests and ingestion build on this.
    pub fn new(method: HttpMethod, path: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            summary: summary.into(),
            prompt_text: String::new(),
            keywords: BTreeSet::new(),
            intent_patterns: Vec::new(),
            embedding: Vec::new(),
            parameters: Vec::new(),
            response_fields: Vec::new(),
        }
    }
}

/// Input for declaring a field link between two endpoints.
#[derive(Clone, Debug)]
pub struct NewFieldLink {
    pub from_field_id: i64,
    pub to_endpoint_id: i64,
    pub to_param_name: String,
    pub relation_type: String,
    pub description: String,
}

/// Splits a `METHOD /path` label. Method is case-insensitive; path is kept verbatim.
pub fn parse_label(label: &str) -> Option<(HttpMethod, &str)> {
    let (method, path) = label.trim().split_once(char::is_whitespace)?;
    let method = HttpMethod::parse(method)?;
    let path = path.trim_start();
    if path.is_empty() {
        return None;
    }
    Some((method, path))
}
