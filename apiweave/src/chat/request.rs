//! Transport-agnostic request/response boundary of the engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use crate::executor::AuthBlob;

/// One chat request: project, free-form message, optional user and credentials.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub project_id: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub auth: AuthBlob,
}

impl ChatRequest {
    pub fn new(project_id: i64, message: impl Into<String>) -> Self {
        Self {
            project_id,
            message: message.into(),
            user_id: None,
            auth: AuthBlob::None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_auth(mut self, auth: AuthBlob) -> Self {
        self.auth = auth;
        self
    }
}

/// How the run went, mechanically.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDetails {
    pub plan_steps: usize,
    pub steps_executed: usize,
    pub execution_time_ms: u64,
    pub retry_count: usize,
    pub early_termination: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<String>,
}

/// Terminal result of a chat request. `success == false` carries `error`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_response: Option<Value>,
    pub execution_details: ExecutionDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
