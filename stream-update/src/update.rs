//! Wire shape of one progress update: type + optional step/progress/data fields.
//!
//! The update is a flat record so transports can forward it verbatim; constructors
//! stamp the timestamp and keep `progress` inside [0, 100].

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Update kind: which pipeline milestone this update reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Planning,
    Executing,
    StepCompleted,
    Formatting,
    Completed,
    Error,
}

/// One progress update emitted while a chat request runs.
///
/// `step`/`total_steps` are set for executing and step_completed updates; `data` carries
/// the step payload when present; `execution_time_ms` is set on the terminal update.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStreamUpdate {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<usize>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    /// RFC 3339 timestamp stamped at construction.
    pub timestamp: String,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn clamp_progress(progress: u8) -> u8 {
    progress.min(100)
}

impl ChatStreamUpdate {
    fn base(kind: UpdateKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            step: None,
            total_steps: None,
            message: message.into(),
            progress: None,
            data: None,
            execution_time_ms: None,
            timestamp: now_rfc3339(),
        }
    }

    pub fn planning(message: impl Into<String>, progress: u8) -> Self {
        let mut u = Self::base(UpdateKind::Planning, message);
        u.progress = Some(clamp_progress(progress));
        u
    }

    pub fn executing(step: usize, total_steps: usize, message: impl Into<String>, progress: u8) -> Self {
        let mut u = Self::base(UpdateKind::Executing, message);
        u.step = Some(step);
        u.total_steps = Some(total_steps);
        u.progress = Some(clamp_progress(progress));
        u
    }

    pub fn step_completed(
        step: usize,
        total_steps: usize,
        message: impl Into<String>,
        progress: u8,
        data: Option<Value>,
    ) -> Self {
        let mut u = Self::base(UpdateKind::StepCompleted, message);
        u.step = Some(step);
        u.total_steps = Some(total_steps);
        u.progress = Some(clamp_progress(progress));
        u.data = data;
        u
    }

    pub fn formatting(message: impl Into<String>, progress: u8) -> Self {
        let mut u = Self::base(UpdateKind::Formatting, message);
        u.progress = Some(clamp_progress(progress));
        u
    }

    pub fn completed(message: impl Into<String>, data: Option<Value>, execution_time_ms: u64) -> Self {
        let mut u = Self::base(UpdateKind::Completed, message);
        u.progress = Some(100);
        u.data = data;
        u.execution_time_ms = Some(execution_time_ms);
        u
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::base(UpdateKind::Error, message)
    }

    /// Serializes this update to a JSON object (no envelope fields).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planning_serializes_with_type_tag() {
        let u = ChatStreamUpdate::planning("Understanding your request", 10);
        let v = u.to_value().unwrap();
        assert_eq!(v["type"], "planning");
        assert_eq!(v["progress"], 10);
        assert!(v.get("step").is_none());
        assert!(v["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn step_completed_uses_camel_case_fields() {
        let u = ChatStreamUpdate::step_completed(1, 3, "done", 53, Some(serde_json::json!({"id": 7})));
        let v = u.to_value().unwrap();
        assert_eq!(v["type"], "step_completed");
        assert_eq!(v["totalSteps"], 3);
        assert_eq!(v["data"]["id"], 7);
    }

    #[test]
    fn completed_carries_execution_time() {
        let u = ChatStreamUpdate::completed("ok", None, 420);
        let v = u.to_value().unwrap();
        assert_eq!(v["executionTimeMs"], 420);
        assert_eq!(v["progress"], 100);
    }

    #[test]
    fn progress_is_clamped_to_100() {
        let u = ChatStreamUpdate::planning("p", 250);
        assert_eq!(u.progress, Some(100));
    }

    #[test]
    fn round_trips_through_json() {
        let u = ChatStreamUpdate::executing(2, 4, "calling", 60);
        let v = u.to_value().unwrap();
        let back: ChatStreamUpdate = serde_json::from_value(v).unwrap();
        assert_eq!(back.kind, UpdateKind::Executing);
        assert_eq!(back.step, Some(2));
        assert_eq!(back.total_steps, Some(4));
    }
}
