//! Healer prompts: retry analyst and metadata extractor JSON contracts.

use crate::executor::StepResult;
use crate::planner::ExecutionPlan;

/// Failure detail sent to either healer role is capped at this many characters.
const FAILURE_SNIPPET_LEN: usize = 1500;

/// System prompt for the retry analyst.
///
/// The LLM must respond with valid JSON:
/// `{"shouldRetry": bool, "correctedQuery": "...", "analysis": "..."}`.
pub const RETRY_ANALYST_SYSTEM: &str = r#"You analyze a failed API orchestration attempt and decide whether to retry with a corrected request.

Rules:
- Output ONLY valid JSON, no markdown or explanation.
- Format: {"shouldRetry": true|false, "correctedQuery": "rephrased user request", "analysis": "one sentence on what went wrong"}
- Set shouldRetry to true only when a rephrased request could plausibly succeed (e.g. a missing value can be supplied, a wrong field name corrected).
- correctedQuery must be a complete, self-contained user request; include concrete values the error revealed as necessary.
- When the failure cannot be fixed by rephrasing (auth failure, service down), set shouldRetry to false and omit correctedQuery.
"#;

/// System prompt for the metadata extractor.
///
/// The LLM must respond with valid JSON holding three arrays:
/// `missingParameters`, `parameterCorrections`, `errorMessages`.
pub const METADATA_EXTRACTOR_SYSTEM: &str = r#"You extract API schema corrections from a failed HTTP call so the stored endpoint catalog can be fixed.

Rules:
- Output ONLY valid JSON, no markdown or explanation.
- Format:
{
  "missingParameters": [{"endpointPath": "/path", "method": "POST", "parameterName": "name", "parameterType": "string", "isRequired": true, "location": "body"}],
  "parameterCorrections": [{"endpointPath": "/path", "method": "GET", "oldParameterName": "old", "newParameterName": "new"}],
  "errorMessages": [{"endpointPath": "/path", "method": "POST", "statusCode": 400, "message": "user-facing text", "suggestion": "how to fix"}]
}
- Emit entries only for corrections the error actually demonstrates; leave arrays empty otherwise.
- location is one of: path, query, header, body.
"#;

fn truncate_chars(rendered: &mut String, max: usize) {
    if rendered.len() > max {
        let cut = (0..=max)
            .rev()
            .find(|&i| rendered.is_char_boundary(i))
            .unwrap_or(0);
        rendered.truncate(cut);
        rendered.push('…');
    }
}

/// User prompt shared by both healer roles: query, error, plan, and step results.
pub fn build_failure_prompt(
    query: &str,
    error: &str,
    plan: Option<&ExecutionPlan>,
    results: &[StepResult],
) -> String {
    let mut prompt = format!("Original request: {}\n\nFailure: {}\n", query, error);

    if let Some(plan) = plan {
        if let Ok(rendered) = serde_json::to_string(plan) {
            let mut rendered = rendered;
            truncate_chars(&mut rendered, FAILURE_SNIPPET_LEN);
            prompt.push_str("\nPlan:\n");
            prompt.push_str(&rendered);
            prompt.push('\n');
        }
    }

    if !results.is_empty() {
        if let Ok(rendered) = serde_json::to_string(results) {
            let mut rendered = rendered;
            truncate_chars(&mut rendered, FAILURE_SNIPPET_LEN);
            prompt.push_str("\nStep results:\n");
            prompt.push_str(&rendered);
            prompt.push('\n');
        }
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_prompt_includes_plan_and_results() {
        let plan: ExecutionPlan = serde_json::from_str(
            r#"{"steps":[{"endpoint":"POST /pet","params":{"name":"rex"}}]}"#,
        )
        .unwrap();
        let results = vec![StepResult {
            index: 0,
            endpoint: "POST /pet".to_string(),
            success: false,
            status_code: Some(400),
            response: None,
            error: Some("photoUrls required".to_string()),
            duration_ms: 12,
            satisfies_intent: None,
        }];
        let prompt = build_failure_prompt("add a pet", "photoUrls required", Some(&plan), &results);
        assert!(prompt.contains("Original request: add a pet"));
        assert!(prompt.contains("POST /pet"));
        assert!(prompt.contains("photoUrls required"));
    }
}
