//! Planner prompt: instruct the LLM to output a JSON plan over the candidate endpoints.

use crate::context::CachedResponse;
use crate::metadata::EndpointDetail;

/// Endpoints rendered into the prompt, at most.
pub const PROMPT_ENDPOINT_LIMIT: usize = 15;
/// Field-link hints rendered into the prompt, at most.
pub const LINK_HINT_LIMIT: usize = 10;
/// Context data snippets are truncated to this many characters.
const CONTEXT_SNIPPET_LEN: usize = 160;

/// System prompt for plan generation.
///
/// The LLM must respond with valid JSON:
/// `{"steps": [{"endpoint": "METHOD /path", "params": {"name": value}}]}`.
/// Parameter values are literals or `$.steps[i].response.<path>` references.
pub const PLANNER_SYSTEM: &str = r#"You are an API call planner. Given a user request and a list of available endpoints, produce the sequence of HTTP calls that satisfies the request.

Rules:
- Output ONLY valid JSON, no markdown or explanation.
- Format: {"steps": [{"endpoint": "METHOD /path", "params": {"name": "value"}}]}
- "endpoint" must be copied EXACTLY from the endpoint list (method and path).
- Include every required parameter of each endpoint you call.
- To pass data from an earlier step, use the string "$.steps[i].response.<jsonpath>" where i is the zero-based index of that step.
- A step may only reference steps that come before it.
- Use as few steps as possible; one step is ideal when a single endpoint answers the request.
"#;

fn truncate_snippet(value: &serde_json::Value) -> String {
    let mut rendered = value.to_string();
    if rendered.len() > CONTEXT_SNIPPET_LEN {
        // Truncate at a char boundary so multi-byte payloads cannot panic.
        let cut = (0..=CONTEXT_SNIPPET_LEN)
            .rev()
            .find(|&i| rendered.is_char_boundary(i))
            .unwrap_or(0);
        rendered.truncate(cut);
        rendered.push('…');
    }
    rendered
}

fn render_endpoint(detail: &EndpointDetail) -> String {
    let params = if detail.parameters.is_empty() {
        "none".to_string()
    } else {
        detail
            .parameters
            .iter()
            .map(|p| {
                format!(
                    "{}({}, {})",
                    p.name,
                    p.location.as_str(),
                    if p.required { "required" } else { "optional" }
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!("- {} — {}. Params: {}", detail.label(), detail.endpoint.summary, params)
}

/// Field-link hints over the candidate set: which output paths can feed which parameters.
fn render_link_hints(candidates: &[EndpointDetail], catalog: &[EndpointDetail]) -> Vec<String> {
    let mut hints = Vec::new();
    for detail in candidates {
        for link in &detail.links {
            let Some(from_path) = detail.field_path(link.from_field_id) else {
                continue;
            };
            let Some(target) = catalog.iter().find(|d| d.endpoint.id == link.to_endpoint_id)
            else {
                continue;
            };
            hints.push(format!(
                "{} from \"{}\" → {} in \"{}\"",
                from_path,
                detail.label(),
                link.to_param_name,
                target.label()
            ));
            if hints.len() >= LINK_HINT_LIMIT {
                return hints;
            }
        }
    }
    hints
}

/// Builds the user prompt: query, recent context, candidate endpoints, link hints.
pub fn build_planner_prompt(
    query: &str,
    context: &[CachedResponse],
    candidates: &[EndpointDetail],
    catalog: &[EndpointDetail],
) -> String {
    let mut prompt = String::new();
    prompt.push_str("User request:\n");
    prompt.push_str(query);
    prompt.push('\n');

    if !context.is_empty() {
        prompt.push_str("\nRecent results for similar requests:\n");
        for entry in context {
            prompt.push_str(&format!(
                "- \"{}\" via {} returned {}\n",
                entry.query,
                entry.endpoint,
                truncate_snippet(&entry.data)
            ));
        }
    }

    prompt.push_str("\nAvailable endpoints:\n");
    for detail in candidates.iter().take(PROMPT_ENDPOINT_LIMIT) {
        prompt.push_str(&render_endpoint(detail));
        prompt.push('\n');
    }

    let hints = render_link_hints(candidates, catalog);
    if !hints.is_empty() {
        prompt.push_str("\nKnown data flows (output field → parameter):\n");
        for hint in hints {
            prompt.push_str(&format!("- {}\n", hint));
        }
    }

    prompt.push_str("\nRespond with the JSON plan only.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        Endpoint, FieldLink, HttpMethod, ParamLocation, RequestParameter, ResponseField,
    };
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn endpoint(id: i64, method: HttpMethod, path: &str) -> EndpointDetail {
        EndpointDetail {
            endpoint: Endpoint {
                id,
                project_id: 1,
                method,
                path: path.to_string(),
                summary: "summary".to_string(),
                prompt_text: String::new(),
                keywords: BTreeSet::new(),
                intent_patterns: vec![],
                embedding: vec![],
            },
            parameters: vec![],
            response_fields: vec![],
            links: vec![],
            messages: vec![],
        }
    }

    #[test]
    fn prompt_lists_endpoints_with_param_shapes() {
        let mut users = endpoint(1, HttpMethod::Get, "/user/{username}");
        users.parameters.push(RequestParameter {
            id: 1,
            endpoint_id: 1,
            name: "username".to_string(),
            location: ParamLocation::Path,
            param_type: "string".to_string(),
            required: true,
            description: String::new(),
        });
        let catalog = vec![users.clone()];
        let prompt = build_planner_prompt("get user john", &[], &catalog, &catalog);
        assert!(prompt.contains("GET /user/{username}"));
        assert!(prompt.contains("username(path, required)"));
    }

    #[test]
    fn prompt_renders_context_and_truncates_data() {
        let catalog = vec![endpoint(1, HttpMethod::Get, "/orders")];
        let big = serde_json::json!({"blob": "x".repeat(500)});
        let ctx = vec![CachedResponse {
            project_id: 1,
            query: "my orders".to_string(),
            user_id: None,
            endpoint: "GET /orders".to_string(),
            data: big,
            created_at: Utc::now(),
        }];
        let prompt = build_planner_prompt("orders again", &ctx, &catalog, &catalog);
        assert!(prompt.contains("Recent results"));
        assert!(prompt.contains('…'));
    }

    #[test]
    fn link_hints_render_paths_and_targets() {
        let mut users = endpoint(1, HttpMethod::Get, "/user/{username}");
        users.response_fields.push(ResponseField {
            id: 10,
            endpoint_id: 1,
            json_path: "$.id".to_string(),
            field_type: "integer".to_string(),
            description: String::new(),
        });
        users.links.push(FieldLink {
            id: 1,
            from_field_id: 10,
            to_endpoint_id: 2,
            to_param_name: "userId".to_string(),
            relation_type: "feeds".to_string(),
            description: String::new(),
        });
        let orders = endpoint(2, HttpMethod::Get, "/orders");
        let catalog = vec![users.clone(), orders];

        let prompt = build_planner_prompt("user orders", &[], &catalog, &catalog);
        assert!(prompt.contains("$.id from \"GET /user/{username}\" → userId in \"GET /orders\""));
    }

    #[test]
    fn endpoint_list_caps_at_limit() {
        let catalog: Vec<EndpointDetail> = (0..25)
            .map(|i| endpoint(i, HttpMethod::Get, &format!("/e{:02}", i)))
            .collect();
        let prompt = build_planner_prompt("q", &[], &catalog, &catalog);
        let listed = prompt.matches("- GET /e").count();
        assert_eq!(listed, PROMPT_ENDPOINT_LIMIT);
    }
}
