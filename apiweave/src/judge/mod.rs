//! Termination judge: after a non-final step, asks whether the user's request is
//! already satisfied by what came back.
//!
//! The reply contract is a single token, YES or NO. Any gateway failure here is
//! non-fatal; execution simply continues with the remaining steps.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::llm::LlmGateway;

const JUDGE_TEMPERATURE: f32 = 0.0;
const JUDGE_MAX_TOKENS: u32 = 4;
/// Response snippets sent to the judge are capped at this many characters.
const RESPONSE_SNIPPET_LEN: usize = 2000;

const JUDGE_SYSTEM: &str = r#"You decide whether an API response already satisfies a user's request.

Reply with exactly one word:
- YES if the data shown already answers the request and no further calls are needed.
- NO if more calls are required.
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

/// Parses the single-token verdict; anything that does not lead with YES means NO.
fn is_yes(reply: &str) -> bool {
    reply
        .split_whitespace()
        .next()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).eq_ignore_ascii_case("yes"))
        .unwrap_or(false)
}

/// Early-termination oracle over an [`LlmGateway`].
pub struct TerminationJudge {
    gateway: Arc<dyn LlmGateway>,
}

impl TerminationJudge {
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self { gateway }
    }

    /// Returns a human-readable reason when the accumulated result already satisfies
    /// the query; `None` to continue (including on any gateway failure).
    pub async fn satisfied(
        &self,
        query: &str,
        endpoint: &str,
        step_index: usize,
        total_steps: usize,
        response: &Value,
    ) -> Option<String> {
        let mut snippet = response.to_string();
        truncate_chars(&mut snippet, RESPONSE_SNIPPET_LEN);

        let user = format!(
            "User request: {}\n\nStep {} of {} called {} and returned:\n{}\n\nIs the request already satisfied?",
            query,
            step_index + 1,
            total_steps,
            endpoint,
            snippet
        );

        match self
            .gateway
            .chat(JUDGE_SYSTEM, &user, JUDGE_TEMPERATURE, Some(JUDGE_MAX_TOKENS))
            .await
        {
            Ok(reply) if is_yes(&reply) => Some(format!(
                "Step {} of {} ({}) already satisfied the request",
                step_index + 1,
                total_steps,
                endpoint
            )),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "termination judge unavailable; continuing");
                None
            }
        }
    }
}
