//! User-facing message for a failed step.
//!
//! Ladder: the endpoint's own ResponseMessage for the status, else a project-wide one,
//! else the fixed generic table, else the raw error string.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::metadata::MetadataRepository;

static GENERIC_STATUS_MESSAGES: Lazy<HashMap<u16, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (400, "The request was invalid. Check the provided parameters."),
        (401, "Authentication is required or the credentials were rejected."),
        (403, "You do not have permission to perform this action."),
        (404, "The requested resource was not found."),
        (422, "The request could not be processed. Some fields may be missing or malformed."),
        (429, "Too many requests. Please wait a moment and try again."),
        (500, "The service hit an internal error. Try again shortly."),
        (502, "The upstream service returned an invalid response."),
        (503, "The service is temporarily unavailable."),
    ])
});

/// Generic text for well-known statuses.
pub fn generic_status_message(status: u16) -> Option<&'static str> {
    GENERIC_STATUS_MESSAGES.get(&status).copied()
}

/// Resolves the full ladder for a status failure. `raw_error` is the last resort.
pub async fn status_message(
    repo: &MetadataRepository,
    project_id: i64,
    endpoint_id: i64,
    status: u16,
    raw_error: &str,
) -> String {
    match repo.message_for_status(project_id, endpoint_id, status).await {
        Ok(Some(m)) => {
            if m.suggestion.is_empty() {
                m.message
            } else {
                format!("{} ({})", m.message, m.suggestion)
            }
        }
        Ok(None) => generic_status_message(status)
            .map(str::to_string)
            .unwrap_or_else(|| raw_error.to_string()),
        Err(e) => {
            tracing::warn!(error = %e, "response message lookup failed");
            generic_status_message(status)
                .map(str::to_string)
                .unwrap_or_else(|| raw_error.to_string())
        }
    }
}
