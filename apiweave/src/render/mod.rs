//! Response formatter seam: raw JSON + endpoint label → display object.
//!
//! The real visual/template renderer is an external collaborator; the engine only
//! needs this trait and ships [`PassthroughFormatter`] so responses are readable
//! without it.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Text cap for the passthrough rendering.
const PASSTHROUGH_TEXT_LIMIT: usize = 2000;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("formatting failed: {0}")]
    Failed(String),
}

/// Formatted display object: plain text plus an optional structured visual payload.
#[derive(Clone, Debug, Default)]
pub struct FormattedResponse {
    pub text: String,
    pub visual: Option<Value>,
}

/// Turns the final raw data of a run into a display object.
#[async_trait]
pub trait ResponseFormatter: Send + Sync {
    async fn format(&self, data: &Value, endpoint: &str)
        -> Result<FormattedResponse, FormatError>;
}

/// Default formatter: pretty-printed JSON, truncated; no visual payload.
pub struct PassthroughFormatter;

#[async_trait]
impl ResponseFormatter for PassthroughFormatter {
    async fn format(
        &self,
        data: &Value,
        _endpoint: &str,
    ) -> Result<FormattedResponse, FormatError> {
        let mut text = serde_json::to_string_pretty(data)
            .map_err(|e| FormatError::Failed(e.to_string()))?;
        if text.len() > PASSTHROUGH_TEXT_LIMIT {
            let cut = (0..=PASSTHROUGH_TEXT_LIMIT)
                .rev()
                .find(|&i| text.is_char_boundary(i))
                .unwrap_or(0);
            text.truncate(cut);
            text.push('…');
        }
        Ok(FormattedResponse { text, visual: None })
    }
}
