//! Progress emission for one request: a thin wrapper over an optional update channel.
//!
//! Updates are best-effort: a closed or absent channel never fails the pipeline. The
//! channel is per-request and passed down explicitly; closing it is the transport's
//! end-of-stream signal.

use serde_json::Value;
use stream_update::ChatStreamUpdate;
use tokio::sync::mpsc;

/// Progress share consumed by planning before the first step runs.
const PLAN_PROGRESS_CEILING: u8 = 40;
/// Progress share covered by step execution (40..=80).
const EXECUTION_PROGRESS_SPAN: usize = 40;

/// Progress after `completed` of `total` steps have finished: `40 + 40·completed/total`.
pub fn step_progress(completed: usize, total: usize) -> u8 {
    let total = total.max(1);
    PLAN_PROGRESS_CEILING + (EXECUTION_PROGRESS_SPAN * completed / total) as u8
}

/// Sender for [`ChatStreamUpdate`]s; `disabled()` for the blocking entry point.
#[derive(Clone)]
pub struct ProgressSender {
    tx: Option<mpsc::Sender<ChatStreamUpdate>>,
}

impl ProgressSender {
    pub fn new(tx: mpsc::Sender<ChatStreamUpdate>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub async fn send(&self, update: ChatStreamUpdate) {
        if let Some(tx) = &self.tx {
            // Receiver gone means the caller stopped listening; the pipeline continues.
            let _ = tx.send(update).await;
        }
    }

    pub async fn planning(&self, message: &str, progress: u8) {
        self.send(ChatStreamUpdate::planning(message, progress)).await;
    }

    pub async fn executing(&self, step: usize, total: usize, endpoint: &str) {
        self.send(ChatStreamUpdate::executing(
            step,
            total,
            format!("Calling {}", endpoint),
            step_progress(step, total),
        ))
        .await;
    }

    pub async fn step_completed(&self, step: usize, total: usize, data: Option<Value>) {
        self.send(ChatStreamUpdate::step_completed(
            step,
            total,
            format!("Step {} of {} completed", step + 1, total),
            step_progress(step + 1, total),
            data,
        ))
        .await;
    }

    pub async fn formatting(&self) {
        self.send(ChatStreamUpdate::formatting("Formatting response", 85))
            .await;
    }

    pub async fn completed(&self, message: &str, data: Option<Value>, execution_time_ms: u64) {
        self.send(ChatStreamUpdate::completed(message, data, execution_time_ms))
            .await;
    }

    pub async fn error(&self, message: &str) {
        self.send(ChatStreamUpdate::error(message)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_update::UpdateKind;

    #[test]
    fn step_progress_spans_forty_to_eighty() {
        assert_eq!(step_progress(0, 2), 40);
        assert_eq!(step_progress(1, 2), 60);
        assert_eq!(step_progress(2, 2), 80);
        assert_eq!(step_progress(0, 0), 40);
    }

    #[tokio::test]
    async fn disabled_sender_is_silent() {
        // Nothing to assert beyond "does not panic or block".
        ProgressSender::disabled().planning("p", 10).await;
    }

    #[tokio::test]
    async fn updates_flow_through_channel() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = ProgressSender::new(tx);
        sender.planning("Understanding your request", 10).await;
        sender.step_completed(0, 2, None).await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, UpdateKind::Planning);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.kind, UpdateKind::StepCompleted);
        assert_eq!(second.progress, Some(60));
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_error() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        ProgressSender::new(tx).formatting().await;
    }
}
