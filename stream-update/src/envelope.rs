//! Envelope (request_id, seq) injected into each update for transports that multiplex runs.
//! EnvelopeState hands out monotonically increasing sequence numbers within one request.

use serde_json::Value;

use crate::update::ChatStreamUpdate;

/// Envelope fields added to each serialized update.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    /// Request ID; constant within one chat request.
    pub request_id: Option<String>,
    /// Per-update sequence number; monotonically increasing within a stream.
    pub seq: Option<u64>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    /// Merges envelope fields into the given JSON object (top-level only).
    /// Does not overwrite existing keys.
    pub fn inject_into(&self, obj: &mut Value) {
        let Some(obj) = obj.as_object_mut() else {
            return;
        };
        if let Some(ref id) = self.request_id {
            obj.entry("requestId")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(seq) = self.seq {
            obj.entry("seq")
                .or_insert_with(|| Value::Number(serde_json::Number::from(seq)));
        }
    }
}

/// Envelope state for one request: request_id plus the next sequence number.
pub struct EnvelopeState {
    pub request_id: String,
    pub next_seq: u64,
}

impl EnvelopeState {
    pub fn new(request_id: String) -> Self {
        Self {
            request_id,
            next_seq: 1,
        }
    }

    /// Injects the envelope into the update value and advances the sequence.
    pub fn inject_into(&mut self, value: &mut Value) {
        let env = Envelope::new()
            .with_request_id(&self.request_id)
            .with_seq(self.next_seq);
        self.next_seq += 1;
        env.inject_into(value);
    }
}

/// Converts an update to JSON and injects the envelope using the given state.
pub fn to_json(
    update: &ChatStreamUpdate,
    state: &mut EnvelopeState,
) -> Result<Value, serde_json::Error> {
    let mut value = update.to_value()?;
    state.inject_into(&mut value);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_inject() {
        let mut obj = serde_json::json!({"type": "planning", "message": "m"});
        let env = Envelope::new().with_request_id("req-1").with_seq(3);
        env.inject_into(&mut obj);
        assert_eq!(obj["requestId"], "req-1");
        assert_eq!(obj["seq"], 3);
        assert_eq!(obj["type"], "planning");
    }

    #[test]
    fn to_json_advances_sequence() {
        let mut state = EnvelopeState::new("req-42".to_string());
        let first = to_json(&ChatStreamUpdate::planning("a", 10), &mut state).unwrap();
        let second = to_json(&ChatStreamUpdate::planning("b", 20), &mut state).unwrap();
        assert_eq!(first["seq"], 1);
        assert_eq!(second["seq"], 2);
        assert_eq!(second["requestId"], "req-42");
    }

    #[test]
    fn inject_does_not_overwrite_existing_keys() {
        let mut obj = serde_json::json!({"requestId": "keep-me"});
        Envelope::new().with_request_id("other").inject_into(&mut obj);
        assert_eq!(obj["requestId"], "keep-me");
    }
}
