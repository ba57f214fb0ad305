//! Progress update protocol: one typed update per pipeline milestone, plus envelope injection.
//!
//! This crate defines the wire shape of a single [`ChatStreamUpdate`] and the per-request
//! [`Envelope`]. It does not depend on the engine; transport shells (HTTP chunking,
//! WebSocket) marshal these values in and out.

pub mod envelope;
pub mod update;

pub use envelope::{to_json, Envelope, EnvelopeState};
pub use update::{ChatStreamUpdate, UpdateKind};
