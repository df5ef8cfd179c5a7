//! Admitstream Core Library
//!
//! Client-side consumer for the admissions assistant's streaming chat
//! endpoint: opens the request, decodes the newline-delimited record protocol
//! as bytes arrive, and dispatches typed events to caller-supplied handlers
//! with race-free cancellation.

pub mod config;
pub mod consumer;
pub mod decoder;
pub mod http;
pub mod protocol;
pub mod transcript;

pub use config::ClientConfig;
pub use consumer::{
    CancelSignal, FnHandlers, StartError, StreamHandle, StreamHandlers, StreamState,
    StreamingResponseConsumer,
};
pub use protocol::{Attachment, ErrorEvent, ErrorKind, ResultPayload, StreamEvent, StreamRequest};
pub use transcript::{SharedTranscript, Transcript};

/// Returns the version of the Admitstream Core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
