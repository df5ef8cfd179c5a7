//! Protocol module for the streaming chat endpoint
//!
//! Defines the request value sent to the backend and the typed events decoded
//! from its newline-delimited response records.

pub mod types;

pub use types::{
    Attachment, ChunkId, ErrorEvent, ErrorKind, RecordTag, RequestValidationError,
    ResultMetadata, ResultPayload, StreamEvent, StreamRequest, UsedChunk, WireRequest,
};
