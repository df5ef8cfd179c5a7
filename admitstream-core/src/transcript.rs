//! Caller-side accumulation of one stream's events
//!
//! The consumer itself keeps no history. [`Transcript`] is the state a chat
//! view builds from the callbacks: the log panel, the growing answer and the
//! final outcome.

use crate::consumer::StreamHandlers;
use crate::protocol::{ErrorEvent, ErrorKind, ResultPayload};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    /// Progress lines in arrival order
    pub logs: Vec<String>,
    /// Concatenated chunks, replaced by the authoritative answer on completion
    pub answer: String,
    pub result: Option<ResultPayload>,
    pub error: Option<ErrorEvent>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// A result or error has been recorded
    pub fn is_complete(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }

    /// The guest quota ran out; the UI should offer sign-in
    pub fn needs_sign_in(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(|e| e.kind == ErrorKind::RateLimitedGuest)
    }
}

impl StreamHandlers for Transcript {
    fn on_log(&mut self, text: &str) {
        self.logs.push(text.to_string());
    }

    fn on_chunk(&mut self, text: &str) {
        self.answer.push_str(text);
    }

    fn on_result(&mut self, result: ResultPayload) {
        self.answer.clone_from(&result.answer);
        self.result = Some(result);
    }

    fn on_error(&mut self, error: ErrorEvent) {
        self.error = Some(error);
    }
}

/// A [`Transcript`] the caller can read while the stream task writes to it
#[derive(Debug, Clone, Default)]
pub struct SharedTranscript {
    inner: Arc<Mutex<Transcript>>,
}

impl SharedTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the transcript for reading.
    ///
    /// A poisoned lock (a panic while writing) still yields the data.
    pub fn lock(&self) -> MutexGuard<'_, Transcript> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the current transcript
    pub fn snapshot(&self) -> Transcript {
        self.lock().clone()
    }
}

impl StreamHandlers for SharedTranscript {
    fn on_log(&mut self, text: &str) {
        self.lock().on_log(text);
    }

    fn on_chunk(&mut self, text: &str) {
        self.lock().on_chunk(text);
    }

    fn on_result(&mut self, result: ResultPayload) {
        self.lock().on_result(result);
    }

    fn on_error(&mut self, error: ErrorEvent) {
        self.lock().on_error(error);
    }
}
