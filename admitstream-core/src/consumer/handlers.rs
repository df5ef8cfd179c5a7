//! Callback interface a stream dispatches into

use crate::protocol::{ErrorEvent, ResultPayload, StreamEvent};
use tokio::sync::mpsc::UnboundedSender;

/// Receives the decoded events of one stream.
///
/// Methods are called sequentially from the stream's task, in wire order.
/// `on_result` and `on_error` are mutually exclusive and called at most once.
pub trait StreamHandlers: Send {
    /// Informational progress line
    fn on_log(&mut self, _text: &str) {}

    /// Fragment of the answer; concatenate in arrival order
    fn on_chunk(&mut self, _text: &str) {}

    /// Terminal success
    fn on_result(&mut self, _result: ResultPayload) {}

    /// Terminal failure
    fn on_error(&mut self, _error: ErrorEvent) {}
}

type TextFn = Box<dyn FnMut(&str) + Send>;
type ResultFn = Box<dyn FnMut(ResultPayload) + Send>;
type ErrorFn = Box<dyn FnMut(ErrorEvent) + Send>;

/// Handler set assembled from closures; unset callbacks ignore their event
#[derive(Default)]
pub struct FnHandlers {
    log: Option<TextFn>,
    chunk: Option<TextFn>,
    result: Option<ResultFn>,
    error: Option<ErrorFn>,
}

impl FnHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_log(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.log = Some(Box::new(f));
        self
    }

    pub fn on_chunk(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.chunk = Some(Box::new(f));
        self
    }

    pub fn on_result(mut self, f: impl FnMut(ResultPayload) + Send + 'static) -> Self {
        self.result = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(ErrorEvent) + Send + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }
}

impl StreamHandlers for FnHandlers {
    fn on_log(&mut self, text: &str) {
        if let Some(f) = self.log.as_mut() {
            f(text);
        }
    }

    fn on_chunk(&mut self, text: &str) {
        if let Some(f) = self.chunk.as_mut() {
            f(text);
        }
    }

    fn on_result(&mut self, result: ResultPayload) {
        if let Some(f) = self.result.as_mut() {
            f(result);
        }
    }

    fn on_error(&mut self, error: ErrorEvent) {
        if let Some(f) = self.error.as_mut() {
            f(error);
        }
    }
}

/// Forward events into a channel, for callers that prefer to drain a receiver.
///
/// A closed receiver silently drops events; the stream itself keeps running
/// until it is cancelled or terminates.
impl StreamHandlers for UnboundedSender<StreamEvent> {
    fn on_log(&mut self, text: &str) {
        let _ = self.send(StreamEvent::Log {
            text: text.to_string(),
        });
    }

    fn on_chunk(&mut self, text: &str) {
        let _ = self.send(StreamEvent::Chunk {
            text: text.to_string(),
        });
    }

    fn on_result(&mut self, result: ResultPayload) {
        let _ = self.send(StreamEvent::Result(result));
    }

    fn on_error(&mut self, error: ErrorEvent) {
        let _ = self.send(StreamEvent::Error(error));
    }
}

impl<H: StreamHandlers + ?Sized> StreamHandlers for Box<H> {
    fn on_log(&mut self, text: &str) {
        (**self).on_log(text)
    }

    fn on_chunk(&mut self, text: &str) {
        (**self).on_chunk(text)
    }

    fn on_result(&mut self, result: ResultPayload) {
        (**self).on_result(result)
    }

    fn on_error(&mut self, error: ErrorEvent) {
        (**self).on_error(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_fn_handlers_route_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log_seen = seen.clone();
        let chunk_seen = seen.clone();
        let mut handlers = FnHandlers::new()
            .on_log(move |t| log_seen.lock().unwrap().push(format!("log:{t}")))
            .on_chunk(move |t| chunk_seen.lock().unwrap().push(format!("chunk:{t}")));

        StreamHandlers::on_log(&mut handlers, "thinking");
        StreamHandlers::on_chunk(&mut handlers, "Hi");
        // no result callback registered
        StreamHandlers::on_result(&mut handlers, ResultPayload::with_answer("Hi"));

        assert_eq!(*seen.lock().unwrap(), vec!["log:thinking", "chunk:Hi"]);
    }

    #[test]
    fn test_channel_handlers_forward_events() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut handlers: Box<dyn StreamHandlers> = Box::new(tx);
        handlers.on_chunk("a");
        handlers.on_error(ErrorEvent::generic("boom"));
        assert_eq!(
            rx.try_recv().unwrap(),
            StreamEvent::Chunk {
                text: "a".to_string()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            StreamEvent::Error(ErrorEvent::generic("boom"))
        );
    }
}
