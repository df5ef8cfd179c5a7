//! Streaming response consumer
//!
//! [`StreamingResponseConsumer::start`] opens one streaming chat request,
//! decodes the response records as bytes arrive and dispatches them to the
//! caller's [`StreamHandlers`]. Each stream runs on its own tokio task with its
//! own decoder; nothing is shared between streams except the HTTP connection
//! pool.
//!
//! Guarantees per stream:
//! - handlers fire in wire order, one record at a time
//! - `on_result` / `on_error` fire at most once, after every earlier event
//! - nothing fires once the cancel signal is triggered, and cancellation is
//!   never reported as an error
//! - a body that ends without a terminal record is reported through `on_error`

mod cancel;
mod handle;
mod handlers;

pub use cancel::CancelSignal;
pub use handle::{StreamHandle, StreamState};
pub use handlers::{FnHandlers, StreamHandlers};

use crate::config::{ClientConfig, EndpointConfig, ProtocolConfig, SafeLogging};
use crate::decoder::{classify_record, RecordDecoder};
use crate::http::{ByteStream, HttpClient, OpenRequest, StreamTransport, TransportError};
use crate::protocol::{ErrorEvent, RequestValidationError, StreamEvent, StreamRequest};
use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Message reported when the body ends without a `result` or `error` record
pub const PREMATURE_EOF_MESSAGE: &str = "stream closed before a result was received";

/// Reasons [`StreamingResponseConsumer::start`] refuses to start a stream
#[derive(Debug, Error)]
pub enum StartError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestValidationError),

    #[error("start must be called from within a tokio runtime")]
    NoRuntime,

    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Opens streaming chat requests and decodes their responses
#[derive(Clone)]
pub struct StreamingResponseConsumer {
    transport: Arc<dyn StreamTransport>,
    endpoint: EndpointConfig,
    protocol: ProtocolConfig,
}

impl StreamingResponseConsumer {
    /// Create a consumer backed by a pooled reqwest client
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let client = HttpClient::from_config(&config.connection)?;
        Ok(Self::with_transport(Arc::new(client), config))
    }

    /// Create a consumer over any transport
    pub fn with_transport(transport: Arc<dyn StreamTransport>, config: &ClientConfig) -> Self {
        Self {
            transport,
            endpoint: config.endpoint.clone(),
            protocol: config.protocol.clone(),
        }
    }

    /// Start one stream.
    ///
    /// Returns immediately; events are dispatched from a spawned task. The
    /// request is validated first and nothing is sent if it is rejected.
    pub fn start<H>(
        &self,
        request: StreamRequest,
        handlers: H,
        cancel: CancelSignal,
    ) -> Result<StreamHandle, StartError>
    where
        H: StreamHandlers + 'static,
    {
        request.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| StartError::NoRuntime)?;

        let request_id = Uuid::new_v4();
        let open = OpenRequest {
            request_id,
            url: self.endpoint.stream_url(request.has_image()),
            body: serde_json::to_value(request.wire_body())?,
            bearer: request.bearer.clone(),
        };

        info!(
            "Starting stream: {} [request_id: {}]",
            request.safe_for_logging(),
            request_id
        );

        let (state_tx, state_rx) = watch::channel(StreamState::Streaming);
        let dispatcher = Dispatcher {
            request_id,
            handlers: Box::new(handlers),
            cancel: cancel.clone(),
            state: state_tx,
            finished: false,
        };
        let task = runtime.spawn(run_stream(
            self.transport.clone(),
            open,
            self.protocol.clone(),
            dispatcher,
        ));

        Ok(StreamHandle::new(request_id, state_rx, cancel, task))
    }
}

/// Whether the read loop should keep going after a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Delivers events to the handlers and owns the terminal latch
struct Dispatcher {
    request_id: Uuid,
    handlers: Box<dyn StreamHandlers>,
    cancel: CancelSignal,
    state: watch::Sender<StreamState>,
    finished: bool,
}

impl Dispatcher {
    fn dispatch(&mut self, event: StreamEvent) -> Flow {
        if self.finished {
            return Flow::Stop;
        }
        if self.cancel.is_cancelled() {
            self.finish(StreamState::Cancelled);
            return Flow::Stop;
        }

        match event {
            StreamEvent::Log { text } => {
                self.handlers.on_log(&text);
                Flow::Continue
            }
            StreamEvent::Chunk { text } => {
                self.handlers.on_chunk(&text);
                Flow::Continue
            }
            StreamEvent::Result(result) => {
                debug!(
                    "Result received ({} sources, {} chunks) [request_id: {}]",
                    result.sources.len(),
                    result.used_chunks.len(),
                    self.request_id
                );
                self.handlers.on_result(result);
                self.finish(StreamState::Completed);
                Flow::Stop
            }
            StreamEvent::Error(error) => {
                warn!(
                    "Stream failed ({}): {} [request_id: {}]",
                    error.kind, error.message, self.request_id
                );
                let kind = error.kind;
                self.handlers.on_error(error);
                self.finish(StreamState::Errored(kind));
                Flow::Stop
            }
        }
    }

    fn fail(&mut self, error: ErrorEvent) -> Flow {
        self.dispatch(StreamEvent::Error(error))
    }

    /// Record the terminal state once; later calls are ignored
    fn finish(&mut self, state: StreamState) {
        if self.finished {
            return;
        }
        self.finished = true;
        match state {
            StreamState::Cancelled => info!("Stream cancelled [request_id: {}]", self.request_id),
            StreamState::Completed => info!("Stream completed [request_id: {}]", self.request_id),
            _ => {}
        }
        self.state.send_replace(state);
    }
}

async fn run_stream(
    transport: Arc<dyn StreamTransport>,
    open: OpenRequest,
    protocol: ProtocolConfig,
    mut dispatcher: Dispatcher,
) {
    let cancel = dispatcher.cancel.clone();
    let sentinel = &protocol.guest_rate_limit;

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            dispatcher.finish(StreamState::Cancelled);
            return;
        }
        opened = transport.open(open) => opened,
    };

    let mut body: ByteStream = match opened {
        Ok(body) => body,
        Err(e) => {
            dispatcher.fail(e.to_error_event(sentinel));
            return;
        }
    };

    let mut decoder = RecordDecoder::new(protocol.max_record_bytes);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                dispatcher.finish(StreamState::Cancelled);
                return;
            }
            next = body.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                decoder.push_chunk(&bytes);
                loop {
                    let line = match decoder.next_line() {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(e) => {
                            dispatcher.fail(ErrorEvent::generic(e.to_string()));
                            return;
                        }
                    };
                    if let Some(event) = classify_record(&line, sentinel) {
                        if dispatcher.dispatch(event) == Flow::Stop {
                            return;
                        }
                    }
                }
            }
            Some(Err(e)) => {
                dispatcher.fail(e.to_error_event(sentinel));
                return;
            }
            None => {
                if let Some(line) = decoder.finish() {
                    if let Some(event) = classify_record(&line, sentinel) {
                        if dispatcher.dispatch(event) == Flow::Stop {
                            return;
                        }
                    }
                }
                dispatcher.fail(ErrorEvent::generic(PREMATURE_EOF_MESSAGE));
                return;
            }
        }
    }
}
