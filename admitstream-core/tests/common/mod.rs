//! Shared helpers for consumer integration tests

#![allow(dead_code)]

use admitstream_core::consumer::{CancelSignal, StreamHandlers};
use admitstream_core::http::{ByteStream, OpenRequest, StreamTransport, TransportError};
use admitstream_core::protocol::{ErrorEvent, ResultPayload};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

type Item = Result<Bytes, TransportError>;

/// Transport whose response bodies are fed by the test, keyed by request message
#[derive(Default)]
pub struct ScriptedTransport {
    feeds: Mutex<HashMap<String, UnboundedReceiver<Item>>>,
    opened: Mutex<Vec<OpenRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register the body for requests carrying `message`
    pub fn feed(&self, message: &str) -> Feed {
        let (tx, rx) = unbounded_channel();
        self.feeds.lock().unwrap().insert(message.to_string(), rx);
        Feed { tx: Some(tx) }
    }

    /// Requests opened so far
    pub fn opened(&self) -> Vec<OpenRequest> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamTransport for ScriptedTransport {
    async fn open(&self, request: OpenRequest) -> Result<ByteStream, TransportError> {
        let message = request.body["message"].as_str().unwrap_or_default().to_string();
        let rx = self
            .feeds
            .lock()
            .unwrap()
            .remove(&message)
            .ok_or_else(|| TransportError::Connect {
                message: format!("no scripted body for '{message}'"),
            })?;
        self.opened.lock().unwrap().push(request);
        let body = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Box::pin(body))
    }
}

/// Sending half of a scripted response body
pub struct Feed {
    tx: Option<UnboundedSender<Item>>,
}

impl Feed {
    pub fn send(&self, bytes: impl AsRef<[u8]>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Ok(Bytes::copy_from_slice(bytes.as_ref())));
        }
    }

    pub fn fail(&self, error: TransportError) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Err(error));
        }
    }

    /// End of body
    pub fn close(&mut self) {
        self.tx = None;
    }
}

/// Records every callback as a compact string
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
    cancel_on_chunk: Option<(usize, CancelSignal)>,
    chunks_seen: usize,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger `signal` from inside the `n`-th `on_chunk` call (1-based)
    pub fn cancelling_on_chunk(n: usize, signal: CancelSignal) -> Self {
        Self {
            cancel_on_chunk: Some((n, signal)),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl StreamHandlers for Recorder {
    fn on_log(&mut self, text: &str) {
        self.push(format!("log:{text}"));
    }

    fn on_chunk(&mut self, text: &str) {
        self.push(format!("chunk:{text}"));
        self.chunks_seen += 1;
        if let Some((n, signal)) = &self.cancel_on_chunk {
            if self.chunks_seen == *n {
                signal.cancel();
            }
        }
    }

    fn on_result(&mut self, result: ResultPayload) {
        self.push(format!("result:{}", result.answer));
    }

    fn on_error(&mut self, error: ErrorEvent) {
        self.push(format!("error:{}:{}", error.kind, error.message));
    }
}

/// Poll `condition` until it holds or a second has passed
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub const EXAMPLE_BODY: &str = "log: thinking\nchunk: Hello\nchunk: , world\nresult: {\"response\":\"Hello, world\",\"sources\":[]}\n";

pub fn example_calls() -> Vec<String> {
    vec![
        "log:thinking".to_string(),
        "chunk:Hello".to_string(),
        "chunk:, world".to_string(),
        "result:Hello, world".to_string(),
    ]
}
