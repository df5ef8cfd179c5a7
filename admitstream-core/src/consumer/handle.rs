//! Caller-owned handle of one in-flight stream

use super::cancel::CancelSignal;
use crate::protocol::ErrorKind;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

/// Lifecycle of a stream. Leaves `Streaming` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Request in flight or body still arriving
    Streaming,
    /// `on_result` was dispatched
    Completed,
    /// `on_error` was dispatched with this kind
    Errored(ErrorKind),
    /// The cancel signal fired before a terminal event
    Cancelled,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Streaming)
    }
}

/// State reported when the task died without reaching a terminal state
const ABANDONED: StreamState = StreamState::Errored(ErrorKind::Generic);

/// One in-flight stream.
///
/// Dropping the handle does not stop the stream; call [`cancel`](Self::cancel)
/// on teardown.
#[derive(Debug)]
pub struct StreamHandle {
    id: Uuid,
    state: watch::Receiver<StreamState>,
    cancel: CancelSignal,
    task: JoinHandle<()>,
}

impl StreamHandle {
    pub(crate) fn new(
        id: Uuid,
        state: watch::Receiver<StreamState>,
        cancel: CancelSignal,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            id,
            state,
            cancel,
            task,
        }
    }

    /// Request ID sent as `X-Request-ID`
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current state.
    ///
    /// A task that ended without publishing a terminal state (a handler
    /// panicked) reads as `Errored(Generic)`, the same as [`wait`](Self::wait).
    pub fn state(&self) -> StreamState {
        // closed first: a terminal value sent just before closing must win
        let closed = self.state.has_changed().is_err();
        let current = *self.state.borrow();
        if closed && !current.is_terminal() {
            ABANDONED
        } else {
            current
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Trigger the stream's cancel signal; no handler fires afterwards
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The signal this stream observes
    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Wait for the terminal state
    pub async fn wait(&self) -> StreamState {
        let mut state = self.state.clone();
        let result = state.wait_for(StreamState::is_terminal).await.map(|s| *s);
        match result {
            Ok(terminal) => terminal,
            Err(_) => {
                // The task ended without publishing a terminal state (a handler panicked)
                warn!(
                    "Stream task ended without a terminal state [request_id: {}]",
                    self.id
                );
                ABANDONED
            }
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if !self.task.is_finished() && self.cancel.is_cancelled() {
            self.task.abort();
        }
    }
}
