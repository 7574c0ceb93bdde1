//! Public engine surface: non-blocking admission, result streams, lifecycle.
//!
//! The engine turns a slow, fallible [`Invoker`] call into a many-in-flight
//! asynchronous pipeline. Callers submit user messages without blocking and
//! drain assistant messages and errors from two bounded streams. Delivery is
//! best-effort: under sustained overload results are dropped, never stalled.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::llm::Invoker;
use crate::model::{Lifecycle, Message};

/// Queue capacities and shutdown tuning. Fixed at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bounded request queue slots. A full queue rejects submissions.
    pub request_capacity: usize,
    /// Bounded response stream slots. A full stream diverts results to the
    /// error stream as contention notices.
    pub response_capacity: usize,
    /// Bounded error stream slots. A full error stream drops silently.
    pub error_capacity: usize,
    /// How long shutdown waits for in-flight executions before aborting them.
    pub drain_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_capacity: 100,
            response_capacity: 100,
            error_capacity: 100,
            drain_grace: Duration::from_secs(1),
        }
    }
}

/// Handle to a running engine.
///
/// Dropping the handle closes the request queue, which triggers the same
/// shutdown sequence as [`Engine::close`].
pub struct Engine {
    request_tx: mpsc::Sender<Message>,
    responses: Option<mpsc::Receiver<Message>>,
    errors: Option<mpsc::Receiver<Error>>,
    state: Arc<Mutex<Lifecycle>>,
    cancel: CancellationToken,
    done: CancellationToken,
}

impl Engine {
    /// Spawn the dispatch loop and return the engine handle.
    ///
    /// `cancel` is the shared cancellation token governing the whole engine.
    /// Cancelling it from outside is equivalent to calling [`Engine::close`].
    pub fn start(
        invoker: Arc<dyn Invoker>,
        config: EngineConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (request_tx, request_rx) = mpsc::channel(config.request_capacity);
        let (response_tx, response_rx) = mpsc::channel(config.response_capacity);
        let (error_tx, error_rx) = mpsc::channel(config.error_capacity);
        let state = Arc::new(Mutex::new(Lifecycle::Open));
        let done = CancellationToken::new();

        let dispatcher = Dispatcher {
            invoker,
            request_rx,
            response_tx,
            error_tx,
            state: Arc::clone(&state),
            cancel: cancel.clone(),
            done: done.clone(),
            drain_grace: config.drain_grace,
        };
        tokio::spawn(dispatcher.run());

        Self {
            request_tx,
            responses: Some(response_rx),
            errors: Some(error_rx),
            state,
            cancel,
            done,
        }
    }

    /// Submit a user message for execution. Never blocks.
    ///
    /// # Errors
    /// - [`Error::Closed`] — the engine is draining or closed. Permanent.
    /// - [`Error::QueueFull`] — the request queue is full. Retryable.
    pub fn submit(&self, content: impl Into<String>) -> Result<()> {
        {
            // Held only for the flag read, never across the channel op.
            let state = lock_state(&self.state);
            if !state.is_open() {
                return Err(Error::Closed);
            }
        }

        match self.request_tx.try_send(Message::user(content)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(Error::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::Closed),
        }
    }

    /// Take the response stream. `Some` on the first call only.
    ///
    /// The stream yields successful invocations in completion order (which
    /// is unrelated to submission order) and ends exactly once at shutdown.
    pub fn responses(&mut self) -> Option<mpsc::Receiver<Message>> {
        self.responses.take()
    }

    /// Take the error stream. `Some` on the first call only.
    ///
    /// Yields invocation failures, delivery-contention notices, and
    /// abandonment notices. Ends exactly once at shutdown.
    pub fn errors(&mut self) -> Option<mpsc::Receiver<Error>> {
        self.errors.take()
    }

    /// Wait until the shutdown sequence has halted admission and closed the
    /// request queue. Does not guarantee in-flight executions have finished;
    /// drain the streams to observe their results.
    pub async fn done(&self) {
        self.done.cancelled().await;
    }

    /// Trigger shutdown. Idempotent: any number of calls, concurrent or
    /// sequential, run the shutdown sequence exactly once.
    pub fn close(&self) {
        debug!("close requested");
        self.cancel.cancel();
    }

    /// Convenience: [`Engine::close`] then wait for [`Engine::done`].
    pub async fn shutdown(&self) {
        self.close();
        self.done().await;
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        *lock_state(&self.state)
    }
}

pub(crate) fn lock_state(state: &Mutex<Lifecycle>) -> std::sync::MutexGuard<'_, Lifecycle> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
