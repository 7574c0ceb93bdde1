//! Dispatch loop: drains the request queue and fans out one execution per item.
//!
//! Each admitted message is claimed by exactly one spawned execution.
//! Completions arrive in any order. The loop itself never waits on an
//! invocation; it only waits for the next admitted item, the cancellation
//! signal, or a finished execution to reap.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::channel::lock_state;
use crate::error::Error;
use crate::llm::Invoker;
use crate::model::{Lifecycle, Message};

/// Owns the queue ends and runs until cancellation or queue closure.
pub(crate) struct Dispatcher {
    pub(crate) invoker: Arc<dyn Invoker>,
    pub(crate) request_rx: mpsc::Receiver<Message>,
    pub(crate) response_tx: mpsc::Sender<Message>,
    pub(crate) error_tx: mpsc::Sender<Error>,
    pub(crate) state: Arc<Mutex<Lifecycle>>,
    pub(crate) cancel: CancellationToken,
    pub(crate) done: CancellationToken,
    pub(crate) drain_grace: Duration,
}

impl Dispatcher {
    pub(crate) async fn run(mut self) {
        let mut in_flight: JoinSet<()> = JoinSet::new();

        info!("dispatch loop started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("cancellation observed, draining");
                    break;
                }
                item = self.request_rx.recv() => match item {
                    Some(item) => {
                        let execution = Execution {
                            invoker: Arc::clone(&self.invoker),
                            response_tx: self.response_tx.clone(),
                            error_tx: self.error_tx.clone(),
                            cancel: self.cancel.clone(),
                        };
                        in_flight.spawn(execution.run(item));
                    }
                    None => {
                        info!("request queue closed, draining");
                        break;
                    }
                },
                // Reap finished executions so the set stays small.
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }

        self.finish(in_flight).await;
    }

    /// Shutdown sequence, strictly ordered: halt admission, close the
    /// request queue, fire the done signal, join in-flight executions
    /// (bounded by the drain grace), then close both sinks by dropping
    /// their senders. Executions hold sender clones, so a sink can never
    /// close out from under a delivery attempt.
    async fn finish(self, mut in_flight: JoinSet<()>) {
        let Dispatcher {
            request_rx,
            response_tx,
            error_tx,
            state,
            done,
            drain_grace,
            ..
        } = self;

        *lock_state(&state) = Lifecycle::Draining;
        drop(request_rx);
        done.cancel();

        let pending = in_flight.len();
        if pending > 0 {
            debug!(pending, "waiting for in-flight executions");
            let drained = tokio::time::timeout(drain_grace, async {
                while in_flight.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                warn!(
                    remaining = in_flight.len(),
                    "drain grace elapsed, aborting in-flight executions"
                );
                in_flight.abort_all();
            }
        }

        *lock_state(&state) = Lifecycle::Closed;
        drop(response_tx);
        drop(error_tx);
        info!("engine closed");
    }
}

/// One claimed message: invoke once, attempt delivery once.
struct Execution {
    invoker: Arc<dyn Invoker>,
    response_tx: mpsc::Sender<Message>,
    error_tx: mpsc::Sender<Error>,
    cancel: CancellationToken,
}

impl Execution {
    async fn run(self, item: Message) {
        // Already cancelled: abandon without calling the invoker.
        if self.cancel.is_cancelled() {
            self.report(Error::Abandoned);
            return;
        }

        match self.invoker.invoke(&self.cancel, item).await {
            Ok(reply) => match self.response_tx.try_send(reply) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!("response stream full, reporting contention");
                    self.report(Error::DeliveryContended);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("response stream dropped by consumer, result discarded");
                }
            },
            Err(e) => self.report(e),
        }
    }

    /// Best-effort error delivery: never blocks, never retries. If the
    /// error stream is also full, the result vanishes — the documented
    /// trade-off under sustained overload.
    fn report(&self, error: Error) {
        if let Err(e) = self.error_tx.try_send(error) {
            debug!("error stream unavailable, dropping: {e}");
        }
    }
}
