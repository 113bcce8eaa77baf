//! Delivery dispatch.
//!
//! A completed payload is handed off here and the instrumented request moves
//! on; delivery outcomes are never surfaced back. Two modes exist: detached
//! fire-and-forget sends, and a bounded pool with an explicit overflow policy.

use crate::payload::EventPayload;
use crate::transport::Transport;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

/// What a saturated delivery pool does with a new submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Drop the payload and record the loss. The request path never waits.
    #[default]
    Drop,
    /// Block the submitter up to the timeout, then drop.
    Block { timeout: Duration },
}

/// Hands payloads to the transport without blocking the caller beyond a
/// bounded enqueue step.
pub struct Dispatcher {
    mode: Mode,
}

enum Mode {
    /// One detached task per payload.
    Spawn { transport: Transport },
    /// Fixed-capacity queue drained by a pool of bounded concurrency.
    Pool {
        queue: Mutex<Option<mpsc::Sender<EventPayload>>>,
        policy: OverflowPolicy,
    },
}

impl Dispatcher {
    /// Fire-and-forget mode: every submission spawns a detached send.
    pub fn spawning(transport: Transport) -> Self {
        Self {
            mode: Mode::Spawn { transport },
        }
    }

    /// Pooled mode: a queue of `capacity` drained by at most
    /// `max_concurrency` concurrent sends.
    pub fn pooled(
        transport: Transport,
        max_concurrency: usize,
        capacity: usize,
        policy: OverflowPolicy,
    ) -> Self {
        let (queue, mut submissions) = mpsc::channel::<EventPayload>(capacity.max(1));
        let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));

        tokio::spawn(async move {
            while let Some(payload) = submissions.recv().await {
                let permit = match permits.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let transport = transport.clone();
                tokio::spawn(async move {
                    deliver(transport, payload).await;
                    drop(permit);
                });
            }
        });

        Self {
            mode: Mode::Pool {
                queue: Mutex::new(Some(queue)),
                policy,
            },
        }
    }

    /// Submit a payload for delivery. Accepted payloads are attempted exactly
    /// once; a rejected payload is dropped and recorded, never an error to
    /// the caller.
    pub async fn submit(&self, payload: EventPayload) {
        match &self.mode {
            Mode::Spawn { transport } => {
                let transport = transport.clone();
                tokio::spawn(deliver(transport, payload));
            }
            Mode::Pool { queue, policy } => {
                let sender = match queue.lock() {
                    Ok(guard) => guard.clone(),
                    Err(_) => None,
                };
                let Some(sender) = sender else {
                    tracing::warn!("delivery dispatcher closed, payload dropped");
                    return;
                };
                match policy {
                    OverflowPolicy::Drop => {
                        if let Err(err) = sender.try_send(payload) {
                            tracing::warn!(reason = %err, "delivery queue full, payload dropped");
                        }
                    }
                    OverflowPolicy::Block { timeout } => {
                        if let Err(err) = sender.send_timeout(payload, *timeout).await {
                            tracing::warn!(reason = %err, "delivery enqueue timed out, payload dropped");
                        }
                    }
                }
            }
        }
    }

    /// Stop accepting new payloads. Already-queued payloads are still drained
    /// and in-flight sends finish on their own. Idempotent.
    pub fn close(&self) {
        if let Mode::Pool { queue, .. } = &self.mode {
            if let Ok(mut guard) = queue.lock() {
                guard.take();
            }
        }
    }
}

/// Perform one delivery attempt, swallowing failures and panics.
async fn deliver(transport: Transport, payload: EventPayload) {
    let attempt = AssertUnwindSafe(async {
        if let Err(error) = transport.send(&payload).await {
            tracing::debug!(%error, "telemetry delivery failed");
        }
    })
    .catch_unwind();

    if attempt.await.is_err() {
        tracing::debug!("panic recovered in delivery task");
    }
}
