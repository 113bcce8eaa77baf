//! Batched error reporting, decoupled from per-exchange delivery.
//!
//! A single event loop owns the buffer and consumes submissions, timer ticks
//! and the close request from one place, so the size trigger and the time
//! trigger can never race. The buffer is copied out before any network call;
//! submissions made during a flush queue up in the channel.

use crate::errors::ErrorRecord;
use crate::transport::Transport;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

enum BatchMessage {
    Add(ErrorRecord),
    Close(oneshot::Sender<()>),
}

/// Accumulates error records across exchanges and flushes them to the
/// collector when either the size threshold or the flush interval is reached.
///
/// `close()` flushes whatever is buffered and stops the loop; records
/// submitted before `close()` are never lost. Delivery failures are terminal
/// per attempt, as everywhere else.
pub struct BatchReporter {
    submissions: mpsc::Sender<BatchMessage>,
    pending: Arc<AtomicUsize>,
}

impl BatchReporter {
    pub fn new(transport: Transport, batch_size: usize, flush_interval: Duration) -> Self {
        let (submissions, inbox) = mpsc::channel(1024);
        let pending = Arc::new(AtomicUsize::new(0));

        let state = BatchLoop {
            transport,
            batch_size: batch_size.max(1),
            flush_interval: flush_interval.max(Duration::from_millis(1)),
            inbox,
            buffer: Vec::new(),
            last_flush: Instant::now(),
            pending: pending.clone(),
        };
        tokio::spawn(state.run());

        Self {
            submissions,
            pending,
        }
    }

    /// Submit a record. A no-op after `close()`.
    pub async fn add(&self, record: ErrorRecord) {
        if self.submissions.send(BatchMessage::Add(record)).await.is_err() {
            tracing::warn!("batch reporter closed, error record dropped");
        }
    }

    /// Number of records currently buffered. Eventually consistent; meant for
    /// diagnostics and tests.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Flush any buffered records and stop. Waits for the final flush to
    /// complete. Idempotent; later calls return immediately.
    pub async fn close(&self) {
        let (done, closed) = oneshot::channel();
        if self.submissions.send(BatchMessage::Close(done)).await.is_ok() {
            let _ = closed.await;
        }
    }
}

struct BatchLoop {
    transport: Transport,
    batch_size: usize,
    flush_interval: Duration,
    inbox: mpsc::Receiver<BatchMessage>,
    buffer: Vec<ErrorRecord>,
    last_flush: Instant,
    pending: Arc<AtomicUsize>,
}

impl BatchLoop {
    async fn run(mut self) {
        let mut ticker = interval_at(
            Instant::now() + self.flush_interval,
            self.flush_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                message = self.inbox.recv() => match message {
                    Some(BatchMessage::Add(record)) => {
                        self.buffer.push(record);
                        self.pending.store(self.buffer.len(), Ordering::Release);
                        if self.buffer.len() >= self.batch_size
                            || self.last_flush.elapsed() >= self.flush_interval
                        {
                            self.flush().await;
                        }
                    }
                    Some(BatchMessage::Close(done)) => {
                        self.flush().await;
                        let _ = done.send(());
                        return;
                    }
                    // Every handle dropped without close(); flush what we have.
                    None => {
                        self.flush().await;
                        return;
                    }
                },
                _ = ticker.tick() => {
                    if self.last_flush.elapsed() >= self.flush_interval {
                        self.flush().await;
                    }
                }
            }
        }
    }

    /// Send and clear the buffer. Empty buffers are never flushed.
    async fn flush(&mut self) {
        self.last_flush = Instant::now();
        if self.buffer.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.buffer);
        self.pending.store(0, Ordering::Release);
        if let Err(error) = self.transport.send_errors(&batch).await {
            tracing::warn!(%error, count = batch.len(), "batch error flush failed");
        }
    }
}
