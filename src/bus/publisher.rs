// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::{Result, bail};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bus::{queue_token::QueueToken, sink::BusSink};

/// Single-writer pump for one outbound topic (§4.A). `enqueue` is
/// non-blocking; a dedicated background task drains the queue in FIFO order
/// and writes each token's current message to the bus sink. A token whose
/// slot has already been emptied (superseded away, or cancelled) is silently
/// skipped — exactly one slot is consumed per token regardless of how many
/// times its message was replaced before the worker got to it.
pub struct Publisher<S: BusSink> {
    topic: String,
    queue_tx: mpsc::UnboundedSender<QueueToken>,
    cancel: CancellationToken,
    _sink: std::marker::PhantomData<S>,
}

/// Object-safe view of a `Publisher<S>` used by callers (the `Request` state
/// machine) that do not want to carry the concrete sink type `S` as a
/// generic parameter of their own.
pub trait TokenSink: Send + Sync + 'static {
    fn enqueue(&self, token: QueueToken) -> Result<()>;
    fn stop(&self);
}

impl<S: BusSink> TokenSink for Publisher<S> {
    fn enqueue(&self, token: QueueToken) -> Result<()> {
        Publisher::enqueue(self, token)
    }

    fn stop(&self) {
        Publisher::stop(self)
    }
}

impl<S: BusSink> Publisher<S> {
    /// Spawns the background worker and returns a handle. Dropping the
    /// handle does not stop the worker; call `stop()` explicitly.
    pub fn new(topic: impl Into<String>, sink: Arc<S>) -> Arc<Self> {
        let topic = topic.into();
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let worker_topic = topic.clone();
        let worker_cancel = cancel.clone();
        tokio::spawn(Self::run(worker_topic, sink, queue_rx, worker_cancel));

        Arc::new(Publisher {
            topic,
            queue_tx,
            cancel,
            _sink: std::marker::PhantomData,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Appends `token` to the FIFO queue. Non-blocking. Rejected once the
    /// Publisher has been stopped.
    pub fn enqueue(&self, token: QueueToken) -> Result<()> {
        if self.cancel.is_cancelled() {
            bail!("publisher for topic {} is stopped", self.topic);
        }
        self.queue_tx
            .send(token)
            .map_err(|_| anyhow::anyhow!("publisher worker for topic {} is gone", self.topic))
    }

    /// Terminates the worker and rejects further enqueues (§4.A).
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    async fn run(
        topic: String,
        sink: Arc<S>,
        mut queue_rx: mpsc::UnboundedReceiver<QueueToken>,
        cancel: CancellationToken,
    ) {
        loop {
            let token = tokio::select! {
                _ = cancel.cancelled() => break,
                item = queue_rx.recv() => match item {
                    Some(t) => t,
                    None => break,
                },
            };

            match token.take().await {
                None => debug!(topic = %topic, "skipped token with empty slot"),
                Some(msg) => {
                    if let Err(e) = sink.send(&topic, msg).await {
                        warn!(topic = %topic, error = %e, "publish failed");
                    }
                },
            }
        }
        debug!(topic = %topic, "publisher worker stopped");
    }
}
