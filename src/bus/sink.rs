// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use serde_json::Value;
use tokio::sync::mpsc;

/// The message-bus transport is out of scope for this core (§1); this trait
/// is the seam a real broker client would implement. Kept generic (not a
/// trait object) so implementors can use plain `async fn` — the same choice
/// the teacher crate makes for `ClientConnection`, which is always handled
/// as a concrete `Arc<ClientConnection>` rather than `dyn` dispatch.
pub trait BusSink: Send + Sync + 'static {
    fn send(&self, topic: &str, envelope: Value) -> impl Future<Output = Result<()>> + Send;
}

/// Inbound half of the same seam: something that hands the `MessageDispatcher`
/// a stream of envelopes received on a topic.
pub trait BusSource: Send + Sync + 'static {
    fn recv(&self) -> impl Future<Output = Option<Value>> + Send;
}

/// Channel-backed test double implementing both `BusSink` and `BusSource`,
/// used in place of a real broker client (§4.J). Mirrors the role the
/// teacher's `ClientConnection` gives a real TCP socket: every test that
/// wants to observe "what got sent" or "what do we deliver back" drives one
/// of these instead of a live network endpoint.
pub struct InMemoryBus {
    tx: mpsc::UnboundedSender<Value>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Value>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        InMemoryBus {
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusSink for InMemoryBus {
    async fn send(&self, _topic: &str, envelope: Value) -> Result<()> {
        let _ = self.tx.send(envelope);
        Ok(())
    }
}

impl BusSource for InMemoryBus {
    async fn recv(&self) -> Option<Value> {
        self.rx.lock().await.recv().await
    }
}
