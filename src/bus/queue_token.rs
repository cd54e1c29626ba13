// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

/// A swappable one-slot holder enqueued on the `Publisher`. This is the sole
/// mechanism for "collapse an outstanding send" (§4.B): later code can
/// replace the slot's message in place before the Publisher drains it, so at
/// most one message per token is ever transmitted.
///
/// The slot holds the already-serialized envelope (`serde_json::Value`)
/// rather than a concrete `PdpUpdate`/`PdpStateChange`, since a single
/// Publisher topic carries both kinds of outbound message.
#[derive(Debug, Clone)]
pub struct QueueToken {
    slot: Arc<Mutex<Option<Value>>>,
}

/// Outcome of `replace_item`: distinguishes "the slot was still full, and we
/// replaced it" from "the slot had already been drained by the Publisher, so
/// the caller must enqueue a fresh token instead" (§9 QueueToken replacement
/// semantics).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replaced {
    /// The slot held `Value` before the swap.
    Previous(Value),
    /// The slot was already empty (drained or never filled).
    AlreadyTaken,
}

impl QueueToken {
    pub fn new(item: Value) -> Self {
        QueueToken {
            slot: Arc::new(Mutex::new(Some(item))),
        }
    }

    /// A token with an empty slot, for callers that only want a handle to
    /// hand to `replace_item` later.
    pub fn empty() -> Self {
        QueueToken {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Reads the slot's current value without consuming it. Used by the
    /// Publisher worker when draining.
    pub async fn get(&self) -> Option<Value> {
        self.slot.lock().await.clone()
    }

    /// Atomically swaps in `new`, returning the outcome (§4.B).
    pub async fn replace_item(&self, new: Value) -> Replaced {
        let mut guard = self.slot.lock().await;
        match guard.replace(new) {
            Some(old) => Replaced::Previous(old),
            None => Replaced::AlreadyTaken,
        }
    }

    /// Drains the slot, returning the prior value and leaving it empty. This
    /// is what the Publisher worker does when it dequeues a token.
    pub async fn take(&self) -> Option<Value> {
        self.slot.lock().await.take()
    }

    /// Empties the slot without reading it — the sole cancellation path for
    /// an already-enqueued message (`token.replaceItem(null)` in §5).
    pub async fn clear(&self) {
        let _ = self.slot.lock().await.take();
    }
}
