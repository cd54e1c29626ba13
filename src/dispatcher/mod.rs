//! Two-level inbound routing (§4.D): an outer stage keyed by the
//! `messageName` discriminator, and an inner `RequestIdDispatcher` that
//! correlates `PdpStatus` responses to the listener registered under their
//! `requestId` — falling back to anonymous (heartbeat) listeners when no
//! matching registration exists.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{bus::BusSource, messages::PdpStatus};

type ListenerFut = Pin<Box<dyn Future<Output = ()> + Send>>;
type Listener = Arc<dyn Fn(PdpStatus) -> ListenerFut + Send + Sync>;

/// Routes `PdpStatus` responses by `requestId` (§4.D inner stage).
/// `register`/`unregister` are idempotent; a second registration under the
/// same id replaces the first one.
#[derive(Default)]
pub struct RequestIdDispatcher {
    by_id: DashMap<String, Listener>,
    anonymous: DashMap<u64, Listener>,
    next_anonymous_id: AtomicU64,
}

/// Handle returned by `register_anonymous`, used to unregister later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnonymousToken(u64);

impl RequestIdDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&self, request_id: impl Into<String>, listener: F)
    where
        F: Fn(PdpStatus) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.by_id
            .insert(request_id.into(), Arc::new(move |s| Box::pin(listener(s))));
    }

    pub fn unregister(&self, request_id: &str) {
        self.by_id.remove(request_id);
    }

    pub fn is_registered(&self, request_id: &str) -> bool {
        self.by_id.contains_key(request_id)
    }

    /// Registers a fan-out (anonymous) listener invoked for every status
    /// that has no matching `requestId` listener — heartbeats in particular.
    pub fn register_anonymous<F, Fut>(&self, listener: F) -> AnonymousToken
    where
        F: Fn(PdpStatus) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_anonymous_id.fetch_add(1, Ordering::SeqCst);
        self.anonymous.insert(id, Arc::new(move |s| Box::pin(listener(s))));
        AnonymousToken(id)
    }

    pub fn unregister_anonymous(&self, token: AnonymousToken) {
        self.anonymous.remove(&token.0);
    }

    /// Routes one inbound status. Synchronous with respect to the caller:
    /// the matched listener (or every anonymous listener) is awaited before
    /// this returns.
    pub async fn dispatch(&self, status: PdpStatus) {
        if let Some(id) = status.correlation_id()
            && let Some(listener) = self.by_id.get(id).map(|kv| kv.value().clone())
        {
            listener(status).await;
            return;
        }

        for kv in self.anonymous.iter() {
            let listener = kv.value().clone();
            listener(status.clone()).await;
        }
    }
}

/// Outer stage: reads the `messageName` discriminator on an inbound
/// envelope and routes `PDP_STATUS` envelopes into the `RequestIdDispatcher`.
pub struct MessageDispatcher {
    request_ids: Arc<RequestIdDispatcher>,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        MessageDispatcher {
            request_ids: Arc::new(RequestIdDispatcher::new()),
        }
    }

    pub fn request_ids(&self) -> &Arc<RequestIdDispatcher> {
        &self.request_ids
    }

    /// Decodes one raw envelope and routes it if it is a recognized type.
    pub async fn dispatch_envelope(&self, envelope: Value) {
        match envelope.get("messageName").and_then(Value::as_str) {
            Some("PDP_STATUS") => match serde_json::from_value::<PdpStatus>(envelope) {
                Ok(status) => self.request_ids.dispatch(status).await,
                Err(e) => warn!(error = %e, "failed to decode PdpStatus envelope"),
            },
            other => debug!(?other, "ignoring inbound envelope of unhandled kind"),
        }
    }

    /// Drives `dispatch_envelope` from a `BusSource` until cancelled or the
    /// source closes. Spawned as the dispatcher's background worker (§5).
    pub async fn run<S: BusSource>(
        self: Arc<Self>,
        source: Arc<S>,
        cancel: CancellationToken,
    ) {
        loop {
            let envelope = tokio::select! {
                _ = cancel.cancelled() => break,
                env = source.recv() => match env {
                    Some(e) => e,
                    None => break,
                },
            };
            self.dispatch_envelope(envelope).await;
        }
        debug!("dispatcher worker stopped");
    }
}

impl Default for MessageDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
