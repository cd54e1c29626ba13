//! Per-PDP request serializer (§3, §4.F): at most one pending `UpdateReq`
//! and one pending `StateChangeReq`, with at most one of the two publishing
//! at a time (invariant P1).

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use anyhow::Result;
use tokio::time::Duration;

use crate::{
    bus::TokenSink,
    dispatcher::RequestIdDispatcher,
    request::{Request, RequestMessage, listener::RequestListener},
    timer::TimerManager,
};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// STATE-CHANGE (priority 0) or UPDATE (priority 1) — the two slots a
/// `PdpRequests` can hold (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    StateChange,
    Update,
}

impl RequestKind {
    pub fn of(message: &RequestMessage) -> Self {
        match message {
            RequestMessage::Update(_) => RequestKind::Update,
            RequestMessage::StateChange(_) => RequestKind::StateChange,
        }
    }
}

pub struct PdpRequests<L: RequestListener> {
    instance_id: u64,
    pdp_name: String,
    listener: Arc<L>,
    update_slot: Option<Request<L>>,
    state_change_slot: Option<Request<L>>,
}

impl<L: RequestListener> PdpRequests<L> {
    pub fn new(pdp_name: String, listener: Arc<L>) -> Self {
        PdpRequests {
            instance_id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
            pdp_name,
            listener,
            update_slot: None,
            state_change_slot: None,
        }
    }

    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    pub fn pdp_name(&self) -> &str {
        &self.pdp_name
    }

    pub fn listener(&self) -> Arc<L> {
        self.listener.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.update_slot.is_none() && self.state_change_slot.is_none()
    }

    pub fn slot(&self, kind: RequestKind) -> &Option<Request<L>> {
        match kind {
            RequestKind::Update => &self.update_slot,
            RequestKind::StateChange => &self.state_change_slot,
        }
    }

    pub fn slot_mut(&mut self, kind: RequestKind) -> &mut Option<Request<L>> {
        match kind {
            RequestKind::Update => &mut self.update_slot,
            RequestKind::StateChange => &mut self.state_change_slot,
        }
    }

    pub fn existing_message(&self, kind: RequestKind) -> Option<&RequestMessage> {
        self.slot(kind).as_ref().map(|r| r.message())
    }

    /// Lowest-priority occupied slot: STATE-CHANGE before UPDATE (§3).
    pub fn next_pending_kind(&self) -> Option<RequestKind> {
        if self.state_change_slot.is_some() {
            Some(RequestKind::StateChange)
        } else if self.update_slot.is_some() {
            Some(RequestKind::Update)
        } else {
            None
        }
    }

    /// Invariant P1: at most one slot publishing at a time.
    pub fn active_kind(&self) -> Option<RequestKind> {
        if self.state_change_slot.as_ref().is_some_and(Request::is_publishing) {
            Some(RequestKind::StateChange)
        } else if self.update_slot.as_ref().is_some_and(Request::is_publishing) {
            Some(RequestKind::Update)
        } else {
            None
        }
    }

    pub fn reset_retry_count(&mut self, kind: RequestKind) {
        if let Some(existing) = self.slot_mut(kind) {
            existing.reset_retry_count();
        }
    }

    /// §4.F `addSingleton`, store branch: no Request of this subtype is
    /// currently pending. The caller has already wired the listener and
    /// response/timeout callbacks onto `request`.
    pub fn store(&mut self, kind: RequestKind, mut request: Request<L>) {
        request.set_listener(self.listener.clone());
        *self.slot_mut(kind) = Some(request);
    }

    /// §4.F `addSingleton`, reconfigure branch: a Request of this subtype is
    /// already pending with different content. Coalesces in place, reusing
    /// its queue token if it is currently publishing.
    pub async fn reconfigure(
        &mut self,
        kind: RequestKind,
        message: RequestMessage,
        dispatcher: &RequestIdDispatcher,
        timer_manager: &TimerManager,
        max_wait: Duration,
    ) -> Result<bool> {
        let Some(existing) = self.slot_mut(kind) else {
            return Ok(false);
        };
        existing.reconfigure(message, None, dispatcher, timer_manager, max_wait).await
    }

    /// Starts the pending Request of `kind`, if any. No-op if it is already
    /// publishing or the slot is empty.
    pub async fn start_publishing(
        &mut self,
        kind: RequestKind,
        publisher: &dyn TokenSink,
        dispatcher: &RequestIdDispatcher,
        timer_manager: &TimerManager,
        max_wait: Duration,
    ) -> Result<()> {
        if let Some(request) = self.slot_mut(kind)
            && !request.is_publishing()
        {
            request.start_publishing(None, publisher, dispatcher, timer_manager, max_wait).await?;
        }
        Ok(())
    }

    /// §4.F `stopPublishing`: stops whichever Request is currently
    /// publishing; pending slots are left intact.
    pub async fn stop_publishing(&mut self, dispatcher: &RequestIdDispatcher) {
        if let Some(kind) = self.active_kind()
            && let Some(request) = self.slot_mut(kind)
        {
            request.stop_publishing(dispatcher, true).await;
        }
    }

    /// Removes `kind`'s slot outright (used when disable-PDP recovery
    /// discards pending work rather than letting it run).
    pub fn clear(&mut self, kind: RequestKind) -> Option<Request<L>> {
        self.slot_mut(kind).take()
    }
}
