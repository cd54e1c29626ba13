//! The core orchestrator (§3 PdpModifyRequestMap, §4.G): owns one
//! `PdpRequests` per tracked PDP behind a single modify-lock, wires each
//! `Request`'s response/timeout callbacks back into itself via `Weak`
//! (breaking the ownership cycle, §9), and runs disable-PDP recovery when a
//! request exhausts retries or mismatches.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::HashMap,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    bus::TokenSink,
    cfg::config::RequestParameters,
    dispatcher::RequestIdDispatcher,
    error::PdpCoreError,
    messages::{PdpStateChange, PdpStatus, PdpUpdate},
    pdp_requests::{PdpRequests, RequestKind},
    request::{Request, RequestListener, RequestMessage},
    stats::{NoopStats, Stats},
    store::DynPolicyStore,
    timer::TimerManager,
};

static NEXT_RECOVERY_ID: AtomicU64 = AtomicU64::new(1);

fn next_recovery_request_id() -> String {
    format!("recovery-{}", NEXT_RECOVERY_ID.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug, Clone)]
enum Outcome {
    Success(String),
    Failure(String, String),
    RetryExhausted,
}

/// Shared Map-owned listener (§4.F "shared Map-owned RequestListener"): just
/// records the terminal outcome. Acting on it happens in the same
/// modify-lock scope that triggered it, so nothing here re-enters the lock.
#[derive(Default)]
struct OutcomeRecorder {
    outcome: Mutex<Option<Outcome>>,
}

impl OutcomeRecorder {
    async fn take(&self) -> Option<Outcome> {
        self.outcome.lock().await.take()
    }
}

impl RequestListener for OutcomeRecorder {
    async fn success(&self, pdp_name: String) {
        *self.outcome.lock().await = Some(Outcome::Success(pdp_name));
    }

    async fn failure(&self, pdp_name: String, reason: String) {
        *self.outcome.lock().await = Some(Outcome::Failure(pdp_name, reason));
    }

    async fn retry_count_exhausted(&self) {
        *self.outcome.lock().await = Some(Outcome::RetryExhausted);
    }
}

type Registry = HashMap<String, PdpRequests<OutcomeRecorder>>;

pub struct PdpModifyRequestMap {
    inner: Mutex<Registry>,
    publisher: Arc<dyn TokenSink>,
    dispatcher: Arc<RequestIdDispatcher>,
    update_timer: Arc<TimerManager>,
    state_change_timer: Arc<TimerManager>,
    update_params: RequestParameters,
    state_change_params: RequestParameters,
    store: Arc<dyn DynPolicyStore>,
    stats: Arc<dyn Stats>,
}

impl PdpModifyRequestMap {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        publisher: Arc<dyn TokenSink>,
        dispatcher: Arc<RequestIdDispatcher>,
        update_timer: Arc<TimerManager>,
        state_change_timer: Arc<TimerManager>,
        update_params: RequestParameters,
        state_change_params: RequestParameters,
        store: Arc<dyn DynPolicyStore>,
    ) -> Arc<Self> {
        Self::with_stats(
            publisher,
            dispatcher,
            update_timer,
            state_change_timer,
            update_params,
            state_change_params,
            store,
            Arc::new(NoopStats),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_stats(
        publisher: Arc<dyn TokenSink>,
        dispatcher: Arc<RequestIdDispatcher>,
        update_timer: Arc<TimerManager>,
        state_change_timer: Arc<TimerManager>,
        update_params: RequestParameters,
        state_change_params: RequestParameters,
        store: Arc<dyn DynPolicyStore>,
        stats: Arc<dyn Stats>,
    ) -> Arc<Self> {
        Arc::new(PdpModifyRequestMap {
            inner: Mutex::new(HashMap::new()),
            publisher,
            dispatcher,
            update_timer,
            state_change_timer,
            update_params,
            state_change_params,
            store,
            stats,
        })
    }

    fn kind_name(kind: RequestKind) -> &'static str {
        match kind {
            RequestKind::Update => "update",
            RequestKind::StateChange => "stateChange",
        }
    }

    fn timer_for(&self, kind: RequestKind) -> &TimerManager {
        match kind {
            RequestKind::Update => &self.update_timer,
            RequestKind::StateChange => &self.state_change_timer,
        }
    }

    fn max_wait_for(&self, kind: RequestKind) -> tokio::time::Duration {
        match kind {
            RequestKind::Update => self.update_params.max_wait,
            RequestKind::StateChange => self.state_change_params.max_wait,
        }
    }

    fn max_retry_for(&self, kind: RequestKind) -> u32 {
        match kind {
            RequestKind::Update => self.update_params.max_retry_count,
            RequestKind::StateChange => self.state_change_params.max_retry_count,
        }
    }

    pub async fn add_update(self: &Arc<Self>, update: PdpUpdate) -> Result<()> {
        self.add_message(RequestMessage::Update(update)).await
    }

    pub async fn add_state_change(self: &Arc<Self>, state_change: PdpStateChange) -> Result<()> {
        self.add_message(RequestMessage::StateChange(state_change)).await
    }

    /// §4.F/§4.G `addRequest`: only issues targeted messages (a `null` name
    /// has nothing to coalesce against — broadcast is out of scope for this
    /// path per the map's per-PDP keying).
    async fn add_message(self: &Arc<Self>, message: RequestMessage) -> Result<()> {
        if message.target_name().is_none() {
            return Err(PdpCoreError::Broadcast("addRequest requires a targeted PDP name".into()).into());
        }
        let mut inner = self.inner.lock().await;
        self.add_request_locked(&mut inner, message).await
    }

    /// Core of `addSingleton` + "start if nothing is active", callable while
    /// `inner` is already locked (used directly by disable-PDP recovery).
    async fn add_request_locked(self: &Arc<Self>, inner: &mut Registry, message: RequestMessage) -> Result<()> {
        let pdp_name = message.target_name().expect("checked by caller").to_string();
        let kind = RequestKind::of(&message);

        let pdp_requests = inner
            .entry(pdp_name.clone())
            .or_insert_with(|| PdpRequests::new(pdp_name.clone(), Arc::new(OutcomeRecorder::default())));

        let same_content = pdp_requests
            .existing_message(kind)
            .map(|existing| existing.is_same_content(&message))
            .unwrap_or(false);

        if same_content {
            pdp_requests.reset_retry_count(kind);
        } else if pdp_requests.existing_message(kind).is_some() {
            let timer_manager = self.timer_for(kind);
            let max_wait = self.max_wait_for(kind);
            pdp_requests.reconfigure(kind, message, &self.dispatcher, timer_manager, max_wait).await?;
        } else {
            let max_retry = self.max_retry_for(kind);
            let mut request = Request::new(message, max_retry);
            self.wire_callbacks(&mut request, &pdp_name, kind);
            pdp_requests.store(kind, request);
            self.stats.request_enqueued(Self::kind_name(kind));
        }

        // §3 priority: STATE-CHANGE runs before UPDATE whenever both are
        // pending. A STATE-CHANGE arriving while an UPDATE is already
        // publishing preempts it — the UPDATE stays stored, just no longer
        // active, and resumes once the STATE-CHANGE completes.
        if let Some(preferred) = pdp_requests.next_pending_kind() {
            let active = pdp_requests.active_kind();
            if active != Some(preferred) {
                if active.is_some() {
                    pdp_requests.stop_publishing(&self.dispatcher).await;
                }
                self.start_request_locked(pdp_requests, preferred).await?;
            }
        }
        Ok(())
    }

    async fn start_request_locked(&self, pdp_requests: &mut PdpRequests<OutcomeRecorder>, kind: RequestKind) -> Result<()> {
        let max_wait = self.max_wait_for(kind);
        let timer_manager = self.timer_for(kind);
        pdp_requests
            .start_publishing(kind, self.publisher.as_ref(), &self.dispatcher, timer_manager, max_wait)
            .await
    }

    fn wire_callbacks(self: &Arc<Self>, request: &mut Request<OutcomeRecorder>, pdp_name: &str, kind: RequestKind) {
        let weak_for_response = Arc::downgrade(self);
        let pdp_name_for_response = pdp_name.to_string();
        let weak_for_timeout = Arc::downgrade(self);
        let pdp_name_for_timeout = pdp_name.to_string();

        request.set_callbacks(
            move |status: PdpStatus| {
                let weak = weak_for_response.clone();
                let pdp_name = pdp_name_for_response.clone();
                async move {
                    if let Some(map) = weak.upgrade() {
                        map.on_response(pdp_name, kind, status).await;
                    }
                }
            },
            move |_timer_key: String| {
                let weak = weak_for_timeout.clone();
                let pdp_name = pdp_name_for_timeout.clone();
                async move {
                    if let Some(map) = weak.upgrade() {
                        map.on_timeout(pdp_name, kind).await;
                    }
                }
            },
        );
    }

    async fn on_response(self: Arc<Self>, pdp_name: String, kind: RequestKind, status: PdpStatus) {
        let mut inner = self.inner.lock().await;
        let Some(pdp_requests) = inner.get_mut(&pdp_name) else { return };
        {
            let Some(request) = pdp_requests.slot_mut(kind) else { return };
            request.process_response(&status, &self.dispatcher).await;
        }
        if let Some(outcome) = pdp_requests.listener().take().await {
            self.handle_outcome_locked(&mut inner, &pdp_name, kind, outcome).await;
        }
    }

    async fn on_timeout(self: Arc<Self>, pdp_name: String, kind: RequestKind) {
        let mut inner = self.inner.lock().await;
        let max_wait = self.max_wait_for(kind);
        let Some(pdp_requests) = inner.get_mut(&pdp_name) else { return };
        {
            let timer_manager = self.timer_for(kind);
            let Some(request) = pdp_requests.slot_mut(kind) else { return };
            if request
                .handle_timeout(self.publisher.as_ref(), &self.dispatcher, timer_manager, max_wait)
                .await
                .is_err()
            {
                return;
            }
        }
        self.stats.request_timed_out(Self::kind_name(kind));
        if let Some(outcome) = pdp_requests.listener().take().await {
            self.handle_outcome_locked(&mut inner, &pdp_name, kind, outcome).await;
        }
    }

    /// Runs after a Request reaches a terminal outcome. The slot it occupied
    /// is cleared first — a completed Request is not "pending" for the
    /// purposes of `next_pending_kind`/`active_kind`, and corrective
    /// `addRequest` calls during recovery must see an empty slot so they
    /// store a fresh Request rather than reconfiguring the finished one.
    async fn handle_outcome_locked(&self, inner: &mut Registry, pdp_name: &str, kind: RequestKind, outcome: Outcome) {
        if let Some(pdp_requests) = inner.get_mut(pdp_name) {
            pdp_requests.clear(kind);
        }
        match outcome {
            Outcome::Success(reported_name) => {
                if reported_name != pdp_name {
                    return;
                }
                self.stats.request_succeeded(Self::kind_name(kind));
                let Some(pdp_requests) = inner.get_mut(pdp_name) else { return };
                match pdp_requests.next_pending_kind() {
                    Some(next_kind) => {
                        if let Err(e) = self.start_request_locked(pdp_requests, next_kind).await {
                            warn!(pdp = %pdp_name, error = %e, "failed to start next queued request");
                        }
                    },
                    None => {
                        inner.remove(pdp_name);
                    },
                }
            },
            Outcome::Failure(reported_name, reason) => {
                if reported_name != pdp_name {
                    return;
                }
                self.disable_pdp_recovery(inner, pdp_name, &reason).await;
            },
            Outcome::RetryExhausted => {
                self.stats.retry_exhausted(Self::kind_name(kind));
                self.disable_pdp_recovery(inner, pdp_name, "retry count exhausted").await;
            },
        }
    }

    /// §4.G disable-PDP recovery. Runs entirely within the caller's
    /// modify-lock acquisition: the corrective `addRequest` calls below go
    /// through `add_request_locked` directly rather than re-locking.
    async fn disable_pdp_recovery(self: &Arc<Self>, inner: &mut Registry, pdp_name: &str, reason: &str) {
        warn!(pdp = %pdp_name, reason, "disabling PDP after request failure");
        self.stats.pdp_disabled();

        let old_instance_id = inner.get(pdp_name).map(PdpRequests::instance_id);

        if let Some(pdp_requests) = inner.get_mut(pdp_name) {
            pdp_requests.stop_publishing(&self.dispatcher).await;
        }

        let mut was_group_member = false;
        match self.store.get_filtered_pdp_groups(pdp_name).await {
            Ok(mut groups) => {
                for group in &mut groups {
                    if group.remove_pdp_instance(pdp_name) {
                        was_group_member = true;
                    }
                }
                if was_group_member
                    && let Err(e) = self.store.update_pdp_groups(groups).await
                {
                    warn!(pdp = %pdp_name, error = %e, "failed to persist group cleanup during recovery");
                }
            },
            Err(e) => warn!(pdp = %pdp_name, error = %e, "failed to load groups during recovery"),
        }

        if was_group_member {
            let detach = PdpUpdate::detach(pdp_name.to_string(), next_recovery_request_id());
            if let Err(e) = self.add_request_locked(inner, RequestMessage::Update(detach)).await {
                warn!(pdp = %pdp_name, error = %e, "failed to queue corrective update during recovery");
            }
        }
        let passive = PdpStateChange::passive(pdp_name.to_string(), next_recovery_request_id());
        if let Err(e) = self.add_request_locked(inner, RequestMessage::StateChange(passive)).await {
            warn!(pdp = %pdp_name, error = %e, "failed to queue corrective state-change during recovery");
        }

        // §9 decision (a): only remove if the map still holds the exact
        // entry recovery started with — the corrective calls above may have
        // already created a fresh one under the same key.
        if let (Some(old_id), Some(occupant)) = (old_instance_id, inner.get(pdp_name))
            && occupant.instance_id() == old_id
        {
            inner.remove(pdp_name);
        }
        info!(pdp = %pdp_name, "disable-PDP recovery complete");
    }

    /// §4.F `stopPublishing` exposed at the map level (used by heartbeat
    /// loss, §4.H).
    pub async fn stop_publishing(&self, pdp_name: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(pdp_requests) = inner.get_mut(pdp_name) {
            pdp_requests.stop_publishing(&self.dispatcher).await;
        }
    }

    pub async fn is_tracked(&self, pdp_name: &str) -> bool {
        self.inner.lock().await.contains_key(pdp_name)
    }

    pub async fn pdp_count(&self) -> usize {
        self.inner.lock().await.len()
    }
}
