//! Heartbeat tracking (§4.H): an anonymous listener that re-arms a
//! per-PDP deadline on every heartbeat and, on silence, cleans the PDP out
//! of its sub-group and stops whatever it was publishing.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use dashmap::DashMap;
use tokio::time::Duration;
use tracing::warn;

use crate::{
    dispatcher::RequestIdDispatcher,
    messages::PdpStatus,
    modify_map::PdpModifyRequestMap,
    store::DynPolicyStore,
    timer::{Timer, TimerManager},
};

/// §9 decision (c): `MAX_MISSED_HEARTBEATS * heartBeatMs` wall-clock since
/// the last heartbeat, reset on every heartbeat.
pub struct PdpTracker {
    timer_manager: Arc<TimerManager>,
    map: Arc<PdpModifyRequestMap>,
    store: Arc<dyn DynPolicyStore>,
    threshold: Duration,
    deadlines: DashMap<String, Timer>,
}

impl PdpTracker {
    /// Registers the anonymous listener with `dispatcher` and returns the
    /// tracker. Wired via `Weak` the same way `modify_map` wires its
    /// response/timeout callbacks, to avoid an ownership cycle through the
    /// dispatcher's registry.
    pub fn new(
        dispatcher: &RequestIdDispatcher,
        timer_manager: Arc<TimerManager>,
        map: Arc<PdpModifyRequestMap>,
        store: Arc<dyn DynPolicyStore>,
        threshold: Duration,
    ) -> Arc<Self> {
        let tracker = Arc::new(PdpTracker {
            timer_manager,
            map,
            store,
            threshold,
            deadlines: DashMap::new(),
        });

        let weak = Arc::downgrade(&tracker);
        dispatcher.register_anonymous(move |status: PdpStatus| {
            let weak = weak.clone();
            async move {
                if let Some(tracker) = weak.upgrade() {
                    tracker.on_heartbeat(status).await;
                }
            }
        });

        tracker
    }

    async fn on_heartbeat(self: &Arc<Self>, status: PdpStatus) {
        let Some(pdp_name) = status.name else { return };
        self.rearm(pdp_name).await;
    }

    async fn rearm(self: &Arc<Self>, pdp_name: String) {
        if let Some(previous) = self.deadlines.get(&pdp_name) {
            previous.cancel();
        }

        let weak = Arc::downgrade(self);
        let key = pdp_name.clone();
        let timer = self
            .timer_manager
            .register(pdp_name.clone(), self.threshold, move |_k: String| {
                let weak = weak.clone();
                let pdp_name = key.clone();
                async move {
                    if let Some(tracker) = weak.upgrade() {
                        tracker.on_silence(pdp_name).await;
                    }
                }
            })
            .await;

        self.deadlines.insert(pdp_name, timer);
    }

    /// §4.H: on expiry, remove the PDP from its sub-group and stop whatever
    /// it was publishing. No corrective `addRequest` here — unlike
    /// disable-PDP recovery, heartbeat loss does not push a PASSIVE
    /// state-change.
    async fn on_silence(&self, pdp_name: String) {
        self.deadlines.remove(&pdp_name);
        warn!(pdp = %pdp_name, "missed heartbeat threshold exceeded");

        match self.store.get_filtered_pdp_groups(&pdp_name).await {
            Ok(mut groups) => {
                let mut touched = false;
                for group in &mut groups {
                    if group.remove_pdp_instance(&pdp_name) {
                        touched = true;
                    }
                }
                if touched
                    && let Err(e) = self.store.update_pdp_groups(groups).await
                {
                    warn!(pdp = %pdp_name, error = %e, "failed to persist group cleanup after heartbeat loss");
                }
            },
            Err(e) => warn!(pdp = %pdp_name, error = %e, "failed to load groups after heartbeat loss"),
        }

        self.map.stop_publishing(&pdp_name).await;
    }

    pub fn is_tracking(&self, pdp_name: &str) -> bool {
        self.deadlines.contains_key(pdp_name)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{
        bus::{InMemoryBus, Publisher},
        cfg::{config::RequestParameters, enums::PdpState},
        store::{FakePolicyStore, GroupData, SubGroupData},
    };

    fn heartbeat(name: &str) -> PdpStatus {
        PdpStatus {
            name: Some(name.to_string()),
            response: None,
            response_to: None,
            state: PdpState::Active,
            pdp_group: None,
            pdp_subgroup: None,
            policies: Vec::new(),
            pdp_type: "xacml".to_string(),
            healthy: true,
            timestamp: Utc::now(),
        }
    }

    fn params() -> RequestParameters {
        RequestParameters {
            max_wait: Duration::from_secs(5),
            max_retry_count: 1,
        }
    }

    fn group_with(pdp_name: &str) -> GroupData {
        GroupData {
            name: "g1".to_string(),
            state: "ACTIVE".to_string(),
            sub_groups: vec![SubGroupData {
                pdp_type: "xacml".to_string(),
                pdp_instances: vec![pdp_name.to_string()],
                current_instance_count: 1,
            }],
        }
    }

    async fn harness(threshold: Duration) -> (Arc<RequestIdDispatcher>, Arc<PdpTracker>, Arc<FakePolicyStore>) {
        let bus = Arc::new(InMemoryBus::new());
        let publisher = Publisher::new("policy-pdp-pap", bus.clone());
        let dispatcher = Arc::new(RequestIdDispatcher::new());
        let store = Arc::new(FakePolicyStore::new());
        let map = PdpModifyRequestMap::new(
            publisher,
            dispatcher.clone(),
            TimerManager::new(),
            TimerManager::new(),
            params(),
            params(),
            store.clone(),
        );
        let tracker = PdpTracker::new(&dispatcher, TimerManager::new(), map, store.clone(), threshold);
        (dispatcher, tracker, store)
    }

    #[tokio::test]
    async fn first_heartbeat_starts_tracking() {
        let (dispatcher, tracker, _store) = harness(Duration::from_millis(3000)).await;
        dispatcher.dispatch(heartbeat("pdp_1")).await;
        assert!(tracker.is_tracking("pdp_1"));
    }

    #[tokio::test]
    async fn repeated_heartbeats_keep_resetting_the_deadline() {
        let (dispatcher, tracker, store) = harness(Duration::from_millis(120)).await;
        store.seed_groups(vec![group_with("pdp_1")]);

        for _ in 0..4 {
            dispatcher.dispatch(heartbeat("pdp_1")).await;
            tokio::time::sleep(Duration::from_millis(60)).await;
        }

        assert!(tracker.is_tracking("pdp_1"));
        assert!(!store.get_filtered_pdp_groups("pdp_1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn silence_past_threshold_evicts_the_pdp_from_its_group() {
        let (dispatcher, tracker, store) = harness(Duration::from_millis(80)).await;
        store.seed_groups(vec![group_with("pdp_1")]);

        dispatcher.dispatch(heartbeat("pdp_1")).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!tracker.is_tracking("pdp_1"));
        assert!(store.get_filtered_pdp_groups("pdp_1").await.unwrap().is_empty());
    }
}
