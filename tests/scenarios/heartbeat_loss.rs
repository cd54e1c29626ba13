// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use pdp_modify_core::{
    bus::BusSource,
    cfg::enums::PdpState,
    heartbeat::PdpTracker,
    store::{GroupData, PolicyStoreDao, SubGroupData},
    timer::TimerManager,
};

use crate::scenarios::common::{harness, heartbeat, params, state_change};

fn group_with(pdp_name: &str) -> GroupData {
    GroupData {
        name: "g1".to_string(),
        state: "ACTIVE".to_string(),
        sub_groups: vec![SubGroupData {
            pdp_type: "xacml".to_string(),
            pdp_instances: vec![pdp_name.to_string(), "pdp_1x".to_string()],
            current_instance_count: 2,
        }],
    }
}

/// §8 scenario 6: a PDP that stops sending heartbeats past the missed-
/// heartbeat threshold is evicted from its sub-group and whatever it was
/// publishing is stopped. Unlike disable-PDP recovery, no corrective
/// `addRequest` is queued — the PDP is simply dropped, its in-flight request
/// left stopped but still in the map.
#[tokio::test]
async fn silent_pdp_is_evicted_and_its_publish_stopped() {
    let h = harness(params(5_000, 1), params(5_000, 1));
    h.store.seed_groups(vec![group_with("pdp_1")]);

    let tracker = PdpTracker::new(&h.dispatcher, TimerManager::new(), h.map.clone(), h.store.clone(), Duration::from_millis(80));

    h.map
        .add_state_change(state_change("pdp_1", PdpState::Active, "sc-1"))
        .await
        .unwrap();
    h.bus.recv().await.unwrap();

    h.dispatcher.dispatch(heartbeat("pdp_1")).await;
    assert!(tracker.is_tracking("pdp_1"));

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(!tracker.is_tracking("pdp_1"));
    assert!(h.store.get_filtered_pdp_groups("pdp_1").await.unwrap().is_empty());

    let groups = h.store.get_filtered_pdp_groups("pdp_1x").await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].sub_groups[0].pdp_instances, vec!["pdp_1x".to_string()]);

    // No corrective addRequest is queued on heartbeat loss (unlike
    // disable-PDP recovery): the stopped request is left in place rather
    // than the map entry being removed.
    assert!(h.map.is_tracked("pdp_1").await);

    assert!(
        tokio::time::timeout(Duration::from_millis(50), h.bus.recv())
            .await
            .is_err()
    );
}
