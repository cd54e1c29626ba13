// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use pdp_modify_core::{
    bus::BusSource,
    cfg::enums::PdpState,
    store::{GroupData, PolicyStoreDao, SubGroupData},
};

use crate::scenarios::common::{harness, params, state_change, status_for_state};

fn group_with_three_instances() -> GroupData {
    GroupData {
        name: "G".to_string(),
        state: "ACTIVE".to_string(),
        sub_groups: vec![SubGroupData {
            pdp_type: "xacml".to_string(),
            pdp_instances: vec!["pdp_1".to_string(), "pdp_1x".to_string(), "pdp_1y".to_string()],
            current_instance_count: 3,
        }],
    }
}

/// §8 scenario 5: a failing STATE-CHANGE for one member of a three-PDP
/// sub-group evicts only that member, persists the shrunk sub-group, and
/// quiesces the failed PDP.
#[tokio::test]
async fn failing_pdp_is_evicted_from_its_sub_group_only() {
    let h = harness(params(500, 1), params(500, 1));
    h.store.seed_groups(vec![group_with_three_instances()]);

    h.map
        .add_state_change(state_change("pdp_1", PdpState::Active, "sc-1"))
        .await
        .unwrap();
    h.bus.recv().await.unwrap();

    h.dispatcher
        .dispatch(status_for_state("pdp_1", "sc-1", PdpState::Safe))
        .await;

    // The PASSIVE STATE-CHANGE outranks the corrective detach UPDATE (§3),
    // so it is what reaches the bus first.
    let passive = h.bus.recv().await.unwrap();
    assert_eq!(passive["messageName"], "PDP_STATE_CHANGE");
    assert_eq!(passive["state"], "PASSIVE");

    let groups = h.store.get_filtered_pdp_groups("pdp_1x").await.unwrap();
    assert_eq!(groups.len(), 1);
    let sub_group = &groups[0].sub_groups[0];
    assert_eq!(sub_group.pdp_instances, vec!["pdp_1x".to_string(), "pdp_1y".to_string()]);
    assert_eq!(sub_group.current_instance_count, 2);

    // pdp_1 itself is no longer a group member...
    assert!(h.store.get_filtered_pdp_groups("pdp_1").await.unwrap().is_empty());
    // ...but the map keeps tracking it: the corrective requests just queued
    // are its new pending work, not a quiescent entry (§9 decision (a)).
    assert!(h.map.is_tracked("pdp_1").await);
}
