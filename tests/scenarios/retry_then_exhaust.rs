// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use pdp_modify_core::{
    bus::BusSource,
    cfg::enums::PdpState,
    store::{GroupData, PolicyStoreDao, SubGroupData},
};

use crate::scenarios::common::{harness, params, state_change};

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

/// §8 scenario 4: with `maxRetryCount=2`, a STATE-CHANGE that times out
/// three times in a row is re-published twice, then runs disable-PDP
/// recovery instead of a third re-publish.
#[tokio::test]
async fn three_timeouts_retry_twice_then_exhaust() {
    let h = harness(params(80, 2), params(80, 2));
    h.store.seed_groups(vec![group_with("pdp_1")]);

    h.map
        .add_state_change(state_change("pdp_1", PdpState::Active, "sc-1"))
        .await
        .unwrap();

    // Initial send.
    h.bus.recv().await.unwrap();
    // Timeout 1: first retry re-publishes.
    h.bus.recv().await.unwrap();
    // Timeout 2: second retry re-publishes.
    h.bus.recv().await.unwrap();

    // Timeout 3: retries are exhausted and disable-PDP recovery runs. Its
    // PASSIVE STATE-CHANGE outranks the detach UPDATE (§3), so it is what
    // shows up next instead of a third plain re-publish.
    let passive = h.bus.recv().await.unwrap();
    assert_eq!(passive["messageName"], "PDP_STATE_CHANGE");
    assert_eq!(passive["state"], "PASSIVE");

    assert!(h.store.get_filtered_pdp_groups("pdp_1").await.unwrap().is_empty());
}
