// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use pdp_modify_core::{
    bus::BusSource,
    cfg::enums::PdpState,
    store::{GroupData, PolicyStoreDao, SubGroupData},
};

use crate::scenarios::common::{harness, params, state_change, status_for_state};

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

/// §8 scenario 2: a STATE-CHANGE answered with the wrong state fails
/// validation and runs disable-PDP recovery, which queues a detach UPDATE
/// and a PASSIVE STATE-CHANGE. STATE-CHANGE outranks UPDATE (§3), so PASSIVE
/// is what actually reaches the bus first; the detach follows once PASSIVE
/// completes.
#[tokio::test]
async fn mismatched_state_triggers_disable_pdp_recovery() {
    let h = harness(params(500, 1), params(500, 1));
    h.store.seed_groups(vec![group_with("pdp_1")]);

    h.map
        .add_state_change(state_change("pdp_1", PdpState::Active, "sc-1"))
        .await
        .unwrap();
    h.bus.recv().await.unwrap();

    h.dispatcher
        .dispatch(status_for_state("pdp_1", "sc-1", PdpState::Safe))
        .await;

    let passive = h.bus.recv().await.unwrap();
    assert_eq!(passive["messageName"], "PDP_STATE_CHANGE");
    assert_eq!(passive["state"], "PASSIVE");

    let groups = h.store.get_filtered_pdp_groups("pdp_1").await.unwrap();
    assert!(groups.is_empty());

    let passive_request_id = passive["requestId"].as_str().unwrap().to_string();
    h.dispatcher
        .dispatch(status_for_state("pdp_1", &passive_request_id, PdpState::Passive))
        .await;

    let detach = h.bus.recv().await.unwrap();
    assert_eq!(detach["messageName"], "PDP_UPDATE");
    assert_eq!(detach["pdpGroup"], serde_json::Value::Null);
    assert_eq!(detach["pdpSubgroup"], serde_json::Value::Null);
    assert_eq!(detach["policies"], serde_json::json!([]));
}
