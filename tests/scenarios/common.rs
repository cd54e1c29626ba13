// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use pdp_modify_core::{
    bus::{InMemoryBus, Publisher},
    cfg::{config::RequestParameters, enums::PdpState},
    dispatcher::RequestIdDispatcher,
    messages::{PdpStateChange, PdpStatus, PdpUpdate, PolicyIdentifier, ToscaPolicy},
    modify_map::PdpModifyRequestMap,
    store::FakePolicyStore,
    timer::TimerManager,
};

pub struct Harness {
    pub bus: Arc<InMemoryBus>,
    pub store: Arc<FakePolicyStore>,
    pub dispatcher: Arc<RequestIdDispatcher>,
    pub map: Arc<PdpModifyRequestMap>,
}

pub fn params(max_wait_ms: u64, max_retry: u32) -> RequestParameters {
    RequestParameters {
        max_wait: Duration::from_millis(max_wait_ms),
        max_retry_count: max_retry,
    }
}

/// Builds a fresh in-memory harness with the given per-kind retry/timeout
/// parameters, mirroring how a real deployment wires the pieces together
/// from `Config` (§6).
pub fn harness(update_params: RequestParameters, state_change_params: RequestParameters) -> Harness {
    let bus = Arc::new(InMemoryBus::new());
    let publisher = Publisher::new("policy-pdp-pap", bus.clone());
    let dispatcher = Arc::new(RequestIdDispatcher::new());
    let update_timer = TimerManager::new();
    let state_change_timer = TimerManager::new();
    let store = Arc::new(FakePolicyStore::new());
    let map = PdpModifyRequestMap::new(
        publisher,
        dispatcher.clone(),
        update_timer,
        state_change_timer,
        update_params,
        state_change_params,
        store.clone(),
    );
    Harness {
        bus,
        store,
        dispatcher,
        map,
    }
}

pub fn update(name: &str, group: &str, subgroup: &str, policies: Vec<&str>, request_id: &str) -> PdpUpdate {
    PdpUpdate {
        name: Some(name.to_string()),
        pdp_group: Some(group.to_string()),
        pdp_subgroup: Some(subgroup.to_string()),
        policies: policies
            .into_iter()
            .map(|n| ToscaPolicy {
                name: n.to_string(),
                version: "1.0.0".to_string(),
                policy_type: String::new(),
                policy_type_version: String::new(),
            })
            .collect(),
        request_id: request_id.to_string(),
    }
}

pub fn state_change(name: &str, state: PdpState, request_id: &str) -> PdpStateChange {
    PdpStateChange {
        name: Some(name.to_string()),
        state,
        request_id: request_id.to_string(),
    }
}

pub fn status_for_update(name: &str, response_to: &str, group: &str, subgroup: &str, policies: Vec<&str>) -> PdpStatus {
    PdpStatus {
        name: Some(name.to_string()),
        response: Some(response_to.to_string()),
        response_to: None,
        state: PdpState::Active,
        pdp_group: Some(group.to_string()),
        pdp_subgroup: Some(subgroup.to_string()),
        policies: policies
            .into_iter()
            .map(|n| PolicyIdentifier {
                name: n.to_string(),
                version: "1.0.0".to_string(),
            })
            .collect(),
        pdp_type: String::new(),
        healthy: true,
        timestamp: Utc::now(),
    }
}

pub fn heartbeat(name: &str) -> PdpStatus {
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

pub fn status_for_state(name: &str, response_to: &str, state: PdpState) -> PdpStatus {
    PdpStatus {
        name: Some(name.to_string()),
        response: Some(response_to.to_string()),
        response_to: None,
        state,
        pdp_group: None,
        pdp_subgroup: None,
        policies: Vec::new(),
        pdp_type: String::new(),
        healthy: true,
        timestamp: Utc::now(),
    }
}
