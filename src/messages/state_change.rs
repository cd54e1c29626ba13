// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use serde::{Deserialize, Serialize};

use crate::cfg::enums::PdpState;

/// Instructs a PDP to move to a lifecycle state.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PdpStateChange {
    pub name: Option<String>,
    pub state: PdpState,
    pub request_id: String,
}

impl PdpStateChange {
    /// The quiescing `PASSIVE` state-change used by disable-PDP recovery
    /// (§4.G step 5).
    pub fn passive(name: String, request_id: String) -> Self {
        PdpStateChange {
            name: Some(name),
            state: PdpState::Passive,
            request_id,
        }
    }
}
