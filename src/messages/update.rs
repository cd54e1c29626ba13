// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use serde::{Deserialize, Serialize};

use crate::messages::ToscaPolicy;

/// Instructs a PDP which group/subgroup/policies to host. An empty
/// `policies` list detaches the PDP from policy enforcement (used by
/// disable-PDP recovery, §4.G).
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PdpUpdate {
    pub name: Option<String>,
    pub pdp_group: Option<String>,
    pub pdp_subgroup: Option<String>,
    #[serde(default)]
    pub policies: Vec<ToscaPolicy>,
    pub request_id: String,
}

impl PdpUpdate {
    /// Detach-and-quiesce payload used by disable-PDP recovery (§4.G step 5).
    pub fn detach(name: String, request_id: String) -> Self {
        PdpUpdate {
            name: Some(name),
            pdp_group: None,
            pdp_subgroup: None,
            policies: Vec::new(),
            request_id,
        }
    }
}
