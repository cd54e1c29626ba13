// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// PDP lifecycle state, as carried by `PdpStateChange` and reported back in
/// `PdpStatus`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PdpState {
    #[serde(rename = "PASSIVE")]
    Passive,
    #[serde(rename = "SAFE")]
    Safe,
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "TERMINATED")]
    Terminated,
}

impl fmt::Display for PdpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PdpState::Passive => "PASSIVE",
            PdpState::Safe => "SAFE",
            PdpState::Active => "ACTIVE",
            PdpState::Terminated => "TERMINATED",
        })
    }
}
