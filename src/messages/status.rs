// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{cfg::enums::PdpState, messages::PolicyIdentifier};

/// Inbound status envelope: either a response to an outstanding request
/// (`response`/`response_to` set) or an anonymous heartbeat.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PdpStatus {
    pub name: Option<String>,
    /// Correlation id this status is a response to, if any. §4.D: correlation
    /// occurs on `response`, falling back to `response_to`.
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub response_to: Option<String>,
    pub state: PdpState,
    #[serde(default)]
    pub pdp_group: Option<String>,
    #[serde(default)]
    pub pdp_subgroup: Option<String>,
    #[serde(default)]
    pub policies: Vec<PolicyIdentifier>,
    #[serde(default)]
    pub pdp_type: String,
    #[serde(default)]
    pub healthy: bool,
    pub timestamp: DateTime<Utc>,
}

impl PdpStatus {
    /// The correlation id the dispatcher should key on: `response`, falling
    /// back to `response_to` (§4.D, §6).
    pub fn correlation_id(&self) -> Option<&str> {
        self.response.as_deref().or(self.response_to.as_deref())
    }

    /// A status with no correlation id is an anonymous heartbeat.
    pub fn is_heartbeat(&self) -> bool {
        self.correlation_id().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(response: Option<&str>, response_to: Option<&str>) -> PdpStatus {
        PdpStatus {
            name: Some("pdp_1".to_string()),
            response: response.map(str::to_string),
            response_to: response_to.map(str::to_string),
            state: PdpState::Active,
            pdp_group: None,
            pdp_subgroup: None,
            policies: Vec::new(),
            pdp_type: String::new(),
            healthy: true,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn correlation_prefers_response_over_response_to() {
        let s = status(Some("r1"), Some("r2"));
        assert_eq!(s.correlation_id(), Some("r1"));
    }

    #[test]
    fn falls_back_to_response_to() {
        let s = status(None, Some("r2"));
        assert_eq!(s.correlation_id(), Some("r2"));
    }

    #[test]
    fn no_correlation_id_is_heartbeat() {
        let s = status(None, None);
        assert!(s.is_heartbeat());
    }
}
