// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A policy identity as carried back in a `PdpStatus` response: just enough
/// to compare against the identifiers derived from an outgoing `ToscaPolicy`
/// list (§4.E response validation).
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PolicyIdentifier {
    pub name: String,
    pub version: String,
}

/// A full policy object as assigned by an `PdpUpdate`. Only `name`/`version`
/// participate in identifier comparisons; the whole struct participates in
/// `isSameContent` (full object equality per §4.E).
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ToscaPolicy {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub policy_type: String,
    #[serde(default)]
    pub policy_type_version: String,
}

impl ToscaPolicy {
    pub fn identifier(&self) -> PolicyIdentifier {
        PolicyIdentifier {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }
}

/// Derives the **set** of policy identifiers from a policy list. A null/empty
/// list is treated as empty (§4.E).
pub fn identifier_set(policies: &[ToscaPolicy]) -> BTreeSet<PolicyIdentifier> {
    policies.iter().map(ToscaPolicy::identifier).collect()
}

/// Derives the set of policy identifiers reported in a status response.
pub fn reported_identifier_set(policies: &[PolicyIdentifier]) -> BTreeSet<PolicyIdentifier> {
    policies.iter().cloned().collect()
}

/// Full-object set equality used by `isSameContent` for `UpdateReq` (§4.E):
/// same set, not same list order.
pub fn same_policy_set(a: &[ToscaPolicy], b: &[ToscaPolicy]) -> bool {
    let a: BTreeSet<&ToscaPolicy> = a.iter().collect();
    let b: BTreeSet<&ToscaPolicy> = b.iter().collect();
    a == b
}
