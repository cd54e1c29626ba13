//! In-memory `PolicyStoreDao` used by this crate's own tests and available
//! to integrators wiring up a test harness without a real database.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Mutex;

use anyhow::Result;

use super::{GroupData, PolicyStoreDao};
use crate::messages::ToscaPolicy;

#[derive(Default)]
pub struct FakePolicyStore {
    groups: Mutex<Vec<GroupData>>,
    policies: Mutex<Vec<ToscaPolicy>>,
}

impl FakePolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_groups(&self, groups: Vec<GroupData>) {
        *self.groups.lock().unwrap() = groups;
    }

    pub fn seed_policies(&self, policies: Vec<ToscaPolicy>) {
        *self.policies.lock().unwrap() = policies;
    }
}

impl PolicyStoreDao for FakePolicyStore {
    async fn get_filtered_pdp_groups(&self, pdp_instance: &str) -> Result<Vec<GroupData>> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .iter()
            .filter(|g| {
                g.sub_groups
                    .iter()
                    .any(|sg| sg.pdp_instances.iter().any(|i| i == pdp_instance))
            })
            .cloned()
            .collect())
    }

    async fn update_pdp_groups(&self, groups: Vec<GroupData>) -> Result<()> {
        let mut guard = self.groups.lock().unwrap();
        for updated in groups {
            if let Some(existing) = guard.iter_mut().find(|g| g.name == updated.name) {
                *existing = updated;
            } else {
                guard.push(updated);
            }
        }
        Ok(())
    }

    async fn get_policy_list(&self, name: &str, version: &str) -> Result<Vec<ToscaPolicy>> {
        Ok(self
            .policies
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.name == name && p.version == version)
            .cloned()
            .collect())
    }

    async fn get_filtered_policy_list(&self, name_filter: &str) -> Result<Vec<ToscaPolicy>> {
        Ok(self
            .policies
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.name.contains(name_filter))
            .cloned()
            .collect())
    }
}
