//! Policy store DAO seam (§4.I, §6): a narrow trait covering only the
//! operations this core actually calls, plus an in-memory test double. A
//! real implementation backed by a database is a collaborator's concern, not
//! this crate's (§1 Non-goals).

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod fake;

pub use fake::FakePolicyStore;

use std::pin::Pin;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::messages::ToscaPolicy;

/// One PDP sub-group: a type tag and the instance-ids currently assigned to
/// it. Mutated only to *remove* a failed PDP during disable-PDP recovery
/// (§4.G).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubGroupData {
    pub pdp_type: String,
    pub pdp_instances: Vec<String>,
    pub current_instance_count: u32,
}

impl SubGroupData {
    pub fn remove_instance(&mut self, pdp_name: &str) -> bool {
        let before = self.pdp_instances.len();
        self.pdp_instances.retain(|i| i != pdp_name);
        let removed = self.pdp_instances.len() != before;
        if removed {
            self.current_instance_count = self.pdp_instances.len() as u32;
        }
        removed
    }
}

/// A policy group: name, lifecycle state, and its sub-groups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupData {
    pub name: String,
    pub state: String,
    pub sub_groups: Vec<SubGroupData>,
}

impl GroupData {
    /// Removes `pdp_name` from every sub-group that lists it. Returns
    /// whether any sub-group was touched.
    pub fn remove_pdp_instance(&mut self, pdp_name: &str) -> bool {
        let mut touched = false;
        for sub_group in &mut self.sub_groups {
            if sub_group.remove_instance(pdp_name) {
                touched = true;
            }
        }
        touched
    }
}

/// §4.I: `get_filtered_pdp_groups`/`update_pdp_groups`/`get_policy_list`/
/// `get_filtered_policy_list`, the only DAO operations this core consumes.
pub trait PolicyStoreDao: Send + Sync + 'static {
    fn get_filtered_pdp_groups(&self, pdp_instance: &str) -> impl Future<Output = Result<Vec<GroupData>>> + Send;
    fn update_pdp_groups(&self, groups: Vec<GroupData>) -> impl Future<Output = Result<()>> + Send;
    fn get_policy_list(&self, name: &str, version: &str) -> impl Future<Output = Result<Vec<ToscaPolicy>>> + Send;
    fn get_filtered_policy_list(&self, name_filter: &str) -> impl Future<Output = Result<Vec<ToscaPolicy>>> + Send;
}

/// Object-safe view of a `PolicyStoreDao` (the same `TokenSink` move as
/// `bus::publisher`: callers that want to hold the store behind `Arc<dyn _>`
/// cannot carry `PolicyStoreDao`'s RPITIT methods directly, since those are
/// not dyn-compatible).
pub trait DynPolicyStore: Send + Sync + 'static {
    fn get_filtered_pdp_groups<'a>(&'a self, pdp_instance: &'a str) -> Pin<Box<dyn Future<Output = Result<Vec<GroupData>>> + Send + 'a>>;
    fn update_pdp_groups(&self, groups: Vec<GroupData>) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
    fn get_policy_list<'a>(&'a self, name: &'a str, version: &'a str) -> Pin<Box<dyn Future<Output = Result<Vec<ToscaPolicy>>> + Send + 'a>>;
    fn get_filtered_policy_list<'a>(&'a self, name_filter: &'a str) -> Pin<Box<dyn Future<Output = Result<Vec<ToscaPolicy>>> + Send + 'a>>;
}

impl<T: PolicyStoreDao> DynPolicyStore for T {
    fn get_filtered_pdp_groups<'a>(&'a self, pdp_instance: &'a str) -> Pin<Box<dyn Future<Output = Result<Vec<GroupData>>> + Send + 'a>> {
        Box::pin(PolicyStoreDao::get_filtered_pdp_groups(self, pdp_instance))
    }

    fn update_pdp_groups(&self, groups: Vec<GroupData>) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(PolicyStoreDao::update_pdp_groups(self, groups))
    }

    fn get_policy_list<'a>(&'a self, name: &'a str, version: &'a str) -> Pin<Box<dyn Future<Output = Result<Vec<ToscaPolicy>>> + Send + 'a>> {
        Box::pin(PolicyStoreDao::get_policy_list(self, name, version))
    }

    fn get_filtered_policy_list<'a>(&'a self, name_filter: &'a str) -> Pin<Box<dyn Future<Output = Result<Vec<ToscaPolicy>>> + Send + 'a>> {
        Box::pin(PolicyStoreDao::get_filtered_policy_list(self, name_filter))
    }
}
