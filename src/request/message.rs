//! The tagged-enum subtype model for outbound messages (§9 Polymorphism):
//! `UpdateReq`/`StateChangeReq` differ only in priority, response validation,
//! and `isSameContent`; everything else lives on the shared `Request` struct
//! in `mod.rs`.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use enum_dispatch::enum_dispatch;
use serde_json::Value;

use crate::messages::{
    MessageName, PdpStateChange, PdpStatus, PdpUpdate,
    policy::{identifier_set, reported_identifier_set, same_policy_set},
};

/// Per-subtype behavior, dispatched through the `RequestMessage` enum via
/// `enum_dispatch` the way the reference crate dispatches per-PDU behavior.
#[enum_dispatch]
pub trait RequestSubtype {
    /// STATE-CHANGE = 0, UPDATE = 1; lower runs first (§3).
    fn priority(&self) -> u8;
    fn request_id(&self) -> &str;
    fn target_name(&self) -> Option<&str>;
    fn message_name(&self) -> MessageName;
    /// §4.E response validation rules. `Err` carries the human-readable
    /// mismatch reason passed to `listener.failure`.
    fn validate_response(&self, status: &PdpStatus) -> Result<(), String>;
    /// §4.E `isSameContent`.
    fn is_same_content(&self, other: &RequestMessage) -> bool;
    /// Wire envelope: the message's own JSON plus the `messageName`
    /// discriminator (§6).
    fn to_envelope(&self) -> Value;
}

#[enum_dispatch(RequestSubtype)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestMessage {
    Update(PdpUpdate),
    StateChange(PdpStateChange),
}

impl RequestMessage {
    pub fn kind_name(&self) -> &'static str {
        match self {
            RequestMessage::Update(_) => "UpdateReq",
            RequestMessage::StateChange(_) => "StateChangeReq",
        }
    }
}

/// Common base rule shared by both subtypes (§4.E): a response with no `name`
/// fails outright; a targeted outgoing message additionally requires the
/// response name to match it. A broadcast outgoing message (`name = null`)
/// accepts any response name.
fn validate_common(outgoing_name: Option<&str>, status: &PdpStatus) -> Result<(), String> {
    let response_name = status.name.as_deref().ok_or_else(|| "null PDP name".to_string())?;
    if let Some(expected) = outgoing_name
        && expected != response_name
    {
        return Err("PDP name does not match".to_string());
    }
    Ok(())
}

fn envelope_with_discriminator(message: &impl serde::Serialize, message_name: MessageName) -> Value {
    let mut v = serde_json::to_value(message).expect("outbound message always serializes");
    v["messageName"] = Value::from(message_name.as_str());
    v
}

impl RequestSubtype for PdpUpdate {
    fn priority(&self) -> u8 {
        1
    }

    fn request_id(&self) -> &str {
        &self.request_id
    }

    fn target_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn message_name(&self) -> MessageName {
        MessageName::PdpUpdate
    }

    fn validate_response(&self, status: &PdpStatus) -> Result<(), String> {
        validate_common(self.name.as_deref(), status)?;
        if self.pdp_group != status.pdp_group {
            return Err("group does not match".to_string());
        }
        if self.pdp_subgroup != status.pdp_subgroup {
            return Err("subgroup does not match".to_string());
        }
        if identifier_set(&self.policies) != reported_identifier_set(&status.policies) {
            return Err("policies do not match".to_string());
        }
        Ok(())
    }

    fn is_same_content(&self, other: &RequestMessage) -> bool {
        match other {
            RequestMessage::Update(o) => {
                self.pdp_group == o.pdp_group
                    && self.pdp_subgroup == o.pdp_subgroup
                    && same_policy_set(&self.policies, &o.policies)
            },
            RequestMessage::StateChange(_) => false,
        }
    }

    fn to_envelope(&self) -> Value {
        envelope_with_discriminator(self, self.message_name())
    }
}

impl RequestSubtype for PdpStateChange {
    fn priority(&self) -> u8 {
        0
    }

    fn request_id(&self) -> &str {
        &self.request_id
    }

    fn target_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn message_name(&self) -> MessageName {
        MessageName::PdpStateChange
    }

    fn validate_response(&self, status: &PdpStatus) -> Result<(), String> {
        validate_common(self.name.as_deref(), status)?;
        if status.state != self.state {
            return Err(format!("state is {}, but expected {}", status.state, self.state));
        }
        Ok(())
    }

    fn is_same_content(&self, other: &RequestMessage) -> bool {
        match other {
            RequestMessage::StateChange(o) => self.state == o.state,
            RequestMessage::Update(_) => false,
        }
    }

    fn to_envelope(&self) -> Value {
        envelope_with_discriminator(self, self.message_name())
    }
}
