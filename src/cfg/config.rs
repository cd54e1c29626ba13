// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Heartbeat timing and missed-heartbeat threshold.
    pub heartbeat: HeartbeatConfig,
    /// Retry/timeout policy for UPDATE requests.
    pub update_parameters: RequestParameters,
    /// Retry/timeout policy for STATE-CHANGE requests.
    pub state_change_parameters: RequestParameters,
    /// Outbound/inbound bus topic configuration.
    pub topic: TopicConfig,
}

/// Heartbeat cadence and the multiplier used to derive the missed-heartbeat
/// deadline (`MAX_MISSED_HEARTBEATS * heartBeatMs`).
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct HeartbeatConfig {
    #[serde(rename = "heartBeatMs", with = "serde_millis")]
    /// Base heartbeat interval PDPs are expected to honor.
    pub heart_beat_ms: Duration,

    #[serde(default = "default_max_missed_heartbeats", rename = "maxMissedHeartbeats")]
    /// Number of consecutive missed intervals tolerated before a PDP is
    /// considered silent.
    pub max_missed_heartbeats: u32,
}

impl HeartbeatConfig {
    /// Absolute wall-clock deadline since the last heartbeat before a PDP is
    /// declared silent.
    pub fn missed_heartbeat_deadline(&self) -> Duration {
        self.heart_beat_ms * self.max_missed_heartbeats
    }
}

fn default_max_missed_heartbeats() -> u32 {
    3
}

/// Per-request-kind retry/timeout policy (§6: `updateParameters`,
/// `stateChangeParameters`).
#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
pub struct RequestParameters {
    #[serde(rename = "maxWaitMs", with = "serde_millis")]
    /// Time to wait for a matching response before treating the request as
    /// timed out.
    pub max_wait: Duration,

    #[serde(rename = "maxRetryCount")]
    /// Maximum number of retries after the initial send.
    pub max_retry_count: u32,
}

/// Endpoint properties for the shared request/response topic.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TopicConfig {
    #[serde(rename = "policy-pdp-pap")]
    /// Name of the bus topic both requests and responses travel on.
    pub policy_pdp_pap: String,
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates invariants that the wire format cannot express.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.heartbeat.heart_beat_ms.is_zero(),
            "heartBeatMs must be >= 1"
        );
        ensure!(
            self.heartbeat.max_missed_heartbeats >= 1,
            "maxMissedHeartbeats must be >= 1"
        );
        ensure!(
            !self.update_parameters.max_wait.is_zero(),
            "updateParameters.maxWaitMs must be >= 1"
        );
        ensure!(
            !self.state_change_parameters.max_wait.is_zero(),
            "stateChangeParameters.maxWaitMs must be >= 1"
        );
        ensure!(
            !self.topic.policy_pdp_pap.is_empty(),
            "topic.policy-pdp-pap must not be empty"
        );
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            heartbeat: HeartbeatConfig {
                heart_beat_ms: Duration::from_millis(6000),
                max_missed_heartbeats: 3,
            },
            update_parameters: RequestParameters {
                max_wait: Duration::from_millis(20_000),
                max_retry_count: 1,
            },
            state_change_parameters: RequestParameters {
                max_wait: Duration::from_millis(20_000),
                max_retry_count: 1,
            },
            topic: TopicConfig {
                policy_pdp_pap: "POLICY-PDP-PAP".to_string(),
            },
        }
    }
}

/// Serde helper for representing `Duration` as a number of milliseconds.
mod serde_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config::default()
    }

    #[test]
    fn missed_heartbeat_deadline_multiplies() {
        let cfg = sample();
        assert_eq!(
            cfg.heartbeat.missed_heartbeat_deadline(),
            Duration::from_millis(18_000)
        );
    }

    #[test]
    fn load_from_yaml_round_trips() {
        let yaml = r#"
heartbeat:
  heartBeatMs: 1000
  maxMissedHeartbeats: 3
update_parameters:
  maxWaitMs: 5000
  maxRetryCount: 2
state_change_parameters:
  maxWaitMs: 5000
  maxRetryCount: 2
topic:
  policy-pdp-pap: POLICY-PDP-PAP
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.heartbeat.max_missed_heartbeats, 3);
        assert_eq!(cfg.update_parameters.max_retry_count, 2);
    }

    #[test]
    fn rejects_zero_heartbeat() {
        let mut cfg = sample();
        cfg.heartbeat.heart_beat_ms = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }
}
