//! Serde model of the slice of the Nomad job API this provider uses.
//!
//! Field names follow Nomad's wire casing. Durations are integer
//! nanoseconds, as serialised by the upstream API. The model must survive a
//! `register` → `info` → `register` round trip unchanged, so unknown-value
//! maps use [`ConfigValue`] rather than lossy concrete types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A value inside a task's driver config: the API allows arbitrary shapes,
/// but this provider only ever produces or inspects these four.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    List(Vec<ConfigValue>),
    Map(BTreeMap<String, ConfigValue>),
}

// === impl ConfigValue ===

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<Vec<ConfigValue>> for ConfigValue {
    fn from(l: Vec<ConfigValue>) -> Self {
        Self::List(l)
    }
}

impl From<BTreeMap<String, ConfigValue>> for ConfigValue {
    fn from(m: BTreeMap<String, ConfigValue>) -> Self {
        Self::Map(m)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Job {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub region: String,
    #[serde(rename = "Type")]
    pub job_type: String,
    pub priority: i64,
    pub datacenters: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
    pub task_groups: Vec<TaskGroup>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<UpdateStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Constraint {
    pub l_target: String,
    pub operand: String,
    pub r_target: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TaskGroup {
    pub name: String,
    pub count: i64,
    pub tasks: Vec<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<RestartPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ephemeral_disk: Option<EphemeralDisk>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Task {
    pub name: String,
    pub driver: String,
    pub config: BTreeMap<String, ConfigValue>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<Service>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<Template>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault: Option<VaultStanza>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Resources {
    #[serde(rename = "CPU")]
    pub cpu: i64,
    #[serde(rename = "MemoryMB")]
    pub memory_mb: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<NetworkResource>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct NetworkResource {
    #[serde(rename = "MBits")]
    pub m_bits: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dynamic_ports: Vec<Port>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Port {
    pub label: String,
    pub value: i64,
}

/// Consul service registration attached to a task; this is what makes a
/// function discoverable by the resolver.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Service {
    pub name: String,
    pub port_label: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Template {
    pub embedded_tmpl: String,
    pub dest_path: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct VaultStanza {
    pub policies: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct RestartPolicy {
    pub attempts: i64,
    /// Nanoseconds.
    pub delay: u64,
    pub mode: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct UpdateStrategy {
    /// Nanoseconds.
    pub stagger: u64,
    /// Nanoseconds.
    pub min_healthy_time: u64,
    /// Nanoseconds.
    pub healthy_deadline: u64,
    pub auto_revert: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct EphemeralDisk {
    #[serde(rename = "SizeMB")]
    pub size_mb: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct JobListStub {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub status: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct AllocationListStub {
    #[serde(rename = "ID")]
    pub id: String,
    pub task_states: BTreeMap<String, TaskState>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TaskState {
    pub state: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct JobRegisterResponse {
    #[serde(rename = "EvalID")]
    pub eval_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub warnings: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_values_round_trip_untagged() {
        let mut config = BTreeMap::new();
        config.insert("image".to_string(), ConfigValue::from("img:1"));
        config.insert(
            "port_map".to_string(),
            ConfigValue::from(vec![ConfigValue::Map(
                Some(("http".to_string(), ConfigValue::from(8080)))
                    .into_iter()
                    .collect(),
            )]),
        );

        let json = serde_json::to_string(&config).unwrap();
        let decoded: BTreeMap<String, ConfigValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, config);
        assert_eq!(decoded["image"].as_str(), Some("img:1"));

        let ports = decoded["port_map"].as_list().unwrap();
        assert_eq!(ports[0].as_map().unwrap()["http"].as_int(), Some(8080));
    }

    #[test]
    fn job_uses_nomad_wire_casing() {
        let job = Job {
            id: "OpenFaaS-hello".to_string(),
            name: "OpenFaaS-hello".to_string(),
            job_type: "service".to_string(),
            task_groups: vec![TaskGroup {
                name: "hello".to_string(),
                count: 1,
                ..TaskGroup::default()
            }],
            ..Job::default()
        };

        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("\"ID\":\"OpenFaaS-hello\""));
        assert!(json.contains("\"Type\":\"service\""));
        assert!(json.contains("\"TaskGroups\""));
        assert!(json.contains("\"Count\":1"));
    }
}
