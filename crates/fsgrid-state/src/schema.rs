//! Versioned on-disk and wire schema for the registry.
//!
//! ```json
//! {"version": 1, "frameworkId": "...", "nodes": [{"id": "nn", "type": "namenode", ...}]}
//! ```
//!
//! Records are decoupled from the in-memory types. Decoding validates
//! what the in-memory types guarantee: a runtime comes with a
//! reservation, ids are unique, there is at most one namenode.

use std::collections::BTreeMap;

use fsgrid_core::{Constraint, Period};
use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};
use crate::node::{Node, NodeState, NodeType, Reservation, Runtime, Stickiness};
use crate::registry::Registry;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryDoc {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub state: NodeState,
    pub cpus: f64,
    pub mem: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub constraints: BTreeMap<String, Constraint>,
    pub stickiness: StickinessRecord,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_jvm_opts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hadoop_jvm_opts: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub core_site_opts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hdfs_site_opts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_fs_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation: Option<ReservationRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickinessRecord {
    pub period: Period,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeRecord {
    pub task_id: String,
    pub executor_id: String,
    pub slave_id: String,
    pub hostname: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_uri: Option<String>,
    #[serde(default)]
    pub kill_sent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub cpus: f64,
    pub mem: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ports: BTreeMap<String, u32>,
}

// ── Encode ─────────────────────────────────────────────────────────

impl From<&Node> for NodeRecord {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            node_type: node.node_type,
            state: node.state,
            cpus: node.cpus,
            mem: node.mem,
            constraints: node.constraints.clone(),
            stickiness: StickinessRecord {
                period: node.stickiness.period,
                hostname: node.stickiness.hostname.clone(),
                stop_time: node.stickiness.stop_time,
            },
            executor_jvm_opts: node.executor_jvm_opts.clone(),
            hadoop_jvm_opts: node.hadoop_jvm_opts.clone(),
            core_site_opts: node.core_site_opts.clone(),
            hdfs_site_opts: node.hdfs_site_opts.clone(),
            external_fs_uri: node.external_fs_uri.clone(),
            runtime: node.runtime.as_ref().map(|r| RuntimeRecord {
                task_id: r.task_id.clone(),
                executor_id: r.executor_id.clone(),
                slave_id: r.slave_id.clone(),
                hostname: r.hostname.clone(),
                attributes: r.attributes.clone(),
                fs_uri: r.fs_uri.clone(),
                kill_sent: r.kill_sent,
            }),
            reservation: node.reservation.as_ref().map(|r| ReservationRecord {
                cpus: r.cpus,
                mem: r.mem,
                ports: r.ports.clone(),
            }),
        }
    }
}

impl From<&Registry> for RegistryDoc {
    fn from(registry: &Registry) -> Self {
        Self {
            version: SCHEMA_VERSION,
            framework_id: registry.framework_id().map(str::to_string),
            nodes: registry.nodes().iter().map(NodeRecord::from).collect(),
        }
    }
}

// ── Decode ─────────────────────────────────────────────────────────

impl TryFrom<NodeRecord> for Node {
    type Error = StateError;

    fn try_from(record: NodeRecord) -> StateResult<Self> {
        if record.runtime.is_some() != record.reservation.is_some() {
            return Err(StateError::Corrupt(format!(
                "node {}: runtime and reservation must be set together",
                record.id
            )));
        }

        let mut stickiness = Stickiness::new(record.stickiness.period);
        stickiness.hostname = record.stickiness.hostname;
        stickiness.stop_time = record.stickiness.stop_time;

        let mut node = Node::new(record.id, record.node_type);
        node.state = record.state;
        node.cpus = record.cpus;
        node.mem = record.mem;
        node.constraints = record.constraints;
        node.stickiness = stickiness;
        node.executor_jvm_opts = record.executor_jvm_opts;
        node.hadoop_jvm_opts = record.hadoop_jvm_opts;
        node.core_site_opts = record.core_site_opts;
        node.hdfs_site_opts = record.hdfs_site_opts;
        node.external_fs_uri = record.external_fs_uri;

        node.runtime = record.runtime.map(|r| Runtime {
            task_id: r.task_id,
            executor_id: r.executor_id,
            slave_id: r.slave_id,
            hostname: r.hostname,
            attributes: r.attributes,
            fs_uri: r.fs_uri,
            kill_sent: r.kill_sent,
        });
        node.reservation = record.reservation.map(|r| Reservation {
            cpus: r.cpus,
            mem: r.mem,
            ports: r.ports,
        });

        Ok(node)
    }
}

impl RegistryDoc {
    pub fn into_registry(self) -> StateResult<Registry> {
        if self.version != SCHEMA_VERSION {
            return Err(StateError::SchemaVersion(self.version));
        }

        let nodes = self
            .nodes
            .into_iter()
            .map(Node::try_from)
            .collect::<StateResult<Vec<_>>>()?;

        Registry::from_parts(self.framework_id, nodes).map_err(|e| StateError::Corrupt(e.to_string()))
    }
}

/// Serialize a registry to schema JSON.
pub fn encode(registry: &Registry) -> StateResult<Vec<u8>> {
    serde_json::to_vec_pretty(&RegistryDoc::from(registry))
        .map_err(|e| StateError::Serialize(e.to_string()))
}

/// Parse and validate schema JSON.
pub fn decode(bytes: &[u8]) -> StateResult<Registry> {
    let doc: RegistryDoc =
        serde_json::from_slice(bytes).map_err(|e| StateError::Deserialize(e.to_string()))?;
    doc.into_registry()
}
