//! Node entity and its lifecycle state machine.
//!
//! A node is one namenode or datanode the operator wants running. Its
//! `runtime` and `reservation` exist together or not at all: both are set
//! by [`Node::attach_runtime`] and cleared by [`Node::clear_runtime`].
//!
//! Transitions:
//! - `start`: Idle -> Starting
//! - `stop`: Starting/Running/Reconciling -> Stopping (Idle if nothing launched)
//! - task running: Starting/Running/Reconciling -> Running
//! - task stopped: Stopping -> Idle, anything else but Idle -> Starting

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use fsgrid_core::period::{Period, TimeUnit};
use fsgrid_core::{Constraint, TaskState};
use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};

pub const DEFAULT_CPUS: f64 = 0.5;
pub const DEFAULT_MEM: u64 = 512;
pub const DEFAULT_STICKINESS_PERIOD: Period = Period::new(10, TimeUnit::M);

pub const PORT_HTTP: &str = "http";
pub const PORT_IPC: &str = "ipc";
pub const PORT_DATA: &str = "data";

// ── Node type ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Namenode,
    Datanode,
}

/// Where a node learns the filesystem URI it binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsUriSource {
    /// Its own host and ipc port.
    Own,
    /// The namenode's external URI, or its host and ipc port.
    Namenode,
}

/// Per-type behaviour.
#[derive(Debug)]
pub struct TypeTable {
    pub ports: &'static [&'static str],
    pub fs_uri: FsUriSource,
}

const NAMENODE_TABLE: TypeTable = TypeTable {
    ports: &[PORT_HTTP, PORT_IPC],
    fs_uri: FsUriSource::Own,
};

const DATANODE_TABLE: TypeTable = TypeTable {
    ports: &[PORT_HTTP, PORT_IPC, PORT_DATA],
    fs_uri: FsUriSource::Namenode,
};

impl NodeType {
    pub fn table(self) -> &'static TypeTable {
        match self {
            NodeType::Namenode => &NAMENODE_TABLE,
            NodeType::Datanode => &DATANODE_TABLE,
        }
    }

    /// Logical port names a reservation for this type carries.
    pub fn port_names(self) -> &'static [&'static str] {
        self.table().ports
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Namenode => "namenode",
            NodeType::Datanode => "datanode",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "namenode" => Some(NodeType::Namenode),
            "datanode" => Some(NodeType::Datanode),
            _ => None,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Node state ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Idle,
    Starting,
    Running,
    Stopping,
    Reconciling,
}

impl NodeState {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeState::Idle => "idle",
            NodeState::Starting => "starting",
            NodeState::Running => "running",
            NodeState::Stopping => "stopping",
            NodeState::Reconciling => "reconciling",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Runtime & reservation ──────────────────────────────────────────

/// Facts recorded once a task for the node has been launched.
#[derive(Debug, Clone, PartialEq)]
pub struct Runtime {
    pub task_id: String,
    pub executor_id: String,
    pub slave_id: String,
    pub hostname: String,
    pub attributes: BTreeMap<String, String>,
    pub fs_uri: Option<String>,
    /// A kill has been sent for this task; never send another.
    pub kill_sent: bool,
}

/// Resources carved out of the accepted offer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reservation {
    pub cpus: f64,
    pub mem: u64,
    pub ports: BTreeMap<String, u32>,
}

impl Reservation {
    pub fn port(&self, name: &str) -> Option<u32> {
        self.ports.get(name).copied()
    }
}

// ── Stickiness ─────────────────────────────────────────────────────

/// Soft host affinity: for `period` after a clean stop, the node only
/// accepts offers from the host it last ran on.
#[derive(Debug, Clone, PartialEq)]
pub struct Stickiness {
    pub period: Period,
    pub(crate) hostname: Option<String>,
    pub(crate) stop_time: Option<u64>,
}

impl Default for Stickiness {
    fn default() -> Self {
        Self::new(DEFAULT_STICKINESS_PERIOD)
    }
}

impl Stickiness {
    pub fn new(period: Period) -> Self {
        Self {
            period,
            hostname: None,
            stop_time: None,
        }
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Epoch millis of the last clean stop.
    pub fn stop_time(&self) -> Option<u64> {
        self.stop_time
    }

    pub fn register_start(&mut self, hostname: &str) {
        self.hostname = Some(hostname.to_string());
        self.stop_time = None;
    }

    pub fn register_stop(&mut self, now: u64) {
        self.stop_time = Some(now);
    }

    pub fn allows_hostname(&self, hostname: &str, now: u64) -> bool {
        let (Some(sticky), Some(stopped)) = (&self.hostname, self.stop_time) else {
            return true;
        };
        if now.saturating_sub(stopped) >= self.period.ms() {
            return true;
        }
        sticky == hostname
    }
}

// ── Node ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub node_type: NodeType,
    pub state: NodeState,

    pub cpus: f64,
    pub mem: u64,
    pub constraints: BTreeMap<String, Constraint>,
    pub stickiness: Stickiness,

    pub executor_jvm_opts: Option<String>,
    pub hadoop_jvm_opts: Option<String>,
    pub core_site_opts: BTreeMap<String, String>,
    pub hdfs_site_opts: BTreeMap<String, String>,
    /// Namenode only: the filesystem is provided outside the cluster.
    pub external_fs_uri: Option<String>,

    pub(crate) runtime: Option<Runtime>,
    pub(crate) reservation: Option<Reservation>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
            state: NodeState::Idle,
            cpus: DEFAULT_CPUS,
            mem: DEFAULT_MEM,
            constraints: BTreeMap::new(),
            stickiness: Stickiness::default(),
            executor_jvm_opts: None,
            hadoop_jvm_opts: None,
            core_site_opts: BTreeMap::new(),
            hdfs_site_opts: BTreeMap::new(),
            external_fs_uri: None,
            runtime: None,
            reservation: None,
        }
    }

    pub fn runtime(&self) -> Option<&Runtime> {
        self.runtime.as_ref()
    }

    pub fn reservation(&self) -> Option<&Reservation> {
        self.reservation.as_ref()
    }

    pub fn task_id(&self) -> Option<&str> {
        self.runtime.as_ref().map(|r| r.task_id.as_str())
    }

    pub fn is_idle(&self) -> bool {
        self.state == NodeState::Idle
    }

    /// Externally provided namenode: never launched, always available.
    pub fn is_external(&self) -> bool {
        self.node_type == NodeType::Namenode && self.external_fs_uri.is_some()
    }

    /// Commit a launched task. Replaces any previous runtime.
    pub fn attach_runtime(&mut self, runtime: Runtime, reservation: Reservation) {
        self.stickiness.register_start(&runtime.hostname);
        self.runtime = Some(runtime);
        self.reservation = Some(reservation);
    }

    pub fn clear_runtime(&mut self) {
        self.runtime = None;
        self.reservation = None;
    }

    // ── Operator requests ──────────────────────────────────────────

    /// Idle -> Starting. Resources are committed later, on an offer.
    pub fn start(&mut self) -> StateResult<()> {
        if !self.is_idle() {
            return Err(StateError::NotIdle(self.id.clone()));
        }
        if self.is_external() {
            return Err(StateError::Invalid(format!(
                "node {} is external and cannot be started",
                self.id
            )));
        }
        self.state = NodeState::Starting;
        Ok(())
    }

    /// Move to Stopping, or straight to Idle when nothing was launched.
    /// The kill itself goes out through [`Node::take_kill`].
    pub fn stop(&mut self) -> StateResult<()> {
        if self.is_idle() {
            return Err(StateError::AlreadyIdle(self.id.clone()));
        }
        self.state = if self.runtime.is_some() {
            NodeState::Stopping
        } else {
            NodeState::Idle
        };
        Ok(())
    }

    /// Task id to kill, at most once per runtime, for a Stopping node.
    pub fn take_kill(&mut self) -> Option<String> {
        if self.state != NodeState::Stopping {
            return None;
        }
        let runtime = self.runtime.as_mut()?;
        if runtime.kill_sent {
            return None;
        }
        runtime.kill_sent = true;
        Some(runtime.task_id.clone())
    }

    // ── Task lifecycle ─────────────────────────────────────────────

    /// Apply a running status. Returns `false` when the node was not
    /// expecting one; the caller kills the task and the state is kept.
    pub fn on_task_started(&mut self) -> bool {
        match self.state {
            NodeState::Starting | NodeState::Running | NodeState::Reconciling => {
                self.state = NodeState::Running;
                true
            }
            NodeState::Idle | NodeState::Stopping => false,
        }
    }

    /// Apply a terminal status. Returns `false` when ignored (node Idle).
    ///
    /// A Stopping node goes Idle, anything else restarts. Only a clean
    /// stop of a Stopping node leaves a stickiness checkpoint.
    pub fn on_task_stopped(&mut self, state: TaskState, now: u64) -> bool {
        if self.is_idle() {
            return false;
        }

        let stopping = self.state == NodeState::Stopping;
        if stopping && state.is_clean_stop() {
            self.stickiness.register_stop(now);
        }

        self.clear_runtime();
        self.state = if stopping {
            NodeState::Idle
        } else {
            NodeState::Starting
        };
        true
    }

    /// Enter Reconciling if a task is believed live.
    pub fn begin_reconcile(&mut self) -> bool {
        if self.runtime.is_none() {
            return false;
        }
        self.state = NodeState::Reconciling;
        true
    }

    /// Give up on an unconfirmed task: drop it and place the node afresh.
    /// Returns the dropped task id.
    pub fn abandon_runtime(&mut self) -> Option<String> {
        let task_id = self.runtime.take().map(|r| r.task_id);
        self.reservation = None;
        self.state = NodeState::Starting;
        task_id
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Milliseconds since the Unix epoch.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
