//! Admission predicate: can this node run on this offer?
//!
//! [`matches`] returns the reason an offer is rejected, or `None`. It
//! never fails and never mutates; a rejected offer is the normal case.

use std::collections::BTreeMap;

use fsgrid_core::Offer;
use fsgrid_state::{Node, NodeState, NodeType, Registry};

use crate::reserve::reserve;

/// What the namenode looks like to a datanode being placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamenodeStatus {
    External,
    Running,
    NotRunning,
}

/// The parts of the registry admission depends on, besides the node.
#[derive(Debug, Clone, Default)]
pub struct ClusterView {
    pub namenode: Option<NamenodeStatus>,
    /// Placement attributes (including `hostname`) of sibling nodes of
    /// the same type that currently have a task.
    pub siblings: Vec<BTreeMap<String, String>>,
}

impl ClusterView {
    pub fn of(registry: &Registry, node: &Node) -> Self {
        let namenode = registry.namenode().map(|nn| {
            if nn.is_external() {
                NamenodeStatus::External
            } else if nn.state == NodeState::Running {
                NamenodeStatus::Running
            } else {
                NamenodeStatus::NotRunning
            }
        });

        let siblings = registry
            .nodes_of_type(node.node_type)
            .filter(|other| other.id != node.id)
            .filter_map(|other| other.runtime())
            .map(|runtime| {
                let mut attributes = runtime.attributes.clone();
                attributes.insert("hostname".to_string(), runtime.hostname.clone());
                attributes
            })
            .collect();

        Self { namenode, siblings }
    }

    fn sibling_values(&self, name: &str) -> Vec<String> {
        self.siblings
            .iter()
            .filter_map(|attributes| attributes.get(name).cloned())
            .collect()
    }
}

/// Check, in order: resources, namenode availability (datanodes),
/// placement constraints, stickiness. The first failure is returned.
pub fn matches(node: &Node, offer: &Offer, view: &ClusterView, now: u64) -> Option<String> {
    let reservation = reserve(node, offer);
    if reservation.cpus < node.cpus {
        return Some(format!("cpus < {}", node.cpus));
    }
    if reservation.mem < node.mem {
        return Some(format!("mem < {}", node.mem));
    }

    if node.node_type == NodeType::Datanode {
        match view.namenode {
            None => return Some("no namenode".to_string()),
            Some(NamenodeStatus::NotRunning) => {
                return Some("no running or external namenode".to_string());
            }
            Some(NamenodeStatus::External | NamenodeStatus::Running) => {}
        }
    }

    let attributes = offer.attribute_map();
    for (name, constraint) in &node.constraints {
        let Some(value) = attributes.get(name) else {
            return Some(format!("no {name}"));
        };
        if !constraint.matches(value, &view.sibling_values(name)) {
            return Some(format!("{name} doesn't match {constraint}"));
        }
    }

    if !node.stickiness.allows_hostname(&offer.hostname, now) {
        return Some("hostname != stickiness host".to_string());
    }

    None
}
