//! Committing a placement: the one place a match changes the registry.

use fsgrid_core::Offer;
use fsgrid_state::node::PORT_IPC;
use fsgrid_state::{FsUriSource, Node, Registry, Reservation, Runtime};
use tracing::debug;
use uuid::Uuid;

use crate::error::{PlacementError, PlacementResult};
use crate::reserve::reserve;

/// Reserve resources from `offer` for `node_id` and attach a fresh
/// runtime. Nothing is changed if the filesystem URI cannot be derived.
pub fn init_runtime(registry: &mut Registry, node_id: &str, offer: &Offer) -> PlacementResult<()> {
    let node = registry.require(node_id)?;
    let reservation = reserve(node, offer);
    let fs_uri = fs_uri(registry, node, &offer.hostname, &reservation)?;

    let runtime = Runtime {
        task_id: Uuid::new_v4().to_string(),
        executor_id: Uuid::new_v4().to_string(),
        slave_id: offer.slave_id.clone(),
        hostname: offer.hostname.clone(),
        attributes: offer
            .attributes
            .iter()
            .map(|a| (a.name.clone(), a.value.clone()))
            .collect(),
        fs_uri: Some(fs_uri),
        kill_sent: false,
    };

    debug!(node = node_id, task = %runtime.task_id, host = %runtime.hostname, "runtime initialised");
    registry
        .require_mut(node_id)?
        .attach_runtime(runtime, reservation);
    Ok(())
}

/// Filesystem URI the node binds to, once placed on `hostname` with
/// `reservation`.
pub fn fs_uri(
    registry: &Registry,
    node: &Node,
    hostname: &str,
    reservation: &Reservation,
) -> PlacementResult<String> {
    match node.node_type.table().fs_uri {
        FsUriSource::Own => {
            let port = reservation.port(PORT_IPC).ok_or(PlacementError::NoIpcPort)?;
            Ok(format!("hdfs://{hostname}:{port}"))
        }
        FsUriSource::Namenode => {
            let namenode = registry.namenode().ok_or(PlacementError::NoNamenode)?;
            if let Some(uri) = &namenode.external_fs_uri {
                return Ok(uri.clone());
            }

            let runtime = namenode.runtime().ok_or(PlacementError::NamenodeNotStarted)?;
            let port = namenode
                .reservation()
                .and_then(|r| r.port(PORT_IPC))
                .ok_or(PlacementError::NoIpcPort)?;
            Ok(format!("hdfs://{}:{port}", runtime.hostname))
        }
    }
}
