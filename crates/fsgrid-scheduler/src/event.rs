//! Callbacks from the cluster manager, delivered to the scheduler loop
//! one at a time and in arrival order.

use fsgrid_core::{MasterInfo, Offer, TaskStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum ClusterEvent {
    /// First registration; the framework id is new or confirmed.
    Registered {
        framework_id: String,
        master: MasterInfo,
    },
    /// Re-registration after a master failover.
    Reregistered { master: MasterInfo },
    Offers(Vec<Offer>),
    OfferRescinded(String),
    Status(TaskStatus),
    FrameworkMessage {
        executor_id: String,
        slave_id: String,
        data: Vec<u8>,
    },
    SlaveLost(String),
    Disconnected,
    Error(String),
}
