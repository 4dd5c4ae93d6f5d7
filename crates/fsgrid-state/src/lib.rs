//! fsgrid-state: node registry, lifecycle state machine and persistence.
//!
//! # Architecture
//!
//! [`Registry`] is the ordered collection of [`Node`]s plus the framework
//! id. It is persisted through a [`Storage`] backend as a versioned schema
//! ([`schema`]) decoupled from the in-memory types. At runtime it lives in
//! a [`SharedRegistry`], the one critical section shared by the scheduler
//! loop and the management API.

pub mod error;
pub mod node;
pub mod registry;
pub mod schema;
pub mod shared;
pub mod storage;
pub mod tables;

pub use error::{StateError, StateResult};
pub use node::{
    FsUriSource, Node, NodeState, NodeType, Reservation, Runtime, Stickiness, epoch_millis,
};
pub use registry::Registry;
pub use shared::SharedRegistry;
pub use storage::{FileStorage, RedbStorage, Storage};
