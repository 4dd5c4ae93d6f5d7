//! fsgrid-mesos: Mesos v1 scheduler API client.
//!
//! Bridges the scheduler to a Mesos master over HTTP:
//!
//! - One SUBSCRIBE connection whose RecordIO stream becomes
//!   [`fsgrid_scheduler::ClusterEvent`]s
//! - [`MesosDriver`] implements [`fsgrid_scheduler::SchedulerDriver`] by
//!   queueing DECLINE, ACCEPT, KILL, RECONCILE and TEARDOWN calls
//! - Status updates carrying a uuid are acknowledged after delivery
//! - Broken subscriptions are retried with exponential backoff, following
//!   redirects to the leading master

pub mod client;
pub mod error;
pub mod recordio;
pub mod wire;

pub use client::{Endpoint, MesosClient, MesosConfig, MesosDriver};
pub use error::{MesosError, MesosResult};
pub use wire::{Call, FrameworkInfo};
