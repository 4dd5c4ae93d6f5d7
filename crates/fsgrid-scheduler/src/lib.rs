//! fsgrid-scheduler: the scheduler side of the framework.
//!
//! Consumes [`ClusterEvent`]s from the cluster manager client and drives
//! the node registry:
//!
//! - Offers are matched against Starting nodes, first match wins
//! - Task statuses move nodes through their state machine
//! - After every (re)registration the [`Reconciler`] confirms live tasks
//!   before any new placement
//!
//! # Architecture
//!
//! ```text
//! ClusterEvent (mpsc) ──► Scheduler ──► SchedulerDriver (decline/launch/kill/reconcile)
//!                            │
//!                            ├── SharedRegistry (lock, mutate, commit per batch)
//!                            ├── fsgrid-placement (matches, init_runtime)
//!                            └── Reconciler
//! ```

pub mod driver;
pub mod error;
pub mod event;
pub mod reconciler;
pub mod scheduler;
pub mod task;
pub mod testing;

pub use driver::SchedulerDriver;
pub use error::{SchedulerError, SchedulerResult};
pub use event::ClusterEvent;
pub use reconciler::Reconciler;
pub use scheduler::Scheduler;
pub use task::{CommandInfo, CommandUri, ExecutorInfo, TaskInfo, TaskSettings, new_task};
pub use testing::TestDriver;
