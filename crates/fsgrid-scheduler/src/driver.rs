//! The calls the scheduler makes into the cluster manager.
//!
//! Every call is fire-and-forget: delivery failures surface later as
//! task statuses or through reconciliation.

use fsgrid_core::TaskStatus;

use crate::task::TaskInfo;

pub trait SchedulerDriver: Send + Sync {
    fn decline_offer(&self, offer_id: &str);

    /// Accept `offer_id` by launching `task` on it.
    fn launch_task(&self, offer_id: &str, task: TaskInfo);

    fn kill_task(&self, task_id: &str);

    /// Ask for the current state of `tasks`. An empty slice asks for
    /// every task the cluster manager knows of this framework.
    fn reconcile_tasks(&self, tasks: &[TaskStatus]);

    /// Stop the framework and disconnect.
    fn stop(&self);
}
