//! Recording driver for tests.

use std::sync::Mutex;

use fsgrid_core::TaskStatus;

use crate::driver::SchedulerDriver;
use crate::task::TaskInfo;

#[derive(Debug, Default)]
struct Recorded {
    declined_offers: Vec<String>,
    accepted_offers: Vec<String>,
    launched_tasks: Vec<TaskInfo>,
    killed_tasks: Vec<String>,
    reconciled_tasks: Vec<String>,
    reconcile_calls: usize,
    stopped: bool,
}

/// A [`SchedulerDriver`] that only records what it was asked to do.
#[derive(Debug, Default)]
pub struct TestDriver {
    recorded: Mutex<Recorded>,
}

impl TestDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Recorded) -> T) -> T {
        let mut recorded = match self.recorded.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut recorded)
    }

    pub fn declined_offers(&self) -> Vec<String> {
        self.with(|r| r.declined_offers.clone())
    }

    pub fn accepted_offers(&self) -> Vec<String> {
        self.with(|r| r.accepted_offers.clone())
    }

    pub fn launched_tasks(&self) -> Vec<TaskInfo> {
        self.with(|r| r.launched_tasks.clone())
    }

    pub fn killed_tasks(&self) -> Vec<String> {
        self.with(|r| r.killed_tasks.clone())
    }

    /// Reconciled task ids; a reconcile-everything call records `""`.
    pub fn reconciled_tasks(&self) -> Vec<String> {
        self.with(|r| r.reconciled_tasks.clone())
    }

    /// Number of `reconcile_tasks` calls.
    pub fn reconcile_calls(&self) -> usize {
        self.with(|r| r.reconcile_calls)
    }

    pub fn is_stopped(&self) -> bool {
        self.with(|r| r.stopped)
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.with(|r| *r = Recorded::default());
    }
}

impl SchedulerDriver for TestDriver {
    fn decline_offer(&self, offer_id: &str) {
        self.with(|r| r.declined_offers.push(offer_id.to_string()));
    }

    fn launch_task(&self, offer_id: &str, task: TaskInfo) {
        self.with(|r| {
            r.accepted_offers.push(offer_id.to_string());
            r.launched_tasks.push(task);
        });
    }

    fn kill_task(&self, task_id: &str) {
        self.with(|r| r.killed_tasks.push(task_id.to_string()));
    }

    fn reconcile_tasks(&self, tasks: &[TaskStatus]) {
        self.with(|r| {
            r.reconcile_calls += 1;
            if tasks.is_empty() {
                r.reconciled_tasks.push(String::new());
            } else {
                r.reconciled_tasks
                    .extend(tasks.iter().map(|t| t.task_id.clone()));
            }
        });
    }

    fn stop(&self) {
        self.with(|r| r.stopped = true);
    }
}
