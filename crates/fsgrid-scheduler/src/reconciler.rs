//! Reconciler: confirms in-flight tasks after (re)registration.
//!
//! - `start` marks every node with a task Reconciling and asks the
//!   cluster manager about all tasks at once
//! - `proceed`, once per `delay`, asks again about each task still
//!   unconfirmed, up to `max_tries` rounds
//! - when the rounds run out, unconfirmed tasks are killed and their
//!   nodes placed afresh
//!
//! Offers are declined while any node is Reconciling.

use fsgrid_core::{Period, TaskState, TaskStatus};
use fsgrid_state::{NodeState, Registry};
use tracing::{info, warn};

use crate::driver::SchedulerDriver;

#[derive(Debug, Clone)]
pub struct Reconciler {
    delay_ms: u64,
    max_tries: u32,
    tries: u32,
    last_try: Option<u64>,
}

impl Reconciler {
    pub fn new(delay: Period, max_tries: u32) -> Self {
        Self {
            delay_ms: delay.ms(),
            max_tries,
            tries: 0,
            last_try: None,
        }
    }

    pub fn tries(&self) -> u32 {
        self.tries
    }

    pub fn is_started(&self) -> bool {
        self.last_try.is_some()
    }

    /// True while any node awaits confirmation.
    pub fn is_active(registry: &Registry) -> bool {
        registry.nodes_in_state(NodeState::Reconciling).next().is_some()
    }

    pub fn start(&mut self, registry: &mut Registry, driver: &dyn SchedulerDriver, now: u64) {
        self.tries = 1;
        self.last_try = Some(now);

        let mut count = 0;
        for node in registry.nodes_mut() {
            if node.begin_reconcile() {
                count += 1;
            }
        }

        info!(nodes = count, "reconciliation started");
        driver.reconcile_tasks(&[]);
    }

    /// Run the next round if one is due. Returns whether anything changed.
    pub fn proceed(&mut self, registry: &mut Registry, driver: &dyn SchedulerDriver, now: u64) -> bool {
        let Some(last_try) = self.last_try else {
            return false;
        };
        if now.saturating_sub(last_try) < self.delay_ms {
            return false;
        }
        if !Self::is_active(registry) {
            self.reset();
            info!("reconciliation finished");
            return false;
        }

        self.last_try = Some(now);

        if self.tries > self.max_tries {
            for node in registry.nodes_mut() {
                if node.state != NodeState::Reconciling {
                    continue;
                }
                if let Some(task_id) = node.abandon_runtime() {
                    warn!(node = %node.id, task = %task_id, "reconciliation exhausted, killing task");
                    driver.kill_task(&task_id);
                }
            }
            self.reset();
            return true;
        }

        self.tries += 1;
        let statuses: Vec<TaskStatus> = registry
            .nodes_in_state(NodeState::Reconciling)
            .filter_map(|node| {
                let runtime = node.runtime()?;
                let mut status = TaskStatus::new(runtime.task_id.clone(), TaskState::Running);
                status.slave_id = Some(runtime.slave_id.clone());
                Some(status)
            })
            .collect();

        info!(
            attempt = self.tries,
            max = self.max_tries,
            tasks = statuses.len(),
            "reconciling tasks"
        );
        for status in &statuses {
            driver.reconcile_tasks(std::slice::from_ref(status));
        }
        false
    }

    fn reset(&mut self) {
        self.tries = 0;
        self.last_try = None;
    }
}
