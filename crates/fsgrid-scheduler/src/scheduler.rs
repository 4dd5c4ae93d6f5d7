//! Scheduler: turns cluster events into node placements.
//!
//! The `Scheduler` is the single consumer of [`ClusterEvent`]s. It:
//! - Gates registration on the master version and starts reconciliation
//! - Matches offers against Starting nodes and launches their tasks
//! - Applies task statuses to the node state machine
//! - Sends kills for Stopping nodes, at most once per task
//!
//! Every event is handled under the registry lock and committed as one
//! batch before the next event is looked at.

use std::sync::Arc;
use std::time::Duration;

use fsgrid_core::{MasterInfo, Offer, StatusKind, TaskState, TaskStatus};
use fsgrid_placement::{ClusterView, init_runtime, matches};
use fsgrid_state::{Node, NodeState, Registry, SharedRegistry, epoch_millis};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::driver::SchedulerDriver;
use crate::error::{SchedulerError, SchedulerResult};
use crate::event::ClusterEvent;
use crate::reconciler::Reconciler;
use crate::task::{TaskInfo, TaskSettings, new_task};

/// How often reconciliation and pending kills are looked at between events.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

const RECONCILING: &str = "reconciling";
const NOTHING_TO_START: &str = "nothing to start";

pub struct Scheduler {
    registry: SharedRegistry,
    driver: Arc<dyn SchedulerDriver>,
    reconciler: Reconciler,
    settings: TaskSettings,
}

impl Scheduler {
    pub fn new(
        registry: SharedRegistry,
        driver: Arc<dyn SchedulerDriver>,
        reconciler: Reconciler,
        settings: TaskSettings,
    ) -> Self {
        Self {
            registry,
            driver,
            reconciler,
            settings,
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Handle one event at the current wall-clock time.
    pub async fn handle(&mut self, event: ClusterEvent) -> SchedulerResult<()> {
        self.handle_at(event, epoch_millis()).await
    }

    pub async fn handle_at(&mut self, event: ClusterEvent, now: u64) -> SchedulerResult<()> {
        let registry = self.registry.clone();
        let mut guard = registry.lock().await;

        match event {
            ClusterEvent::Registered {
                framework_id,
                master,
            } => {
                info!(framework = %framework_id, %master, "registered");
                guard.set_framework_id(Some(framework_id));
                registry.commit(&guard)?;
                self.on_connected(&mut guard, &master, now)?;
            }
            ClusterEvent::Reregistered { master } => {
                info!(%master, "reregistered");
                self.on_connected(&mut guard, &master, now)?;
            }
            ClusterEvent::Offers(offers) => {
                self.on_offers(&mut guard, &offers, now);
            }
            ClusterEvent::OfferRescinded(offer_id) => {
                info!(offer = %offer_id, "offer rescinded");
                return Ok(());
            }
            ClusterEvent::Status(status) => {
                self.on_status(&mut guard, &status, now);
            }
            ClusterEvent::FrameworkMessage {
                executor_id,
                slave_id,
                data,
            } => {
                info!(
                    executor = %executor_id,
                    slave = %slave_id,
                    data = %String::from_utf8_lossy(&data),
                    "framework message"
                );
                return Ok(());
            }
            ClusterEvent::SlaveLost(slave_id) => {
                info!(slave = %slave_id, "slave lost");
                return Ok(());
            }
            ClusterEvent::Disconnected => {
                warn!("disconnected from master");
                return Ok(());
            }
            ClusterEvent::Error(message) => {
                error!(%message, "cluster manager error");
                return Ok(());
            }
        }

        registry.commit(&guard)?;
        Ok(())
    }

    /// Periodic work between events: reconciliation rounds and kills for
    /// nodes stopped through the management API.
    pub async fn tick(&mut self) -> SchedulerResult<()> {
        self.tick_at(epoch_millis()).await
    }

    pub async fn tick_at(&mut self, now: u64) -> SchedulerResult<()> {
        let registry = self.registry.clone();
        let mut guard = registry.lock().await;

        let mut changed = self.reconciler.proceed(&mut guard, self.driver.as_ref(), now);
        changed |= self.stop_nodes(&mut guard);

        if changed {
            registry.commit(&guard)?;
        }
        Ok(())
    }

    /// Consume events until the channel closes or `shutdown` flips.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<ClusterEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> SchedulerResult<()> {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!("scheduler loop started");
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        info!("event stream closed, scheduler loop exiting");
                        return Err(SchedulerError::Disconnected);
                    };
                    self.handle(event).await?;
                }
                _ = ticker.tick() => {
                    self.tick().await?;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler loop shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }

    // ── Registration ────────────────────────────────────────────────

    fn on_connected(
        &mut self,
        registry: &mut Registry,
        master: &MasterInfo,
        now: u64,
    ) -> SchedulerResult<()> {
        if let Err(e) = fsgrid_core::version::check_master_version(master.version.as_deref()) {
            error!(%master, error = %e, "unsupported master, stopping");
            self.driver.stop();
            return Err(SchedulerError::UnsupportedVersion(e.to_string()));
        }

        self.reconciler.start(registry, self.driver.as_ref(), now);
        Ok(())
    }

    // ── Offers ──────────────────────────────────────────────────────

    fn on_offers(&mut self, registry: &mut Registry, offers: &[Offer], now: u64) {
        for offer in offers {
            if let Some(reason) = self.accept_offer(registry, offer, now) {
                debug!(offer = %offer.id, host = %offer.hostname, %reason, "declined offer");
                self.driver.decline_offer(&offer.id);
            }
        }

        self.stop_nodes(registry);
    }

    /// Launch at most one node on `offer`. Returns the decline reason when
    /// nothing was launched.
    fn accept_offer(&self, registry: &mut Registry, offer: &Offer, now: u64) -> Option<String> {
        if Reconciler::is_active(registry) {
            return Some(RECONCILING.to_string());
        }

        let candidates: Vec<String> = registry
            .nodes_in_state(NodeState::Starting)
            .filter(|n| n.runtime().is_none())
            .map(|n| n.id.clone())
            .collect();
        if candidates.is_empty() {
            return Some(NOTHING_TO_START.to_string());
        }

        let mut reasons = Vec::new();
        for id in candidates {
            let reason = match registry.node(&id) {
                Some(node) => matches(node, offer, &ClusterView::of(registry, node), now),
                None => continue,
            };
            if let Some(reason) = reason {
                reasons.push(format!("node {id}: {reason}"));
                continue;
            }

            match self.launch(registry, &id, offer) {
                Ok(()) => return None,
                Err(reason) => reasons.push(format!("node {id}: {reason}")),
            }
        }

        Some(reasons.join(", "))
    }

    fn launch(&self, registry: &mut Registry, id: &str, offer: &Offer) -> Result<(), String> {
        self.launch_with(registry, id, offer, new_task)
    }

    /// Attach a runtime to `id` and launch the task `build` produces. On
    /// failure the node is restored as it was before the attempt,
    /// stickiness included.
    fn launch_with(
        &self,
        registry: &mut Registry,
        id: &str,
        offer: &Offer,
        build: impl FnOnce(&Node, &TaskSettings) -> SchedulerResult<TaskInfo>,
    ) -> Result<(), String> {
        let before = registry.require(id).map_err(|e| e.to_string())?.clone();
        init_runtime(registry, id, offer).map_err(|e| e.to_string())?;

        let node = registry.require(id).map_err(|e| e.to_string())?;
        let task = match build(node, &self.settings) {
            Ok(task) => task,
            Err(e) => {
                if let Some(node) = registry.node_mut(id) {
                    *node = before;
                }
                return Err(e.to_string());
            }
        };

        info!(node = id, task = %task.task_id, offer = %offer.id, host = %offer.hostname, "starting node");
        self.driver.launch_task(&offer.id, task);
        Ok(())
    }

    /// Finish or kill Stopping nodes. Returns whether anything changed.
    fn stop_nodes(&self, registry: &mut Registry) -> bool {
        let mut changed = false;
        for node in registry.nodes_mut() {
            if node.state != NodeState::Stopping {
                continue;
            }
            if node.runtime().is_none() {
                node.state = NodeState::Idle;
                changed = true;
                continue;
            }
            if let Some(task_id) = node.take_kill() {
                info!(node = %node.id, task = %task_id, "killing task");
                self.driver.kill_task(&task_id);
                changed = true;
            }
        }
        changed
    }

    // ── Task status ─────────────────────────────────────────────────

    fn on_status(&self, registry: &mut Registry, status: &TaskStatus, now: u64) {
        info!(
            task = %status.task_id,
            state = status.state.as_str(),
            message = status.message.as_deref().unwrap_or(""),
            "task status"
        );

        match status.state.kind() {
            StatusKind::Started => self.on_task_started(registry, status),
            StatusKind::Stopped => on_task_stopped(registry, status, now),
            StatusKind::Other => {}
        }
    }

    fn on_task_started(&self, registry: &mut Registry, status: &TaskStatus) {
        let expected = match registry.node_by_task_mut(&status.task_id) {
            Some(node) => {
                let accepted = node.on_task_started();
                if !accepted {
                    warn!(node = %node.id, state = %node.state, task = %status.task_id, "unexpected running status, killing task");
                }
                accepted
            }
            None => {
                warn!(task = %status.task_id, "running status for unknown task, killing it");
                false
            }
        };

        if !expected {
            self.driver.kill_task(&status.task_id);
        }
    }
}

fn on_task_stopped(registry: &mut Registry, status: &TaskStatus, now: u64) {
    let Some(node) = registry.node_by_task_mut(&status.task_id) else {
        info!(task = %status.task_id, state = status.state.as_str(), "status for unknown task, ignoring it");
        return;
    };

    let was = node.state;
    if !node.on_task_stopped(status.state, now) {
        info!(node = %node.id, state = status.state.as_str(), "status for idle node, ignoring it");
        return;
    }

    if node.state == NodeState::Starting && status.state != TaskState::Finished {
        warn!(node = %node.id, was = %was, state = status.state.as_str(), "task stopped, restarting node");
    } else {
        info!(node = %node.id, was = %was, next = %node.state, "task stopped");
    }
}
