//! Scheduler mode: the framework scheduler, its management API and the
//! Mesos connection in one process.
//!
//! In this mode, the daemon:
//! 1. Loads `fsgrid.toml` (if given) and applies flag overrides
//! 2. Resolves the executor artifacts
//! 3. Opens storage and loads the node registry
//! 4. Serves the management API
//! 5. Subscribes to the master and runs the scheduler loop
//!
//! Ctrl-C shuts everything down and leaves tasks running for the next
//! scheduler to reconcile. A fatal scheduler error tears the framework
//! down and exits non-zero.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use fsgrid_api::{ApiState, Artifacts};
use fsgrid_core::{Period, SchedulerConfig};
use fsgrid_mesos::{MesosClient, MesosConfig};
use fsgrid_scheduler::{Reconciler, Scheduler, SchedulerDriver, TaskSettings};
use fsgrid_state::SharedRegistry;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::artifacts;

const EVENT_BUFFER: usize = 256;
const CLIENT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Flags of `fsgridd scheduler`; each one overrides the config file.
#[derive(Debug, Default, Args)]
pub struct SchedulerArgs {
    /// Path to fsgrid.toml.
    #[arg(long, env = "FSGRID_CONFIG")]
    pub config: Option<PathBuf>,

    /// Public URL of the management API, e.g. http://192.168.3.5:7000.
    #[arg(long)]
    pub api: Option<String>,

    /// Mesos master, e.g. http://master:5050.
    #[arg(long, env = "FSGRID_MASTER")]
    pub master: Option<String>,

    /// User to run tasks as.
    #[arg(long)]
    pub user: Option<String>,

    #[arg(long)]
    pub principal: Option<String>,

    #[arg(long)]
    pub secret: Option<String>,

    #[arg(long)]
    pub framework_name: Option<String>,

    #[arg(long)]
    pub framework_role: Option<String>,

    /// Failover timeout, e.g. 30d.
    #[arg(long)]
    pub framework_timeout: Option<Period>,

    /// file:<path> or redb:<path>.
    #[arg(long)]
    pub storage: Option<String>,

    /// Executor artifact (default: fsgrid-executor*.jar in the working dir).
    #[arg(long)]
    pub jar: Option<PathBuf>,

    /// Hadoop distribution (default: hadoop-*.tar.gz in the working dir).
    #[arg(long)]
    pub hadoop: Option<PathBuf>,

    #[arg(long)]
    pub reconcile_delay: Option<Period>,

    #[arg(long)]
    pub reconcile_max_tries: Option<u32>,

    #[arg(long)]
    pub executor_command: Option<String>,
}

impl SchedulerArgs {
    /// Config file (or defaults) with flags applied on top.
    pub fn load_config(self) -> anyhow::Result<SchedulerConfig> {
        let mut config = match &self.config {
            Some(path) => SchedulerConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => SchedulerConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(self, config: &mut SchedulerConfig) {
        if let Some(api) = self.api {
            config.api = api;
        }
        if self.master.is_some() {
            config.master = self.master;
        }
        if self.user.is_some() {
            config.user = self.user;
        }
        if self.principal.is_some() {
            config.principal = self.principal;
        }
        if self.secret.is_some() {
            config.secret = self.secret;
        }
        if let Some(name) = self.framework_name {
            config.framework_name = name;
        }
        if let Some(role) = self.framework_role {
            config.framework_role = role;
        }
        if let Some(timeout) = self.framework_timeout {
            config.framework_timeout = timeout;
        }
        if let Some(storage) = self.storage {
            config.storage = storage;
        }
        if self.jar.is_some() {
            config.jar = self.jar;
        }
        if self.hadoop.is_some() {
            config.hadoop = self.hadoop;
        }
        if let Some(delay) = self.reconcile_delay {
            config.reconcile_delay = delay;
        }
        if let Some(tries) = self.reconcile_max_tries {
            config.reconcile_max_tries = tries;
        }
        if let Some(command) = self.executor_command {
            config.executor_command = command;
        }
    }
}

/// Task settings derived from the config.
pub fn task_settings(config: &SchedulerConfig) -> TaskSettings {
    TaskSettings {
        api: config.api.clone(),
        jar: config.jar.as_deref().and_then(SchedulerConfig::artifact_name),
        hadoop: config.hadoop.as_deref().and_then(SchedulerConfig::artifact_name),
        executor_command: config.executor_command.clone(),
    }
}

/// Run the scheduler until Ctrl-C or a fatal error.
pub async fn run_scheduler(mut config: SchedulerConfig) -> anyhow::Result<()> {
    info!("fsgrid scheduler starting");
    config.validate()?;
    artifacts::resolve(&mut config, Path::new("."))?;
    info!(
        master = config.master.as_deref().unwrap_or("-"),
        framework = %config.framework_name,
        role = %config.framework_role,
        failover_timeout = %config.framework_timeout,
        "effective config"
    );

    // ── Registry ─────────────────────────────────────────────────
    let storage = fsgrid_state::storage::open(&config.storage_uri()?)?;
    let registry = SharedRegistry::load(storage)?;
    let framework_id = {
        let guard = registry.lock().await;
        info!(
            storage = %config.storage,
            nodes = guard.nodes().len(),
            framework_id = guard.framework_id().unwrap_or("-"),
            "registry loaded"
        );
        guard.framework_id().map(str::to_string)
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Management API ───────────────────────────────────────────
    let router = fsgrid_api::build_router(ApiState {
        registry: registry.clone(),
        artifacts: Artifacts {
            jar: config.jar.clone(),
            hadoop: config.hadoop.clone(),
        },
    });
    let api_addr = SocketAddr::from(([0, 0, 0, 0], config.api_port()?));
    let listener = tokio::net::TcpListener::bind(api_addr)
        .await
        .with_context(|| format!("binding {api_addr}"))?;
    info!(%api_addr, api = %config.api, "API server starting");

    let mut api_shutdown = shutdown_rx.clone();
    let api_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = api_shutdown.wait_for(|s| *s).await;
            })
            .await
    });

    // ── Mesos connection ─────────────────────────────────────────
    let (client, driver) = MesosClient::new(MesosConfig::from_scheduler(&config, framework_id)?);
    let driver: Arc<dyn SchedulerDriver> = Arc::new(driver);
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let mut client_handle = tokio::spawn(client.run(events_tx, shutdown_rx.clone()));

    // ── Scheduler loop ───────────────────────────────────────────
    let scheduler = Scheduler::new(
        registry,
        driver.clone(),
        Reconciler::new(config.reconcile_delay, config.reconcile_max_tries),
        task_settings(&config),
    );
    let mut scheduler_handle = tokio::spawn(scheduler.run(events_rx, shutdown_rx));

    let result: anyhow::Result<()> = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("installing Ctrl-C handler")?;
            info!("shutdown signal received");
            Ok(())
        }
        finished = &mut scheduler_handle => match finished {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(error = %e, "scheduler failed, tearing down framework");
                driver.stop();
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        },
    };

    let _ = shutdown_tx.send(true);
    scheduler_handle.abort();

    match tokio::time::timeout(CLIENT_STOP_TIMEOUT, &mut client_handle).await {
        Ok(Ok(Err(e))) => warn!(error = %e, "mesos client stopped with error"),
        Ok(_) => {}
        Err(_) => {
            warn!("mesos client did not stop in time");
            client_handle.abort();
        }
    }
    if let Ok(Err(e)) = api_handle.await {
        warn!(error = %e, "API server error");
    }

    info!("fsgrid scheduler stopped");
    result
}
