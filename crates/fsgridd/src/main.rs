//! fsgridd: the fsgrid daemon.
//!
//! Single binary with two faces:
//! - `scheduler`: the Mesos framework scheduler, running HDFS namenode and
//!   datanode tasks, plus the management API
//! - `node`: client for that API
//!
//! # Usage
//!
//! ```text
//! fsgridd scheduler --master http://master:5050 --api http://192.168.3.5:7000
//! fsgridd node add nn --type namenode --mem 2048
//! fsgridd node add dn0..2 --type datanode
//! fsgridd node start '*' --timeout 5m
//! ```

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod artifacts;
mod node_cmd;
mod scheduler_mode;

use node_cmd::NodeAction;
use scheduler_mode::SchedulerArgs;

#[derive(Parser)]
#[command(name = "fsgridd", about = "HDFS on Mesos", version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and its management API.
    Scheduler(SchedulerArgs),
    /// Manage nodes through a running scheduler.
    Node {
        /// Management API URL.
        #[arg(long, env = "FSGRID_API", default_value = "http://localhost:7000", global = true)]
        api: String,

        #[command(subcommand)]
        action: NodeAction,
    },
}

fn init_tracing(default: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => default.parse()?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Scheduler(args) => {
            init_tracing("info,fsgrid=debug")?;
            let config = args.load_config()?;
            scheduler_mode::run_scheduler(config).await
        }
        Command::Node { api, action } => {
            init_tracing("warn")?;
            node_cmd::run(&api, action).await
        }
    }
}
