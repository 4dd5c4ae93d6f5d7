//! `fsgridd node ...`: management API client.
//!
//! Each subcommand becomes one request to `/api/v1/node/<cmd>` with the
//! arguments as query parameters. The server does all validation; this
//! side only renders the reply.

use std::fmt::Write as _;

use anyhow::{Context, anyhow, bail};
use bytes::Bytes;
use clap::{Args, Subcommand};
use fsgrid_core::strings::format_map;
use fsgrid_state::schema::NodeRecord;
use http::Uri;
use http::header::{ACCEPT, HOST, USER_AGENT};
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use serde_json::Value;
use tokio::net::TcpStream;
use tracing::debug;

#[derive(Debug, Subcommand)]
pub enum NodeAction {
    /// List nodes.
    List {
        /// Node id expression, e.g. `dn*` or `dn0..3`.
        #[arg(default_value = "*")]
        node: String,
    },
    /// Add nodes.
    Add {
        node: String,
        /// namenode or datanode.
        #[arg(long = "type")]
        node_type: String,
        #[command(flatten)]
        options: NodeOptions,
    },
    /// Update idle nodes.
    Update {
        node: String,
        #[command(flatten)]
        options: NodeOptions,
    },
    /// Start nodes.
    Start {
        node: String,
        /// How long to wait for the nodes to run, e.g. 2m; 0 returns at once.
        #[arg(long)]
        timeout: Option<String>,
    },
    /// Stop nodes.
    Stop {
        node: String,
        /// How long to wait for the nodes to go idle, e.g. 2m; 0 returns at once.
        #[arg(long)]
        timeout: Option<String>,
    },
    /// Remove idle nodes.
    Remove { node: String },
}

/// Node fields settable on add and update. An empty value clears the
/// field.
#[derive(Debug, Default, Args)]
pub struct NodeOptions {
    #[arg(long)]
    pub cpus: Option<String>,
    /// Memory in MB.
    #[arg(long)]
    pub mem: Option<String>,
    /// e.g. hostname=unique,rack=like:r1-.*
    #[arg(long)]
    pub constraints: Option<String>,
    /// How long a stopped node prefers its last host, e.g. 10m.
    #[arg(long)]
    pub stickiness_period: Option<String>,
    #[arg(long)]
    pub executor_jvm_opts: Option<String>,
    #[arg(long)]
    pub hadoop_jvm_opts: Option<String>,
    /// core-site.xml overrides, e.g. io.file.buffer.size=65536
    #[arg(long)]
    pub core_site_opts: Option<String>,
    /// hdfs-site.xml overrides, e.g. dfs.replication=2
    #[arg(long)]
    pub hdfs_site_opts: Option<String>,
    /// Use an existing filesystem instead of launching the namenode.
    #[arg(long)]
    pub external_fs_uri: Option<String>,
}

impl NodeOptions {
    fn push_params(self, params: &mut Vec<(&'static str, String)>) {
        let fields = [
            ("cpus", self.cpus),
            ("mem", self.mem),
            ("constraints", self.constraints),
            ("stickinessPeriod", self.stickiness_period),
            ("executorJvmOpts", self.executor_jvm_opts),
            ("hadoopJvmOpts", self.hadoop_jvm_opts),
            ("coreSiteOpts", self.core_site_opts),
            ("hdfsSiteOpts", self.hdfs_site_opts),
            ("externalFsUri", self.external_fs_uri),
        ];
        params.extend(fields.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))));
    }
}

impl NodeAction {
    fn name(&self) -> &'static str {
        match self {
            NodeAction::List { .. } => "list",
            NodeAction::Add { .. } => "add",
            NodeAction::Update { .. } => "update",
            NodeAction::Start { .. } => "start",
            NodeAction::Stop { .. } => "stop",
            NodeAction::Remove { .. } => "remove",
        }
    }

    /// Request path and query for this action.
    pub fn request_path(self) -> anyhow::Result<String> {
        let name = self.name();
        let mut params: Vec<(&'static str, String)> = Vec::new();

        match self {
            NodeAction::List { node } | NodeAction::Remove { node } => params.push(("node", node)),
            NodeAction::Add {
                node,
                node_type,
                options,
            } => {
                params.push(("node", node));
                params.push(("type", node_type));
                options.push_params(&mut params);
            }
            NodeAction::Update { node, options } => {
                params.push(("node", node));
                options.push_params(&mut params);
            }
            NodeAction::Start { node, timeout } | NodeAction::Stop { node, timeout } => {
                params.push(("node", node));
                if let Some(timeout) = timeout {
                    params.push(("timeout", timeout));
                }
            }
        }

        let query = serde_urlencoded::to_string(&params)?;
        Ok(format!("/api/v1/node/{name}?{query}"))
    }
}

/// Run one node command against `api` and print the outcome.
pub async fn run(api: &str, action: NodeAction) -> anyhow::Result<()> {
    let name = action.name();
    let data = request(api, &action.request_path()?).await?;
    print!("{}", render(name, data)?);
    Ok(())
}

/// Text shown for a successful reply.
pub fn render(action: &str, data: Value) -> anyhow::Result<String> {
    let mut out = String::new();
    match action {
        "list" | "add" | "update" => {
            let nodes: Vec<NodeRecord> = serde_json::from_value(data)?;
            if nodes.is_empty() {
                out.push_str("no nodes\n");
            } else {
                let title = match action {
                    "list" => "nodes:",
                    "add" => "nodes added:",
                    _ => "nodes updated:",
                };
                writeln!(out, "{title}")?;
                for node in &nodes {
                    out.push_str(&format_node(node));
                    out.push('\n');
                }
            }
        }
        "start" | "stop" => {
            let status = data["status"].as_str().unwrap_or_default().to_string();
            if status == "timeout" {
                bail!("{action} timeout");
            }
            let nodes: Vec<NodeRecord> = serde_json::from_value(data["nodes"].clone())?;
            writeln!(out, "nodes {status}:")?;
            for node in &nodes {
                out.push_str(&format_node(node));
                out.push('\n');
            }
        }
        "remove" => {
            let ids: Vec<String> = serde_json::from_value(data)?;
            writeln!(out, "nodes removed: {}", ids.join(", "))?;
        }
        other => bail!("unknown action {other}"),
    }
    Ok(out)
}

/// Multi-line, indented rendering of one node.
pub fn format_node(node: &NodeRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "  id: {}", node.id);
    let _ = writeln!(out, "  type: {}", node.node_type);
    let _ = writeln!(out, "  state: {}", node.state);
    let _ = writeln!(out, "  resources: cpus:{}, mem:{}", node.cpus, node.mem);

    if !node.constraints.is_empty() {
        let constraints: Vec<String> = node
            .constraints
            .iter()
            .map(|(name, c)| format!("{name}={c}"))
            .collect();
        let _ = writeln!(out, "  constraints: {}", constraints.join(","));
    }

    let mut stickiness = format!("period:{}", node.stickiness.period);
    if let Some(hostname) = &node.stickiness.hostname {
        let _ = write!(stickiness, ", hostname:{hostname}");
    }
    if let Some(stop_time) = node.stickiness.stop_time {
        let _ = write!(stickiness, ", stopTime:{stop_time}");
    }
    let _ = writeln!(out, "  stickiness: {stickiness}");

    if let Some(opts) = &node.executor_jvm_opts {
        let _ = writeln!(out, "  executor jvm opts: {opts}");
    }
    if let Some(opts) = &node.hadoop_jvm_opts {
        let _ = writeln!(out, "  hadoop jvm opts: {opts}");
    }
    if !node.core_site_opts.is_empty() {
        let _ = writeln!(out, "  core-site opts: {}", format_map(&node.core_site_opts));
    }
    if !node.hdfs_site_opts.is_empty() {
        let _ = writeln!(out, "  hdfs-site opts: {}", format_map(&node.hdfs_site_opts));
    }
    if let Some(uri) = &node.external_fs_uri {
        let _ = writeln!(out, "  external fs uri: {uri}");
    }

    if let Some(reservation) = &node.reservation {
        let ports: Vec<String> = reservation
            .ports
            .iter()
            .map(|(name, port)| format!("{name}={port}"))
            .collect();
        let _ = writeln!(
            out,
            "  reservation: cpus:{}, mem:{}, ports:{}",
            reservation.cpus,
            reservation.mem,
            ports.join(",")
        );
    }

    if let Some(runtime) = &node.runtime {
        let _ = writeln!(out, "  runtime:");
        let _ = writeln!(out, "    task: {}", runtime.task_id);
        let _ = writeln!(out, "    executor: {}", runtime.executor_id);
        let _ = writeln!(out, "    slave: {} ({})", runtime.slave_id, runtime.hostname);
        if let Some(fs_uri) = &runtime.fs_uri {
            let _ = writeln!(out, "    fs uri: {fs_uri}");
        }
        if !runtime.attributes.is_empty() {
            let _ = writeln!(out, "    attributes: {}", format_map(&runtime.attributes));
        }
    }
    out
}

// ── HTTP ───────────────────────────────────────────────────────────

/// GET `path` from the API at `api`; returns the envelope's `data`.
async fn request(api: &str, path: &str) -> anyhow::Result<Value> {
    let uri: Uri = api.parse().with_context(|| format!("invalid api: {api}"))?;
    if uri.scheme_str().is_some_and(|s| s != "http") {
        bail!("unsupported api scheme: {api}");
    }
    let host = uri.host().ok_or_else(|| anyhow!("invalid api: {api}"))?;
    let authority = format!("{host}:{}", uri.port_u16().unwrap_or(80));
    let prefix = uri.path().trim_end_matches('/');

    let stream = TcpStream::connect(&authority)
        .await
        .with_context(|| format!("connecting to {authority}"))?;
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "api connection closed");
        }
    });

    let request = http::Request::builder()
        .uri(format!("{prefix}{path}"))
        .header(HOST, &authority)
        .header(ACCEPT, "application/json")
        .header(USER_AGENT, "fsgridd/0.1")
        .body(Empty::<Bytes>::new())?;
    debug!(uri = %request.uri(), "api request");

    let response = sender.send_request(request).await?;
    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();

    let envelope: Value = serde_json::from_slice(&body)
        .with_context(|| format!("unexpected response ({status}): {}", String::from_utf8_lossy(&body)))?;
    if envelope["success"].as_bool() != Some(true) {
        let error = envelope["error"].as_str().unwrap_or("request failed");
        bail!("{error}");
    }
    Ok(envelope["data"].clone())
}
