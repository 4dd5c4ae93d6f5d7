//! REST API handlers.
//!
//! Every mutating handler edits a copy of the registry under the lock and
//! swaps it in only after the copy has been persisted, so a request that
//! fails half way through a node expression changes nothing.

use std::path::Path as FsPath;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use fsgrid_core::SchedulerConfig;
use fsgrid_state::schema::NodeRecord;
use fsgrid_state::{Node, NodeState, Registry, StateError};
use serde::Serialize;
use tracing::{debug, info};

use crate::ApiState;
use crate::error::{ApiError, ApiResponse, ApiResult};
use crate::params::{self, NodeChanges, Params};

type Reply<T> = ApiResult<Json<ApiResponse<T>>>;

/// Outcome of a start/stop request.
#[derive(Debug, Serialize)]
pub struct TransitionReply {
    pub status: &'static str,
    pub nodes: Vec<NodeRecord>,
}

/// Apply `f` to a copy of the registry, persist it, then publish it.
async fn mutate<T>(
    state: &ApiState,
    f: impl FnOnce(&mut Registry) -> ApiResult<T>,
) -> ApiResult<T> {
    let mut guard = state.registry.lock().await;
    let mut draft = guard.clone();
    let out = f(&mut draft)?;
    state.registry.commit(&draft)?;
    *guard = draft;
    Ok(out)
}

/// Expand a node expression for a mutation; matching nothing is an error.
fn expand_some(registry: &Registry, expr: &str) -> ApiResult<Vec<String>> {
    let ids = registry.expand(expr)?;
    if ids.is_empty() {
        return Err(StateError::InvalidExpr(expr.to_string()).into());
    }
    Ok(ids)
}

fn records(registry: &Registry, ids: &[String]) -> Vec<NodeRecord> {
    ids.iter()
        .filter_map(|id| registry.node(id))
        .map(NodeRecord::from)
        .collect()
}

// ── Health ─────────────────────────────────────────────────────

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

// ── Nodes ──────────────────────────────────────────────────────

/// GET /api/v1/node/list
pub async fn list_nodes(State(state): State<ApiState>, Query(params): Query<Params>) -> Reply<Vec<NodeRecord>> {
    let expr = params.get("node").map(String::as_str).unwrap_or("*");
    let registry = state.registry.lock().await;
    let ids = registry.expand(expr)?;
    Ok(ApiResponse::ok(records(&registry, &ids)))
}

/// GET /api/v1/node/add
pub async fn add_nodes(State(state): State<ApiState>, Query(params): Query<Params>) -> Reply<Vec<NodeRecord>> {
    let expr = params::required_node(&params)?;
    let node_type = params::node_type(&params)?;
    let changes = NodeChanges::parse(&params)?;

    let added = mutate(&state, |registry| {
        let ids = expand_some(registry, expr)?;
        let mut added = Vec::with_capacity(ids.len());
        for id in ids {
            let mut node = Node::new(id, node_type);
            changes.apply(&mut node)?;
            added.push(NodeRecord::from(&*registry.add_node(node)?));
        }
        Ok(added)
    })
    .await?;

    info!(nodes = %expr, node_type = %node_type, count = added.len(), "nodes added");
    Ok(ApiResponse::ok(added))
}

/// GET /api/v1/node/update
pub async fn update_nodes(State(state): State<ApiState>, Query(params): Query<Params>) -> Reply<Vec<NodeRecord>> {
    let expr = params::required_node(&params)?;
    let changes = NodeChanges::parse(&params)?;

    let updated = mutate(&state, |registry| {
        let ids = expand_some(registry, expr)?;
        for id in &ids {
            let node = registry.require_mut(id)?;
            if !node.is_idle() {
                return Err(StateError::NotIdle(id.clone()).into());
            }
            changes.apply(node)?;
        }
        Ok(records(registry, &ids))
    })
    .await?;

    info!(nodes = %expr, count = updated.len(), "nodes updated");
    Ok(ApiResponse::ok(updated))
}

/// GET /api/v1/node/remove
pub async fn remove_nodes(State(state): State<ApiState>, Query(params): Query<Params>) -> Reply<Vec<String>> {
    let expr = params::required_node(&params)?;

    let removed = mutate(&state, |registry| {
        let ids = expand_some(registry, expr)?;
        for id in &ids {
            registry.remove_node(id)?;
        }
        Ok(ids)
    })
    .await?;

    info!(nodes = %expr, count = removed.len(), "nodes removed");
    Ok(ApiResponse::ok(removed))
}

/// GET /api/v1/node/start
pub async fn start_nodes(State(state): State<ApiState>, Query(params): Query<Params>) -> Reply<TransitionReply> {
    transition(state, params, true).await
}

/// GET /api/v1/node/stop
pub async fn stop_nodes(State(state): State<ApiState>, Query(params): Query<Params>) -> Reply<TransitionReply> {
    transition(state, params, false).await
}

async fn transition(state: ApiState, params: Params, start: bool) -> Reply<TransitionReply> {
    let expr = params::required_node(&params)?;
    let timeout = params::timeout(&params)?;

    let ids = mutate(&state, |registry| {
        let ids = expand_some(registry, expr)?;
        for id in &ids {
            let node = registry.require_mut(id)?;
            if start {
                node.start()?;
            } else {
                node.stop()?;
            }
        }
        Ok(ids)
    })
    .await?;

    let (target, done) = if start {
        (NodeState::Running, "started")
    } else {
        (NodeState::Idle, "stopped")
    };
    info!(nodes = %expr, action = if start { "start" } else { "stop" }, %timeout, "node transition requested");

    let status = if timeout.is_zero() {
        "scheduled"
    } else if state.registry.wait_for(&ids, target, timeout.as_duration()).await {
        done
    } else {
        "timeout"
    };
    debug!(nodes = %expr, status, "node transition finished");

    let registry = state.registry.lock().await;
    Ok(ApiResponse::ok(TransitionReply {
        status,
        nodes: records(&registry, &ids),
    }))
}

// ── Artifacts ──────────────────────────────────────────────────

/// GET /jar/{file}
pub async fn download_jar(State(state): State<ApiState>, Path(file): Path<String>) -> impl IntoResponse {
    serve_artifact(state.artifacts.jar.as_deref(), &file).await
}

/// GET /hadoop/{file}
pub async fn download_hadoop(State(state): State<ApiState>, Path(file): Path<String>) -> impl IntoResponse {
    serve_artifact(state.artifacts.hadoop.as_deref(), &file).await
}

async fn serve_artifact(path: Option<&FsPath>, file: &str) -> ApiResult<impl IntoResponse + use<>> {
    let path = path
        .filter(|p| SchedulerConfig::artifact_name(p).as_deref() == Some(file))
        .ok_or_else(|| ApiError::not_found(format!("{file} not found")))?;

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ApiError::not_found(format!("{file}: {e}")))?;

    debug!(file, size = bytes.len(), "serving artifact");
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes))
}

/// Any route not matched above.
pub async fn not_found() -> ApiError {
    ApiError::not_found("not found")
}
