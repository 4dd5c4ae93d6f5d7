//! fsgrid-api: management REST API for fsgrid.
//!
//! Thin axum layer over [`SharedRegistry`]: node administration plus the
//! artifact downloads the executor fetches at launch. Parameters are
//! query strings and every route accepts both GET and POST, so the API
//! can be driven with plain `curl`.
//!
//! # API Routes
//!
//! | Path | Parameters | Description |
//! |---|---|---|
//! | `/health` | | Liveness probe |
//! | `/api/v1/node/list` | `node` (default `*`) | List nodes |
//! | `/api/v1/node/add` | `node`, `type`, node options | Add idle nodes |
//! | `/api/v1/node/update` | `node`, node options | Update idle nodes |
//! | `/api/v1/node/start` | `node`, `timeout` | Start nodes, optionally wait until running |
//! | `/api/v1/node/stop` | `node`, `timeout` | Stop nodes, optionally wait until idle |
//! | `/api/v1/node/remove` | `node` | Remove idle nodes |
//! | `/jar/{file}` | | Executor artifact |
//! | `/hadoop/{file}` | | Filesystem distribution |
//!
//! Node options: `cpus`, `mem`, `constraints`, `stickinessPeriod`,
//! `executorJvmOpts`, `hadoopJvmOpts`, `coreSiteOpts`, `hdfsSiteOpts`,
//! `externalFsUri`.

pub mod error;
pub mod handlers;
pub mod params;

use std::path::PathBuf;

use axum::Router;
use axum::routing::get;
use fsgrid_state::SharedRegistry;

pub use error::{ApiError, ApiResponse, ApiResult};

/// Files served to executors.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    pub jar: Option<PathBuf>,
    pub hadoop: Option<PathBuf>,
}

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: SharedRegistry,
    pub artifacts: Artifacts,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let node_routes = Router::new()
        .route("/list", get(handlers::list_nodes).post(handlers::list_nodes))
        .route("/add", get(handlers::add_nodes).post(handlers::add_nodes))
        .route("/update", get(handlers::update_nodes).post(handlers::update_nodes))
        .route("/start", get(handlers::start_nodes).post(handlers::start_nodes))
        .route("/stop", get(handlers::stop_nodes).post(handlers::stop_nodes))
        .route("/remove", get(handlers::remove_nodes).post(handlers::remove_nodes));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1/node", node_routes)
        .route("/jar/{file}", get(handlers::download_jar))
        .route("/hadoop/{file}", get(handlers::download_hadoop))
        .fallback(handlers::not_found)
        .with_state(state)
}
