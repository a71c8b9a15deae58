//! REST API server for the shard explorer
//!
//! Serves block windows, transactions, address histories, committees and the
//! shard layout over HTTP. Storage work runs on the blocking pool.

use axum::{
    extract::{Query, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};

use crate::error::ExplorerError;
use crate::explorer::{
    AddressQuery, BlocksQuery, CommitteeQuery, CommitteeView, Explorer, TransactionQuery,
};
use crate::scanner::ExplorerBlock;
use crate::sharding::ShardEndpoint;
use crate::transaction::{AddressRecord, TransactionView};

pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    pub explorer: Arc<Explorer>,
    pub scan_timeout: Duration,
}

impl ApiState {
    pub fn new(explorer: Explorer) -> Self {
        Self {
            explorer: Arc::new(explorer),
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }

    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    InvalidInput(String),
    NotFound(String),
    Timeout(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Timeout(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ExplorerError> for ApiError {
    fn from(err: ExplorerError) -> Self {
        match err {
            ExplorerError::Boundary(_) => ApiError::InvalidInput(err.to_string()),
            ExplorerError::NotFound(_) => ApiError::NotFound(err.to_string()),
            ExplorerError::Cancelled(_) => ApiError::Timeout(err.to_string()),
            _ => ApiError::InternalError(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Middleware
// ============================================================================

/// Logs method, path, status and duration of every request.
async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

/// Build the API router with all endpoints (for testing)
pub fn build_api_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![http::Method::GET, http::Method::OPTIONS])
        .allow_headers(vec![http::header::CONTENT_TYPE]);

    Router::new()
        .route("/blocks", get(get_blocks))
        .route("/tx", get(get_transaction))
        .route("/address", get(get_address))
        .route("/committee", get(get_committee))
        .route("/shard-structure", get(get_shard_structure))
        .route("/health", get(health_check))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state)
        .layer(cors)
}

/// Serve the explorer on `port` until the listener fails.
pub async fn run_api_server(state: ApiState, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_api_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(%addr, "explorer listening");

    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Runs `work` on the blocking pool.
async fn blocking<T, F>(explorer: &Arc<Explorer>, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Explorer) -> crate::error::Result<T> + Send + 'static,
{
    let explorer = explorer.clone();
    tokio::task::spawn_blocking(move || work(&explorer))
        .await
        .map_err(|e| ApiError::InternalError(format!("Worker failed: {}", e)))?
        .map_err(ApiError::from)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn get_blocks(
    State(state): State<ApiState>,
    Query(query): Query<BlocksQuery>,
) -> Result<Json<Vec<ExplorerBlock>>, ApiError> {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    let scan = blocking(&state.explorer, move |explorer| explorer.blocks(&query, &flag));

    match tokio::time::timeout(state.scan_timeout, scan).await {
        Ok(result) => result.map(Json),
        Err(_) => {
            cancelled.store(true, Ordering::Relaxed);
            tracing::warn!(timeout_ms = %state.scan_timeout.as_millis(), "block scan timed out");
            Err(ApiError::Timeout("Block scan timed out".to_string()))
        }
    }
}

async fn get_transaction(
    State(state): State<ApiState>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<TransactionView>, ApiError> {
    blocking(&state.explorer, move |explorer| explorer.transaction(&query))
        .await
        .map(Json)
}

async fn get_address(
    State(state): State<ApiState>,
    Query(query): Query<AddressQuery>,
) -> Result<Json<AddressRecord>, ApiError> {
    blocking(&state.explorer, move |explorer| explorer.address(&query))
        .await
        .map(Json)
}

async fn get_committee(
    State(state): State<ApiState>,
    Query(query): Query<CommitteeQuery>,
) -> Result<Json<CommitteeView>, ApiError> {
    blocking(&state.explorer, move |explorer| explorer.committee(&query))
        .await
        .map(Json)
}

async fn get_shard_structure(
    State(state): State<ApiState>,
) -> Result<Json<Vec<ShardEndpoint>>, ApiError> {
    blocking(&state.explorer, |explorer| explorer.sharding_structure())
        .await
        .map(Json)
}
