//! REST API server for the eballscan explorer
//!
//! Every explorer endpoint is a `POST` with a form-encoded body and answers with
//! JSON. Successful calls return `200` with endpoint-specific fields; every
//! failure, whether a malformed field or a storage error, returns `400` with
//! `{"result": "<message>"}`.

use axum::{
    async_trait,
    extract::{FromRequest, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{StoreError, ValidationError};
use crate::model::{Block, Transaction};
use crate::pagination::fetch_page;
use crate::persistence::Persistence;
use crate::validation::FormFields;

/// Shared handler state: the storage backend plus request counters.
#[derive(Clone)]
pub struct Explorer {
    store: Arc<dyn Persistence>,
    api_stats: Arc<RwLock<ApiStats>>,
}

/// API statistics and monitoring
#[derive(Debug, Default)]
struct ApiStats {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    validation_failures: u64,
    storage_failures: u64,
    malformed_bodies: u64,
    blocks_added: u64,
    transactions_added: u64,
    start_time: Option<Instant>,
}

impl ApiStats {
    fn new() -> Self {
        ApiStats {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    fn record_request(&mut self, success: bool, kind: Option<ErrorKind>) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
            return;
        }
        self.failed_requests += 1;
        match kind {
            Some(ErrorKind::Validation) => self.validation_failures += 1,
            Some(ErrorKind::Storage) => self.storage_failures += 1,
            Some(ErrorKind::MalformedBody) => self.malformed_bodies += 1,
            // unknown route or method
            None => {}
        }
    }
}

impl Explorer {
    pub fn new(store: Arc<dyn Persistence>) -> Self {
        Self {
            store,
            api_stats: Arc::new(RwLock::new(ApiStats::new())),
        }
    }

    /// Get API statistics
    pub async fn get_stats(&self) -> ApiStatsResponse {
        let stats = self.api_stats.read().await;
        let uptime = stats.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0);

        ApiStatsResponse {
            total_requests: stats.total_requests,
            successful_requests: stats.successful_requests,
            failed_requests: stats.failed_requests,
            validation_failures: stats.validation_failures,
            storage_failures: stats.storage_failures,
            malformed_bodies: stats.malformed_bodies,
            blocks_added: stats.blocks_added,
            transactions_added: stats.transactions_added,
            uptime_seconds: uptime,
        }
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

/// Which stage rejected a request. Attached to error responses so middleware
/// can tell failures apart even though clients all see the same envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Storage,
    MalformedBody,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Storage => "storage",
            ErrorKind::MalformedBody => "body",
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    Storage(StoreError),
    MalformedBody(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Validation(_) => ErrorKind::Validation,
            ApiError::Storage(_) => ErrorKind::Storage,
            ApiError::MalformedBody(_) => ErrorKind::MalformedBody,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Validation(e) => e.to_string(),
            ApiError::Storage(e) => e.to_string(),
            ApiError::MalformedBody(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let message = self.message();
        debug!(kind = kind.as_str(), error = %message, "api.rejected");

        let mut response =
            (StatusCode::BAD_REQUEST, Json(ResultResponse { result: message })).into_response();
        response.extensions_mut().insert(kind);
        response
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Storage(err)
    }
}

/// `{"result": ...}`, used for failures and for acknowledging writes.
#[derive(Serialize)]
struct ResultResponse {
    result: String,
}

impl ResultResponse {
    fn success() -> Json<Self> {
        Json(ResultResponse {
            result: "success".to_string(),
        })
    }
}

#[derive(Serialize)]
pub struct ApiStatsResponse {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub validation_failures: u64,
    pub storage_failures: u64,
    pub malformed_bodies: u64,
    pub blocks_added: u64,
    pub transactions_added: u64,
    pub uptime_seconds: u64,
}

// ============================================================================
// Form Extraction
// ============================================================================

#[async_trait]
impl<S> FromRequest<S> for FormFields
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        // decoded as pairs so a repeated key can keep its first value
        let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::MalformedBody(rejection.body_text()))?;
        Ok(pairs.into_iter().collect())
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Request statistics middleware
async fn stats_middleware(
    State(explorer): State<Arc<Explorer>>,
    req: Request,
    next: Next,
) -> Response {
    let response = next.run(req).await;

    let success = response.status().is_success();
    let kind = response.extensions().get::<ErrorKind>().copied();
    let mut stats = explorer.api_stats.write().await;
    stats.record_request(success, kind);

    response
}

/// Logs method, path, status, duration and, for failures, which stage
/// rejected the request.
async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status();
    let error_kind = response
        .extensions()
        .get::<ErrorKind>()
        .map(ErrorKind::as_str)
        .unwrap_or("none");

    info!(
        method = %method,
        path = %path,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        error_kind = error_kind,
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Build the API router with all endpoints nested under `route_prefix`
/// (an empty prefix mounts them at the root).
pub fn build_api_router(explorer: Arc<Explorer>, route_prefix: &str) -> Router {
    let api_routes = Router::new()
        // Block endpoints
        .route("/getBlock", post(get_blocks))
        .route("/getBlockByHeight", post(get_block_by_height))
        .route("/add_block", post(add_block))
        // Transaction endpoints
        .route("/getTransactionByHash", post(get_transaction_by_hash))
        .route("/add_transaction", post(add_transaction))
        .route("/getTransactionByHeight", post(get_transactions_by_height))
        .route("/getTransaction", post(get_transactions))
        .route(
            "/getTransactionsByAccountName",
            post(get_transactions_by_account_name),
        )
        // Account endpoints
        .route("/getAccounts", post(get_accounts))
        .route("/getAccountInfo", post(get_account_info))
        // System endpoints
        .route("/health", get(health_check))
        .route("/stats", get(get_api_stats))
        // logging inside stats so the logged duration excludes the counter lock
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn_with_state(
            explorer.clone(),
            stats_middleware,
        ))
        .with_state(explorer);

    let app = if route_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(route_prefix, api_routes)
    };
    app.layer(cors_layer())
}

/// Run the API server until Ctrl-C.
pub async fn run_api_server(
    explorer: Arc<Explorer>,
    config: &ServerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_api_router(explorer, &config.route_prefix);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        addr = %listener.local_addr()?,
        prefix = %config.route_prefix,
        "API server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn get_api_stats(State(explorer): State<Arc<Explorer>>) -> impl IntoResponse {
    Json(explorer.get_stats().await)
}

async fn get_block_by_height(
    State(explorer): State<Arc<Explorer>>,
    form: FormFields,
) -> Result<Json<Value>, ApiError> {
    let height = form.int("height")?;

    let (block, max_height) = explorer.store.query_one_block(height)?;

    Ok(Json(json!({ "max_height": max_height, "block": block })))
}

async fn get_blocks(
    State(explorer): State<Arc<Explorer>>,
    form: FormFields,
) -> Result<Json<Value>, ApiError> {
    let request = form.page("num", "index")?;

    let page = fetch_page(request, |r| explorer.store.query_blocks(r))?;

    Ok(Json(json!({ "pageNum": page.total_pages, "blocks": page.items })))
}

async fn add_block(
    State(explorer): State<Arc<Explorer>>,
    form: FormFields,
) -> Result<impl IntoResponse, ApiError> {
    let block = Block {
        height: form.int("Height")?,
        time_stamp: form.int("TimeStamp")?,
        count_txs: form.int("CountTxs")?,
        hash: form.text("Hash"),
        prev_hash: form.text("PrevHash"),
        merkle_hash: form.text("MerkleHash"),
        state_hash: form.text("StateHash"),
    };

    explorer.store.add_block(&block)?;

    explorer.api_stats.write().await.blocks_added += 1;
    info!(height = block.height, hash = %block.hash, "Block stored");

    Ok(ResultResponse::success())
}

async fn get_transaction_by_hash(
    State(explorer): State<Arc<Explorer>>,
    form: FormFields,
) -> Result<Json<Value>, ApiError> {
    let hash = form.text("hash");

    let transaction = explorer.store.query_one_transaction(&hash)?;

    Ok(Json(json!({ "transaction": transaction })))
}

async fn add_transaction(
    State(explorer): State<Arc<Explorer>>,
    form: FormFields,
) -> Result<impl IntoResponse, ApiError> {
    let tx = Transaction {
        tx_type: form.int("TxType")?,
        time_stamp: form.int("TimeStamp")?,
        block_height: form.int("BlockHeight")?,
        hash: form.text("Hash"),
        permission: form.text("Permission"),
        tx_from: form.text("TxFrom"),
        address: form.text("Address"),
    };

    explorer.store.add_transaction(&tx)?;

    explorer.api_stats.write().await.transactions_added += 1;
    info!(
        hash = %tx.hash,
        block_height = tx.block_height,
        "Transaction stored"
    );

    Ok(ResultResponse::success())
}

async fn get_transactions_by_height(
    State(explorer): State<Arc<Explorer>>,
    form: FormFields,
) -> Result<Json<Value>, ApiError> {
    let block_height = form.int("blockHeight")?;

    let transactions = explorer.store.query_transactions_by_height(block_height)?;

    Ok(Json(json!({
        "counts": transactions.len(),
        "transactions": transactions
    })))
}

async fn get_transactions(
    State(explorer): State<Arc<Explorer>>,
    form: FormFields,
) -> Result<Json<Value>, ApiError> {
    let request = form.page("num", "index")?;

    let page = fetch_page(request, |r| explorer.store.query_transactions(r))?;

    Ok(Json(json!({
        "pageNum": page.total_pages,
        "transactions": page.items
    })))
}

async fn get_transactions_by_account_name(
    State(explorer): State<Arc<Explorer>>,
    form: FormFields,
) -> Result<Json<Value>, ApiError> {
    let request = form.page("num", "index")?;
    let name = form.text("name");

    let page = fetch_page(request, |r| {
        explorer.store.query_transactions_by_account_name(&name, r)
    })?;

    Ok(Json(json!({
        "pageNums": page.total_pages,
        "counts": page.total_count,
        "transactions": page.items
    })))
}

async fn get_accounts(
    State(explorer): State<Arc<Explorer>>,
    form: FormFields,
) -> Result<Json<Value>, ApiError> {
    let request = form.page("num", "index")?;

    let page = fetch_page(request, |r| explorer.store.query_accounts(r))?;

    Ok(Json(json!({ "pageNum": page.total_pages, "accounts": page.items })))
}

async fn get_account_info(
    State(explorer): State<Arc<Explorer>>,
    form: FormFields,
) -> Result<Json<Value>, ApiError> {
    let name = form.text("name");

    let account = explorer.store.query_one_account(&name)?;

    Ok(Json(json!({ "account": account })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let source = "x".parse::<i64>().unwrap_err();
        let err = ApiError::from(ValidationError::InvalidInteger {
            field: "num".to_string(),
            raw: "x".to_string(),
            source,
        });
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = ApiError::from(StoreError::NotFound("account bob".to_string()));
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(err.message(), "account bob not found");
    }

    #[test]
    fn test_error_response_is_bad_request_and_tagged() {
        let response = ApiError::MalformedBody("bad body".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.extensions().get::<ErrorKind>(),
            Some(&ErrorKind::MalformedBody)
        );
    }

    #[test]
    fn test_stats_split_failures_by_kind() {
        let mut stats = ApiStats::new();
        stats.record_request(true, None);
        stats.record_request(false, Some(ErrorKind::Validation));
        stats.record_request(false, Some(ErrorKind::Storage));
        stats.record_request(false, Some(ErrorKind::Storage));
        stats.record_request(false, None);
        assert_eq!(stats.total_requests, 5);
        assert_eq!(stats.successful_requests, 1);
        assert_eq!(stats.failed_requests, 4);
        assert_eq!(stats.validation_failures, 1);
        assert_eq!(stats.storage_failures, 2);
        assert_eq!(stats.malformed_bodies, 0);
    }
}
