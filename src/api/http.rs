use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};

use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::blockchain::{validate_address, CycleReport, PollerHandle, PollerState};
use crate::error::ValidationError;
use crate::logging::MetricsLogger;
use crate::models::Transaction;
use crate::storage::{normalize_address, Storage};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(#[from] ValidationError),
    #[error("Server error: {0}")]
    Server(String),
}

impl From<&ApiError> for StatusCode {
    fn from(error: &ApiError) -> Self {
        match error {
            ApiError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            ApiError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        let error = match self {
            ApiError::InvalidParameter(_) => "invalid_parameter",
            ApiError::Server(_) => "server_error",
        };
        let message = match &self {
            ApiError::InvalidParameter(e) => e.to_string(),
            ApiError::Server(msg) => msg.clone(),
        };
        (
            status,
            Json(ErrorResponse {
                error: error.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

/// Error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CurrentBlockResponse {
    pub current_block: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub address: String,
    pub subscribed: bool,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub address: String,
    pub transactions: Vec<Transaction>,
    pub total_count: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub watermark: Option<u64>,
    pub poller_state: Option<PollerState>,
    pub last_cycle: Option<CycleReport>,
    pub last_error: Option<String>,
    pub subscriptions: usize,
    pub indexed_transactions: usize,
}

/// `?address=` query parameter shared by the address endpoints
#[derive(Debug, Deserialize)]
pub struct AddressQuery {
    pub address: Option<String>,
}

impl AddressQuery {
    /// The validated, normalized address.
    fn address(&self) -> Result<String, ApiError> {
        let raw = self
            .address
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| ValidationError::MissingParameter("address".to_string()))?;
        validate_address(raw)?;
        Ok(normalize_address(raw))
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Storage>,
    pub poller: Option<PollerHandle>,
}

impl AppState {
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self { store, poller: None }
    }

    pub fn with_poller(mut self, poller: PollerHandle) -> Self {
        self.poller = Some(poller);
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/getCurrentBlock", get(get_current_block))
        .route("/subscribe", get(subscribe))
        .route("/unsubscribe", get(unsubscribe))
        .route("/getTransactions", get(get_transactions))
        .route("/status", get(get_status))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}

/// HTTP API server
pub struct ApiServer {
    state: AppState,
    pub host: String,
    pub port: u16,
}

impl ApiServer {
    pub fn new(state: AppState, host: String, port: u16) -> Self {
        Self { state, host, port }
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn start(&self, shutdown: CancellationToken) -> Result<(), ApiError> {
        let app = build_router(self.state.clone());

        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ApiError::Server(format!("Failed to bind to {}: {}", addr, e)))?;

        log::info!("HTTP API server starting on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| ApiError::Server(format!("Server error: {}", e)))?;

        log::info!("HTTP API server stopped");
        Ok(())
    }
}

/// GET /getCurrentBlock - Highest fully processed block
pub async fn get_current_block(State(state): State<AppState>) -> Json<CurrentBlockResponse> {
    Json(CurrentBlockResponse {
        current_block: state.store.get_watermark(),
    })
}

/// GET /subscribe?address=
pub async fn subscribe(
    Query(params): Query<AddressQuery>,
    State(state): State<AppState>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let address = params.address()?;
    if state.store.add_subscription(&address) {
        MetricsLogger::log_subscription_change(&address, true);
    }

    Ok(Json(SubscriptionResponse {
        address,
        subscribed: true,
    }))
}

/// GET /unsubscribe?address=
pub async fn unsubscribe(
    Query(params): Query<AddressQuery>,
    State(state): State<AppState>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let address = params.address()?;
    if state.store.remove_subscription(&address) {
        MetricsLogger::log_subscription_change(&address, false);
    }

    Ok(Json(SubscriptionResponse {
        address,
        subscribed: false,
    }))
}

/// GET /getTransactions?address= - Indexed history, oldest first
pub async fn get_transactions(
    Query(params): Query<AddressQuery>,
    State(state): State<AppState>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let address = params.address()?;
    let transactions = state.store.get_transactions_for(&address);

    Ok(Json(TransactionsResponse {
        address,
        total_count: transactions.len(),
        transactions,
    }))
}

/// GET /status - Watermark, poller state and store counts
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let stats = state.store.stats();
    let poller = state.poller.as_ref().map(PollerHandle::status);

    let status = match poller.as_ref().map(|p| p.state) {
        Some(PollerState::Stopped) => "stopped",
        Some(PollerState::Uninitialized) => "starting",
        _ => "healthy",
    };

    Json(StatusResponse {
        status: status.to_string(),
        watermark: stats.watermark,
        poller_state: poller.as_ref().map(|p| p.state),
        last_cycle: poller.as_ref().and_then(|p| p.last_cycle.clone()),
        last_error: poller.and_then(|p| p.last_error),
        subscriptions: stats.subscriptions,
        indexed_transactions: stats.indexed_transactions,
    })
}
