use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::blockchain::ChainSource;
use crate::error::SourceError;
use crate::logging::{LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::{parse_hex_quantity, to_hex_quantity, Block};

pub const DEFAULT_REQUEST_ID: u64 = 83;
const METHOD_BLOCK_NUMBER: &str = "eth_blockNumber";
const METHOD_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Vec<Value>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Ethereum JSON-RPC chain source over HTTP.
#[derive(Clone)]
pub struct RpcClient {
    client: Client,
    endpoint: String,
    request_id: u64,
    timeout_seconds: u64,
}

impl RpcClient {
    pub fn new(endpoint: String) -> Result<Self, SourceError> {
        Self::new_with_config(endpoint, 30, DEFAULT_REQUEST_ID)
    }

    pub fn new_with_config(
        endpoint: String,
        timeout_seconds: u64,
        request_id: u64,
    ) -> Result<Self, SourceError> {
        let context = LogContext::new("rpc_client", "initialization")
            .with_metadata("endpoint", json!(endpoint))
            .with_metadata("timeout_seconds", json!(timeout_seconds));
        context.info("Initializing RPC client");

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SourceError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            request_id,
            timeout_seconds,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one JSON-RPC call. `Ok(None)` means the node answered with a null result.
    async fn make_request(&self, method: &str, params: Vec<Value>) -> Result<Option<Value>, SourceError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.request_id,
        };

        LogContext::new("rpc_client", "make_request")
            .with_metadata("method", json!(method))
            .trace(&format!("Sending RPC request: {}", method));

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::Unavailable(format!(
                        "{} timed out after {} seconds",
                        method, self.timeout_seconds
                    ))
                } else if e.is_connect() {
                    SourceError::Unavailable(format!("{} connection failed: {}", method, e))
                } else {
                    SourceError::Unavailable(format!("{} request failed: {}", method, e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Unavailable(format!(
                "{} HTTP error: {} {}",
                method,
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Unavailable(format!("{} response body read failed: {}", method, e)))?;

        let rpc_response: JsonRpcResponse = serde_json::from_slice(&body)
            .map_err(|e| SourceError::Protocol(format!("{} response is not JSON-RPC: {}", method, e)))?;

        if let Some(error) = rpc_response.error {
            return Err(SourceError::Protocol(format!(
                "{} returned error code={}, message={}",
                method, error.code, error.message
            )));
        }

        Ok(rpc_response.result.filter(|value| !value.is_null()))
    }

    async fn fetch_current_height(&self) -> Result<u64, SourceError> {
        let result = self
            .make_request(METHOD_BLOCK_NUMBER, vec![])
            .await?
            .ok_or_else(|| SourceError::Protocol("eth_blockNumber returned no result".to_string()))?;

        let hex = result
            .as_str()
            .ok_or_else(|| SourceError::Protocol("block number is not a string".to_string()))?;

        parse_hex_quantity(hex).map_err(SourceError::Protocol)
    }

    async fn fetch_block(&self, height: u64) -> Result<Block, SourceError> {
        let params = vec![
            Value::String(to_hex_quantity(height)),
            Value::Bool(true), // full transaction objects
        ];

        let result = self
            .make_request(METHOD_BLOCK_BY_NUMBER, params)
            .await?
            .ok_or_else(|| SourceError::Unavailable(format!("block {} is not available yet", height)))?;

        let block: Block = serde_json::from_value(result)
            .map_err(|e| SourceError::Protocol(format!("failed to parse block {}: {}", height, e)))?;

        if block.number != height {
            return Err(SourceError::Protocol(format!(
                "requested block {} but node returned block {}",
                height, block.number
            )));
        }

        LogContext::new("rpc_client", "get_block")
            .with_block_number(height)
            .with_metadata("transaction_count", json!(block.transactions.len()))
            .debug(&format!(
                "Retrieved block {} with {} transactions",
                height,
                block.transactions.len()
            ));

        Ok(block)
    }
}

#[async_trait]
impl ChainSource for RpcClient {
    async fn current_height(&self) -> Result<u64, SourceError> {
        let monitor = PerformanceMonitor::new("rpc_get_current_height");
        let result = self.fetch_current_height().await;
        let duration = monitor.finish_with_result(&result);
        MetricsLogger::log_rpc_call(METHOD_BLOCK_NUMBER, duration, result.is_ok());
        result
    }

    async fn block_at(&self, height: u64) -> Result<Block, SourceError> {
        let monitor = PerformanceMonitor::new("rpc_get_block")
            .with_metadata("block_number", json!(height));
        let result = self.fetch_block(height).await;
        let duration = monitor.finish_with_result(&result);
        MetricsLogger::log_rpc_call(METHOD_BLOCK_BY_NUMBER, duration, result.is_ok());
        result
    }
}
