// ABOUTME: Minimal Ethereum JSON-RPC client for read-only contract calls
// ABOUTME: Sends eth_call against the latest block and surfaces RPC errors with context

use anyhow::{Context, Result};
use raduno_core::abi;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

pub struct RpcClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Raw JSON-RPC call returning the `result` member
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("RPC request {} failed", method))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("RPC {} returned HTTP {}: {}", method, status, text);
        }

        let parsed: RpcResponse = response
            .json()
            .await
            .with_context(|| format!("Invalid JSON-RPC response for {}", method))?;

        if let Some(err) = parsed.error {
            anyhow::bail!("RPC {} error {}: {}", method, err.code, err.message);
        }
        parsed
            .result
            .with_context(|| format!("RPC {} returned no result", method))
    }

    /// `eth_call` against the latest block; returns the raw return data
    pub async fn eth_call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>> {
        let params = json!([{ "to": to, "data": abi::to_hex(data) }, "latest"]);
        let result = self.request("eth_call", params).await?;
        let hex = result
            .as_str()
            .context("eth_call result is not a hex string")?;
        abi::from_hex(hex).with_context(|| format!("eth_call to {} returned invalid hex", to))
    }
}
