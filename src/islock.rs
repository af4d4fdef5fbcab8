//! InstantSend Lock Client
//!
//! Fetches the quorum signature over a broadcast transaction through the
//! `getislocks` JSON-RPC method. A missing lock is polled for; running out
//! of time here is fatal for the pipeline, unlike the deposit wait.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::time::{sleep, Duration, Instant};
use tracing::warn;

use crate::codec::decode_hex;

/// Poll cadence for the islock endpoint
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Default overall wait
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Islock client errors
#[derive(Debug, thiserror::Error)]
pub enum IslockError {
    #[error("http request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("islock rpc returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("islock rpc error: {0}")]
    Rpc(String),

    #[error("invalid islock hex: {0}")]
    InvalidHex(String),

    #[error("no InstantSend lock for {txid} after {elapsed_ms} ms")]
    Timeout { txid: String, elapsed_ms: u64 },
}

impl IslockError {
    pub fn is_retryable(&self) -> bool {
        match self {
            IslockError::Transport(_) => true,
            IslockError::Status { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Vec<Option<IslockEntry>>>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct IslockEntry {
    #[serde(default)]
    txid: Option<String>,
    #[serde(default)]
    hex: Option<String>,
}

/// JSON-RPC client for InstantSend locks
#[derive(Debug, Clone)]
pub struct IslockClient {
    client: Client,
    url: String,
}

impl IslockClient {
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
        }
    }

    /// One `getislocks` call; `Ok(None)` means no lock is known yet
    pub async fn get_islock(&self, txid: &str) -> Result<Option<Vec<u8>>, IslockError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getislocks",
            "params": [[txid]],
        });

        let resp = self.client.post(&self.url).json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            return Err(IslockError::Status {
                status,
                body: excerpt,
            });
        }

        let parsed: RpcResponse = resp.json().await?;
        if let Some(err) = parsed.error {
            return Err(IslockError::Rpc(err.message));
        }

        for entry in parsed.result.unwrap_or_default().into_iter().flatten() {
            let matches_txid = entry.txid.as_deref() == Some(txid);
            if let Some(hex) = entry.hex {
                if matches_txid && !hex.is_empty() {
                    let bytes =
                        decode_hex(&hex).map_err(|e| IslockError::InvalidHex(e.to_string()))?;
                    return Ok(Some(bytes));
                }
            }
        }

        Ok(None)
    }

    /// Poll until the quorum lock appears or the timeout elapses
    pub async fn wait_for_islock(
        &self,
        txid: &str,
        timeout: Duration,
    ) -> Result<Vec<u8>, IslockError> {
        let started = Instant::now();
        let deadline = started + timeout;

        loop {
            match self.get_islock(txid).await {
                Ok(Some(bytes)) => return Ok(bytes),
                Ok(None) => {}
                Err(e) if e.is_retryable() => {
                    warn!(target: "bridge::islock", error = %e, "islock poll failed");
                }
                Err(e) => return Err(e),
            }

            if Instant::now() + POLL_INTERVAL >= deadline {
                return Err(IslockError::Timeout {
                    txid: txid.to_string(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}
