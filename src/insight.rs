//! Insight API Client
//!
//! Polls the network's Insight instance for incoming UTXOs, broadcasts the
//! signed asset-lock transaction and tracks its status. Deposit waiting
//! returns a value on timeout rather than an error so the state machine
//! can branch into its recheck path.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, warn};

/// Insight client errors
#[derive(Debug, thiserror::Error)]
pub enum InsightError {
    #[error("http request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("insight returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no confirmation for {txid} after {elapsed_ms} ms")]
    ConfirmationTimeout { txid: String, elapsed_ms: u64 },
}

impl InsightError {
    /// Transport failures and throttling/server statuses are transient
    pub fn is_retryable(&self) -> bool {
        match self {
            InsightError::Transport(_) => true,
            InsightError::Status { status, .. } => {
                matches!(status, 429 | 500 | 502 | 503 | 504)
            }
            InsightError::ConfirmationTimeout { .. } => false,
        }
    }
}

/// An unspent output on the deposit address. The txid is hex in display
/// byte order, exactly as Insight returns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    /// Value in duffs
    pub value: u64,
    /// Locking script, hex
    pub script_pubkey: String,
    pub confirmations: u32,
}

/// Transaction status as reported by Insight
#[derive(Debug, Clone, Deserialize)]
pub struct TxStatus {
    pub txid: String,
    #[serde(default)]
    pub confirmations: u32,
    #[serde(default)]
    pub txlock: bool,
}

/// Result of waiting for a deposit
#[derive(Debug, Clone)]
pub struct DepositWait {
    /// The selected UTXO, if the aggregate reached the minimum
    pub utxo: Option<Utxo>,
    /// Aggregate value seen on the address, in duffs
    pub total_amount: u64,
    pub timed_out: bool,
}

#[derive(Debug, Deserialize)]
struct InsightUtxo {
    txid: String,
    vout: u32,
    satoshis: u64,
    #[serde(rename = "scriptPubKey")]
    script_pubkey: String,
    #[serde(default)]
    confirmations: u32,
}

#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    txid: String,
}

/// Insight HTTP client
#[derive(Debug, Clone)]
pub struct InsightClient {
    client: Client,
    base_url: String,
}

impl InsightClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List UTXOs on an address
    pub async fn list_utxos(&self, address: &str) -> Result<Vec<Utxo>, InsightError> {
        let url = format!("{}/addr/{}/utxo", self.base_url, address);
        let resp = self.client.get(&url).send().await?;

        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }

        let raw: Vec<InsightUtxo> = resp.json().await?;
        Ok(raw
            .into_iter()
            .map(|u| Utxo {
                txid: u.txid,
                vout: u.vout,
                value: u.satoshis,
                script_pubkey: u.script_pubkey,
                confirmations: u.confirmations,
            })
            .collect())
    }

    /// Broadcast a raw transaction, returning its txid
    pub async fn broadcast(&self, raw_tx_hex: &str) -> Result<String, InsightError> {
        let url = format!("{}/tx/send", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&json!({ "rawtx": raw_tx_hex }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }

        let parsed: BroadcastResponse = resp.json().await?;
        Ok(parsed.txid)
    }

    /// Get transaction status
    pub async fn tx_status(&self, txid: &str) -> Result<TxStatus, InsightError> {
        let url = format!("{}/tx/{}", self.base_url, txid);
        let resp = self.client.get(&url).send().await?;

        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }

        Ok(resp.json().await?)
    }

    /// Wait for a deposit of at least `min_value` duffs on `address`.
    ///
    /// Polls until the aggregate on the address reaches the minimum, then
    /// selects the largest single UTXO that covers it (falling back to the
    /// largest seen). Per-call errors are logged and polling continues; a
    /// timeout performs one final listing and returns `timed_out: true`
    /// with whatever aggregate was observed, never an error. The progress
    /// callback fires on every poll with (remaining ms, current total).
    pub async fn wait_for_utxo(
        &self,
        address: &str,
        min_value: u64,
        timeout: Duration,
        poll_interval: Duration,
        mut on_progress: impl FnMut(u64, u64),
    ) -> DepositWait {
        let deadline = Instant::now() + timeout;
        let mut total_amount = 0u64;

        loop {
            match self.list_utxos(address).await {
                Ok(utxos) => {
                    total_amount = utxos.iter().map(|u| u.value).sum();
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    on_progress(remaining.as_millis() as u64, total_amount);

                    if total_amount >= min_value {
                        let selected = select_utxo(&utxos, min_value);
                        debug!(
                            target: "bridge::insight",
                            address, total_amount, "deposit detected"
                        );
                        return DepositWait {
                            utxo: selected,
                            total_amount,
                            timed_out: false,
                        };
                    }
                }
                Err(e) => {
                    // Transient listing failures must not abort the wait
                    warn!(target: "bridge::insight", error = %e, "utxo poll failed");
                }
            }

            if Instant::now() + poll_interval >= deadline {
                break;
            }
            sleep(poll_interval).await;
        }

        // Final listing; the timeout result stands either way
        if let Ok(utxos) = self.list_utxos(address).await {
            total_amount = utxos.iter().map(|u| u.value).sum();
        }

        DepositWait {
            utxo: None,
            total_amount,
            timed_out: true,
        }
    }

    /// Wait for the broadcast transaction to confirm (or gain an
    /// InstantSend flag). Fatal on timeout, unlike deposit waiting.
    pub async fn wait_for_confirmation(
        &self,
        txid: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<TxStatus, InsightError> {
        let started = Instant::now();
        let deadline = started + timeout;

        loop {
            match self.tx_status(txid).await {
                Ok(status) if status.confirmations >= 1 || status.txlock => return Ok(status),
                Ok(_) => {}
                Err(e) => {
                    warn!(target: "bridge::insight", error = %e, "status poll failed");
                }
            }

            if Instant::now() + poll_interval >= deadline {
                return Err(InsightError::ConfirmationTimeout {
                    txid: txid.to_string(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
            sleep(poll_interval).await;
        }
    }
}

/// Pick the UTXO to consume: the largest single output covering the
/// minimum, otherwise the largest seen
fn select_utxo(utxos: &[Utxo], min_value: u64) -> Option<Utxo> {
    let covering = utxos
        .iter()
        .filter(|u| u.value >= min_value)
        .max_by_key(|u| u.value);

    covering
        .or_else(|| utxos.iter().max_by_key(|u| u.value))
        .cloned()
}

async fn status_error(resp: reqwest::Response) -> InsightError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(200).collect();
    InsightError::Status {
        status,
        body: excerpt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{serve_responses, MockResponse};

    fn utxo(txid: &str, value: u64) -> Utxo {
        Utxo {
            txid: txid.to_string(),
            vout: 0,
            value,
            script_pubkey: String::new(),
            confirmations: 1,
        }
    }

    #[test]
    fn test_select_prefers_single_covering_utxo() {
        let utxos = vec![utxo("a", 100_000), utxo("b", 500_000), utxo("c", 350_000)];
        let selected = select_utxo(&utxos, 300_000).unwrap();
        assert_eq!(selected.txid, "b");
    }

    #[test]
    fn test_select_falls_back_to_largest() {
        // Aggregate covers the minimum but no single UTXO does
        let utxos = vec![utxo("a", 150_000), utxo("b", 200_000)];
        let selected = select_utxo(&utxos, 300_000).unwrap();
        assert_eq!(selected.txid, "b");
    }

    #[test]
    fn test_select_empty() {
        assert!(select_utxo(&[], 300_000).is_none());
    }

    #[tokio::test]
    async fn test_wait_for_utxo_times_out_with_total() {
        // Below-minimum deposit: timed out, but the total is reported
        let body = r#"[{"txid":"aa","vout":0,"satoshis":240000,"scriptPubKey":"76a9","confirmations":0}]"#;
        let base = serve_responses(vec![MockResponse::json(200, body)]).await;
        let client = InsightClient::new(&base);

        let result = client
            .wait_for_utxo(
                "yTest",
                300_000,
                Duration::from_millis(400),
                Duration::from_millis(100),
                |_, _| {},
            )
            .await;

        assert!(result.timed_out);
        assert!(result.utxo.is_none());
        assert_eq!(result.total_amount, 240_000);
    }

    #[tokio::test]
    async fn test_wait_for_utxo_returns_on_sufficient_deposit() {
        let body = r#"[{"txid":"ff","vout":1,"satoshis":500000,"scriptPubKey":"76a9","confirmations":0}]"#;
        let base = serve_responses(vec![MockResponse::json(200, body)]).await;
        let client = InsightClient::new(&base);

        let mut polls = 0u32;
        let result = client
            .wait_for_utxo(
                "yTest",
                300_000,
                Duration::from_secs(5),
                Duration::from_millis(50),
                |_, total| {
                    polls += 1;
                    assert_eq!(total, 500_000);
                },
            )
            .await;

        assert!(!result.timed_out);
        let found = result.utxo.unwrap();
        assert_eq!(found.txid, "ff");
        assert_eq!(found.vout, 1);
        assert_eq!(result.total_amount, 500_000);
        assert_eq!(polls, 1);
    }

    #[tokio::test]
    async fn test_wait_survives_transient_errors() {
        // First poll fails with 500, second succeeds
        let good = r#"[{"txid":"ee","vout":0,"satoshis":400000,"scriptPubKey":"76a9","confirmations":0}]"#;
        let base = serve_responses(vec![
            MockResponse::json(500, "{}"),
            MockResponse::json(200, good),
        ])
        .await;
        let client = InsightClient::new(&base);

        let result = client
            .wait_for_utxo(
                "yTest",
                300_000,
                Duration::from_secs(5),
                Duration::from_millis(50),
                |_, _| {},
            )
            .await;

        assert!(!result.timed_out);
        assert_eq!(result.utxo.unwrap().txid, "ee");
    }

    #[tokio::test]
    async fn test_broadcast_parses_txid() {
        let base = serve_responses(vec![MockResponse::json(200, r#"{"txid":"abc123"}"#)]).await;
        let client = InsightClient::new(&base);
        assert_eq!(client.broadcast("030008").await.unwrap(), "abc123");
    }

    #[tokio::test]
    async fn test_broadcast_surfaces_status() {
        let base =
            serve_responses(vec![MockResponse::json(400, r#"{"error":"tx rejected"}"#)]).await;
        let client = InsightClient::new(&base);
        match client.broadcast("00").await {
            Err(InsightError::Status { status: 400, body }) => assert!(body.contains("rejected")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_confirmation_timeout() {
        let body = r#"{"txid":"aa","confirmations":0,"txlock":false}"#;
        let base = serve_responses(vec![MockResponse::json(200, body)]).await;
        let client = InsightClient::new(&base);

        let result = client
            .wait_for_confirmation("aa", Duration::from_millis(200), Duration::from_millis(50))
            .await;
        assert!(matches!(
            result,
            Err(InsightError::ConfirmationTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_confirmation_via_txlock() {
        let body = r#"{"txid":"aa","confirmations":0,"txlock":true}"#;
        let base = serve_responses(vec![MockResponse::json(200, body)]).await;
        let client = InsightClient::new(&base);

        let status = client
            .wait_for_confirmation("aa", Duration::from_secs(2), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(status.txlock);
    }

    #[test]
    fn test_retryable_classification() {
        for code in [429u16, 500, 502, 503, 504] {
            assert!(InsightError::Status {
                status: code,
                body: String::new()
            }
            .is_retryable());
        }
        for code in [400u16, 404, 409] {
            assert!(!InsightError::Status {
                status: code,
                body: String::new()
            }
            .is_retryable());
        }
    }
}
