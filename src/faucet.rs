//! Testnet Faucet Client
//!
//! Optional drip of test funds onto the deposit address. The faucet may
//! advertise a proof-of-work gate: a set of (salt, target) challenges whose
//! solutions are redeemed for a one-shot token attached to the drip
//! request. All requests carry a 30 second client-side deadline.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::codec::encode_hex;
use crate::hash::sha256;

/// Client-side deadline for every faucet request
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Give up on a PoW pair after this many nonces
const MAX_POW_ITERATIONS: u64 = 10_000_000;

/// Faucet client errors
#[derive(Debug, thiserror::Error)]
pub enum FaucetError {
    #[error("http request failed: {0}")]
    Transport(reqwest::Error),

    #[error("faucet request timed out")]
    RequestTimedOut,

    #[error("faucet returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("faucet rate limited, retry after {retry_after_secs} s")]
    RateLimited { retry_after_secs: u64 },

    #[error("proof of work failed: {0}")]
    Pow(String),
}

impl From<reqwest::Error> for FaucetError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FaucetError::RequestTimedOut
        } else {
            FaucetError::Transport(e)
        }
    }
}

impl FaucetError {
    pub fn is_retryable(&self) -> bool {
        match self {
            FaucetError::Transport(_) | FaucetError::RequestTimedOut => true,
            FaucetError::Status { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            // Rate limits carry their own schedule; honour retryAfter instead
            FaucetError::RateLimited { .. } => false,
            FaucetError::Pow(_) => false,
        }
    }
}

/// `GET /api/status` response
#[derive(Debug, Clone, Deserialize)]
pub struct FaucetStatus {
    pub status: String,
    #[serde(rename = "capEndpoint", default)]
    pub cap_endpoint: Option<String>,
}

/// Successful drip
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FaucetDrip {
    pub txid: String,
    pub amount: u64,
    pub address: String,
}

#[derive(Debug, Deserialize)]
struct CapChallenge {
    token: String,
    /// (salt, target-prefix) pairs
    challenge: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct CapToken {
    token: String,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    #[serde(rename = "retryAfter", default)]
    retry_after: Option<u64>,
}

/// Testnet faucet client
#[derive(Debug, Clone)]
pub struct FaucetClient {
    client: Client,
    base_url: String,
}

impl FaucetClient {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Check faucet availability and whether a PoW gate is active
    pub async fn status(&self) -> Result<FaucetStatus, FaucetError> {
        let url = format!("{}/api/status", self.base_url);
        let resp = self.client.get(&url).send().await?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        Ok(resp.json().await?)
    }

    /// Solve the faucet's PoW gate and redeem the solutions for a token
    pub async fn solve_cap_challenge(&self, endpoint: &str) -> Result<String, FaucetError> {
        let endpoint = endpoint.trim_end_matches('/');

        let resp = self
            .client
            .post(format!("{}/challenge", endpoint))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        let challenge: CapChallenge = resp.json().await?;

        let mut solutions = Vec::with_capacity(challenge.challenge.len());
        for (salt, target) in &challenge.challenge {
            let nonce = solve_pow_pair(salt, target).await?;
            solutions.push(json!([salt, target, nonce]));
        }
        debug!(target: "bridge::faucet", pairs = solutions.len(), "pow solved");

        let resp = self
            .client
            .post(format!("{}/redeem", endpoint))
            .json(&json!({ "token": challenge.token, "solutions": solutions }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        let redeemed: CapToken = resp.json().await?;
        Ok(redeemed.token)
    }

    /// Request a drip onto `address`, solving the PoW gate when present
    pub async fn request_funds(
        &self,
        address: &str,
        amount: u64,
    ) -> Result<FaucetDrip, FaucetError> {
        let status = self.status().await?;

        let cap_token = match &status.cap_endpoint {
            Some(endpoint) => Some(self.solve_cap_challenge(endpoint).await?),
            None => None,
        };

        let mut body = json!({ "address": address, "amount": amount });
        if let Some(token) = cap_token {
            body["capToken"] = json!(token);
        }

        let url = format!("{}/api/core-faucet", self.base_url);
        let resp = self.client.post(&url).json(&body).send().await?;

        let http_status = resp.status().as_u16();
        if http_status == 429 {
            let retry_after = resp
                .json::<RateLimitBody>()
                .await
                .ok()
                .and_then(|b| b.retry_after)
                .unwrap_or(60);
            return Err(FaucetError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let drip: FaucetDrip = resp.json().await?;
        info!(target: "bridge::faucet", txid = %drip.txid, amount = drip.amount, "faucet drip");
        Ok(drip)
    }
}

/// Scan nonces until sha256(salt || nonce) starts with the target prefix
async fn solve_pow_pair(salt: &str, target: &str) -> Result<u64, FaucetError> {
    for nonce in 0..MAX_POW_ITERATIONS {
        let digest = sha256(format!("{}{}", salt, nonce).as_bytes());
        if encode_hex(&digest).starts_with(target) {
            return Ok(nonce);
        }
        if nonce % 10_000 == 9_999 {
            tokio::task::yield_now().await;
        }
    }
    Err(FaucetError::Pow(format!(
        "no nonce found for target {}",
        target
    )))
}

async fn error_from_response(resp: reqwest::Response) -> FaucetError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();

    // The faucet reports errors in one of several fields
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            ["error", "message", "detail"].iter().find_map(|key| {
                v.get(key)
                    .and_then(|m| m.as_str())
                    .map(|s| s.to_string())
            })
        })
        .unwrap_or_else(|| body.chars().take(200).collect());

    FaucetError::Status { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{serve_responses, MockResponse};

    #[tokio::test]
    async fn test_pow_pair_small_target() {
        let nonce = solve_pow_pair("abc", "0").await.unwrap();
        let digest = sha256(format!("abc{}", nonce).as_bytes());
        assert!(encode_hex(&digest).starts_with('0'));
    }

    #[tokio::test]
    async fn test_status_without_cap() {
        let base = serve_responses(vec![MockResponse::json(200, r#"{"status":"ok"}"#)]).await;
        let client = FaucetClient::new(&base);

        let status = client.status().await.unwrap();
        assert_eq!(status.status, "ok");
        assert!(status.cap_endpoint.is_none());
    }

    #[tokio::test]
    async fn test_drip_without_cap() {
        let base = serve_responses(vec![
            MockResponse::json(200, r#"{"status":"ok"}"#),
            MockResponse::json(
                200,
                r#"{"txid":"f00d","amount":500000,"address":"yAddr"}"#,
            ),
        ])
        .await;
        let client = FaucetClient::new(&base);

        let drip = client.request_funds("yAddr", 500_000).await.unwrap();
        assert_eq!(drip.txid, "f00d");
        assert_eq!(drip.amount, 500_000);
    }

    #[tokio::test]
    async fn test_rate_limit_surfaces_retry_after() {
        let base = serve_responses(vec![
            MockResponse::json(200, r#"{"status":"ok"}"#),
            MockResponse::json(429, r#"{"retryAfter":120}"#),
        ])
        .await;
        let client = FaucetClient::new(&base);

        match client.request_funds("yAddr", 500_000).await {
            Err(FaucetError::RateLimited { retry_after_secs }) => {
                assert_eq!(retry_after_secs, 120)
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_message_extraction() {
        let base = serve_responses(vec![
            MockResponse::json(200, r#"{"status":"ok"}"#),
            MockResponse::json(400, r#"{"error":"invalid address"}"#),
        ])
        .await;
        let client = FaucetClient::new(&base);

        match client.request_funds("bogus", 500_000).await {
            Err(FaucetError::Status {
                status: 400,
                message,
            }) => assert_eq!(message, "invalid address"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_rate_limit_not_blind_retried() {
        let err = FaucetError::RateLimited {
            retry_after_secs: 60,
        };
        assert!(!err.is_retryable());
        assert!(FaucetError::RequestTimedOut.is_retryable());
    }
}
