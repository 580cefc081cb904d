use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use num_bigint::BigUint;
use reqwest::StatusCode;
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::proof::{OracleResponse, SpendProof};
use super::rabin;
use super::request::SpendProofRequest;
use crate::config::OracleConfig;
use crate::errors::{AppError, AppResult, TokenError, TokenResult};
use crate::retry::{execute_with_timeout, RetryPolicy};

/// Outcome of a single oracle attempt that did not produce a proof
#[derive(Debug)]
enum AttemptError {
    /// Network failure, 5xx or 429: worth another attempt
    Transient(String),
    /// The oracle answered and the answer is unusable
    Rejected(TokenError),
}

/// Spend-proof oracle client with retry and per-attempt timeout
#[derive(Clone)]
pub struct SpendProofClient {
    http: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
    rabin_pubkey: Option<BigUint>,
    error_count: Arc<AtomicU64>,
}

impl SpendProofClient {
    pub fn new(config: &OracleConfig) -> AppResult<Self> {
        let rabin_pubkey = match &config.rabin_pubkey {
            Some(hex_modulus) => Some(
                rabin::parse_pubkey(hex_modulus).map_err(|e| AppError::Config(e.to_string()))?,
            ),
            None => {
                warn!("No oracle Rabin public key configured; proofs are checked by content only");
                None
            }
        };
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            policy: RetryPolicy::from(config),
            rabin_pubkey,
            error_count: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Request a fresh attestation for `request`
    ///
    /// Transient failures are retried with exponential backoff and end in
    /// `AttestationUnavailable`; an answer that fails validation ends in
    /// `AttestationRejected` without another attempt.
    pub async fn request_proof(&self, request: &SpendProofRequest) -> TokenResult<SpendProof> {
        let mut attempts = 0;
        let mut backoff = self.policy.initial_backoff();
        let mut last_error = String::new();

        while attempts < self.policy.max_retries {
            attempts += 1;

            match execute_with_timeout(self.policy.timeout_seconds, self.attempt(request)).await {
                Ok(Ok(proof)) => {
                    if attempts > 1 {
                        debug!(
                            "Spend-proof for {} obtained after {} attempts",
                            request.key, attempts
                        );
                    }
                    info!("Received spend-proof for {}", request.key);
                    return Ok(proof);
                }
                Ok(Err(AttemptError::Rejected(e))) => {
                    self.error_count.fetch_add(1, Ordering::Relaxed);
                    error!("Spend-proof for {} rejected: {}", request.key, e);
                    return Err(e);
                }
                Ok(Err(AttemptError::Transient(message))) => {
                    self.error_count.fetch_add(1, Ordering::Relaxed);
                    last_error = message;
                }
                Err(_) => {
                    self.error_count.fetch_add(1, Ordering::Relaxed);
                    last_error = format!("timed out after {}s", self.policy.timeout_seconds);
                }
            }

            if attempts >= self.policy.max_retries {
                break;
            }
            warn!(
                "Oracle attempt {} for {} failed, retrying in {:?}: {}",
                attempts, request.key, backoff, last_error
            );
            sleep(backoff).await;
            backoff = self.policy.next_backoff(backoff);
        }

        error!(
            "Spend-proof for {} unavailable after {} attempts: {}",
            request.key, attempts, last_error
        );
        Err(TokenError::AttestationUnavailable {
            attempts,
            message: last_error,
        })
    }

    async fn attempt(&self, request: &SpendProofRequest) -> Result<SpendProof, AttemptError> {
        let url = format!("{}/{}", self.base_url, request.path());
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .json(&json!({
                "txHex": request.proof_tx_hex,
                "byTxHex": request.subject_tx_hex,
            }))
            .send()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::Transient(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Rejected(TokenError::rejected(format!(
                "HTTP {}: {}",
                status, body
            ))));
        }

        let body: OracleResponse = response.json().await.map_err(|e| {
            AttemptError::Rejected(TokenError::rejected(format!(
                "undecodable oracle response: {}",
                e
            )))
        })?;

        let proof = body
            .into_signature()
            .and_then(|raw| SpendProof::from_signature(request.key, &raw))
            .map_err(AttemptError::Rejected)?;
        proof
            .validate(request, self.rabin_pubkey.as_ref())
            .map_err(AttemptError::Rejected)?;
        Ok(proof)
    }

    /// Number of failed attempts across all requests
    pub fn get_error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
