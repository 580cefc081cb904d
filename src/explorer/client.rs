use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bitcoin::{Transaction, Txid};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::cache::{CacheStats, RawTransactionCache};
use crate::config::ExplorerConfig;
use crate::errors::{BroadcastRejection, ExplorerError, ExplorerResult};
use crate::retry::{execute_with_timeout, RetryPolicy};

/// Explorer request types for the async worker pattern
#[derive(Debug)]
pub enum ExplorerRequest {
    GetRawTransaction {
        txid: Txid,
        tx: oneshot::Sender<ExplorerResult<String>>,
    },
    ListUnspent {
        address: String,
        tx: oneshot::Sender<ExplorerResult<Vec<Unspent>>>,
    },
    Broadcast {
        raw_hex: String,
        tx: oneshot::Sender<ExplorerResult<Txid>>,
    },
}

/// One spendable output as listed by the explorer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unspent {
    pub tx_hash: String,
    pub tx_pos: u32,
    pub value: u64,
    #[serde(default)]
    pub height: i64,
}

/// Classify the explorer's opaque broadcast failure text
pub fn classify_broadcast_error(message: &str) -> BroadcastRejection {
    let lower = message.to_lowercase();
    if lower.contains("insufficient fee")
        || lower.contains("insufficient priority")
        || lower.contains("min relay fee")
        || lower.contains("mempool min fee")
    {
        BroadcastRejection::InsufficientFee
    } else if lower.contains("missing inputs")
        || lower.contains("missing-inputs")
        || lower.contains("missingorspent")
    {
        BroadcastRejection::MissingInputs
    } else if lower.contains("already in chain")
        || lower.contains("already known")
        || lower.contains("txn-already-known")
        || lower.contains("txn-already-in-mempool")
    {
        BroadcastRejection::AlreadyInChain
    } else {
        BroadcastRejection::Other(message.trim().to_string())
    }
}

/// Block explorer client with retry logic and async worker pattern
pub struct ExplorerClient {
    request_tx: mpsc::Sender<ExplorerRequest>,
    error_count: Arc<AtomicU64>,
    cache: RawTransactionCache,
}

impl ExplorerClient {
    /// Create a new explorer client and spawn the worker task
    pub fn new(config: ExplorerConfig) -> ExplorerResult<Self> {
        let (request_tx, request_rx) = mpsc::channel(100);
        let error_count = Arc::new(AtomicU64::new(0));
        let cache = RawTransactionCache::new(config.cache_capacity);

        let http = reqwest::Client::builder().build().map_err(|e| {
            ExplorerError::ConnectionFailed(format!("Failed to build HTTP client: {}", e))
        })?;

        let worker = ExplorerWorker::new(config, http, Arc::clone(&error_count), cache.clone());
        tokio::spawn(worker.run(request_rx));

        Ok(Self {
            request_tx,
            error_count,
            cache,
        })
    }

    /// Raw transaction hex by id, served from cache when already fetched
    pub async fn get_raw_transaction(&self, txid: &str) -> ExplorerResult<String> {
        let txid = Txid::from_str(txid).map_err(|_| ExplorerError::InvalidTxid {
            txid: txid.to_string(),
        })?;
        if let Some(cached) = self.cache.get(&txid) {
            return Ok(cached);
        }

        let (tx, rx) = oneshot::channel();
        self.send(ExplorerRequest::GetRawTransaction { txid, tx })
            .await?;
        Self::receive(rx).await
    }

    /// Fetch and decode a transaction
    pub async fn get_transaction(&self, txid: &str) -> ExplorerResult<Transaction> {
        let raw_hex = self.get_raw_transaction(txid).await?;
        let bytes = hex::decode(raw_hex.trim()).map_err(|e| {
            ExplorerError::InvalidResponse(format!("raw transaction is not hex: {}", e))
        })?;
        bitcoin::consensus::deserialize(&bytes).map_err(|e| {
            ExplorerError::InvalidResponse(format!("Failed to deserialise raw transaction: {}", e))
        })
    }

    pub async fn list_unspent(&self, address: &str) -> ExplorerResult<Vec<Unspent>> {
        let (tx, rx) = oneshot::channel();
        self.send(ExplorerRequest::ListUnspent {
            address: address.to_string(),
            tx,
        })
        .await?;
        Self::receive(rx).await
    }

    /// Broadcast a raw transaction, returning its id
    pub async fn broadcast(&self, raw_hex: &str) -> ExplorerResult<Txid> {
        let (tx, rx) = oneshot::channel();
        self.send(ExplorerRequest::Broadcast {
            raw_hex: raw_hex.trim().to_string(),
            tx,
        })
        .await?;
        Self::receive(rx).await
    }

    pub fn get_error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        self.cache.get_stats()
    }

    async fn send(&self, request: ExplorerRequest) -> ExplorerResult<()> {
        self.request_tx.send(request).await.map_err(|_| {
            ExplorerError::ConnectionFailed("Failed to send explorer request".to_string())
        })
    }

    async fn receive<T>(rx: oneshot::Receiver<ExplorerResult<T>>) -> ExplorerResult<T> {
        rx.await.map_err(|_| {
            ExplorerError::ConnectionFailed("Explorer worker channel closed".to_string())
        })?
    }
}

/// Outcome of one explorer attempt that did not succeed
enum AttemptError {
    Transient(String),
    Fatal(ExplorerError),
}

/// Explorer worker that handles all HTTP communication in a dedicated task
#[derive(Clone)]
struct ExplorerWorker {
    http: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
    semaphore: Arc<Semaphore>,
    error_count: Arc<AtomicU64>,
    cache: RawTransactionCache,
    concurrent_requests: usize,
}

impl ExplorerWorker {
    fn new(
        config: ExplorerConfig,
        http: reqwest::Client,
        error_count: Arc<AtomicU64>,
        cache: RawTransactionCache,
    ) -> Self {
        Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            policy: RetryPolicy::from(&config),
            semaphore: Arc::new(Semaphore::new(config.concurrent_requests)),
            error_count,
            cache,
            concurrent_requests: config.concurrent_requests,
        }
    }

    async fn run(self, mut request_rx: mpsc::Receiver<ExplorerRequest>) {
        info!(
            "Explorer worker started with {} concurrent request limit",
            self.concurrent_requests
        );

        while let Some(request) = request_rx.recv().await {
            let worker = self.clone();

            // Spawn each request in its own task for parallel processing
            tokio::spawn(async move {
                worker.handle_request(request).await;
            });
        }

        info!("Explorer worker shutting down");
    }

    async fn handle_request(&self, request: ExplorerRequest) {
        match request {
            ExplorerRequest::GetRawTransaction { txid, tx } => {
                let result = self.get_raw_transaction(txid).await;
                let _ = tx.send(result);
            }
            ExplorerRequest::ListUnspent { address, tx } => {
                let result = self.list_unspent(&address).await;
                let _ = tx.send(result);
            }
            ExplorerRequest::Broadcast { raw_hex, tx } => {
                let result = self.broadcast(&raw_hex).await;
                let _ = tx.send(result);
            }
        }
    }

    async fn get_raw_transaction(&self, txid: Txid) -> ExplorerResult<String> {
        let url = format!("{}/tx/{}/hex", self.base_url, txid);
        let url = url.as_str();
        let operation = format!("get_raw_transaction({})", txid);

        let raw_hex = self
            .with_retry(&operation, move || async move {
                let response = self.http.get(url).send().await.map_err(transient)?;
                if response.status() == StatusCode::NOT_FOUND {
                    return Err(AttemptError::Fatal(ExplorerError::TransactionNotFound {
                        txid: txid.to_string(),
                    }));
                }
                let response = check_status(response, "get_raw_transaction").await?;
                let body = response.text().await.map_err(transient)?;
                Ok(body.trim().trim_matches('"').to_string())
            })
            .await?;

        self.cache.put(txid, raw_hex.clone());
        Ok(raw_hex)
    }

    async fn list_unspent(&self, address: &str) -> ExplorerResult<Vec<Unspent>> {
        let url = format!("{}/address/{}/unspent", self.base_url, address);
        let url = url.as_str();
        let operation = format!("list_unspent({})", address);

        self.with_retry(&operation, move || async move {
            let response = self.http.get(url).send().await.map_err(transient)?;
            let response = check_status(response, "list_unspent").await?;
            response.json::<Vec<Unspent>>().await.map_err(|e| {
                AttemptError::Fatal(ExplorerError::InvalidResponse(format!(
                    "unspent list: {}",
                    e
                )))
            })
        })
        .await
    }

    async fn broadcast(&self, raw_hex: &str) -> ExplorerResult<Txid> {
        let url = format!("{}/tx/raw", self.base_url);
        let url = url.as_str();
        let local_txid = local_txid(raw_hex);
        let local_txid = local_txid.as_ref();
        let sent = AtomicUsize::new(0);
        let sent = &sent;

        self.with_retry("broadcast", move || async move {
            let resend = sent.fetch_add(1, Ordering::SeqCst) > 0;
            let response = self
                .http
                .post(url)
                .json(&json!({ "txhex": raw_hex }))
                .send()
                .await
                .map_err(transient)?;

            let status = response.status();
            if is_transient_status(status) {
                return Err(AttemptError::Transient(format!("HTTP {}", status)));
            }
            let body = response.text().await.map_err(transient)?;
            if !status.is_success() {
                let rejection = classify_broadcast_error(&body);
                // An earlier attempt may have reached the node before its response was lost
                if let (true, BroadcastRejection::AlreadyInChain, Some(txid)) =
                    (resend, &rejection, local_txid)
                {
                    info!("Broadcast of {} landed on an earlier attempt", txid);
                    return Ok(*txid);
                }
                return Err(AttemptError::Fatal(ExplorerError::BroadcastRejected(
                    rejection,
                )));
            }

            let txid = body.trim().trim_matches('"');
            Txid::from_str(txid).map_err(|_| {
                AttemptError::Fatal(ExplorerError::BroadcastRejected(classify_broadcast_error(
                    txid,
                )))
            })
        })
        .await
    }

    /// Run `attempt` under the retry policy, one semaphore permit per call
    async fn with_retry<T, F, Fut>(&self, operation: &str, attempt: F) -> ExplorerResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let _permit = self.semaphore.acquire().await.map_err(|e| {
            ExplorerError::ConnectionFailed(format!("Failed to acquire semaphore: {}", e))
        })?;
        let mut attempts = 0;
        let mut backoff = self.policy.initial_backoff();

        while attempts < self.policy.max_retries {
            attempts += 1;
            let timed_out = match execute_with_timeout(self.policy.timeout_seconds, attempt()).await
            {
                Ok(Ok(value)) => {
                    if attempts > 1 {
                        debug!("{} succeeded after {} attempts", operation, attempts);
                    }
                    return Ok(value);
                }
                Ok(Err(AttemptError::Fatal(e))) => {
                    self.error_count.fetch_add(1, Ordering::Relaxed);
                    debug!("{} failed (non-retryable): {}", operation, e);
                    return Err(e);
                }
                Ok(Err(AttemptError::Transient(message))) => {
                    self.error_count.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Explorer attempt {} failed for {}, retrying in {:?}: {}",
                        attempts, operation, backoff, message
                    );
                    false
                }
                Err(_) => {
                    self.error_count.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Explorer timeout for {} on attempt {}, retrying in {:?}",
                        operation, attempts, backoff
                    );
                    true
                }
            };

            if attempts >= self.policy.max_retries {
                error!("{} failed after {} attempts", operation, attempts);
                return Err(if timed_out {
                    ExplorerError::Timeout {
                        timeout_seconds: self.policy.timeout_seconds,
                        operation: operation.to_string(),
                    }
                } else {
                    ExplorerError::MaxRetriesExceeded {
                        operation: operation.to_string(),
                    }
                });
            }

            sleep(backoff).await;
            backoff = self.policy.next_backoff(backoff);
        }

        Err(ExplorerError::MaxRetriesExceeded {
            operation: operation.to_string(),
        })
    }
}

fn local_txid(raw_hex: &str) -> Option<Txid> {
    let bytes = hex::decode(raw_hex.trim()).ok()?;
    let tx: Transaction = bitcoin::consensus::deserialize(&bytes).ok()?;
    Some(tx.compute_txid())
}

fn transient(e: reqwest::Error) -> AttemptError {
    AttemptError::Transient(e.to_string())
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

async fn check_status(
    response: reqwest::Response,
    operation: &str,
) -> Result<reqwest::Response, AttemptError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if is_transient_status(status) {
        return Err(AttemptError::Transient(format!("HTTP {}", status)));
    }
    let message = response.text().await.unwrap_or_default();
    Err(AttemptError::Fatal(ExplorerError::RequestFailed {
        operation: operation.to_string(),
        status: status.as_u16(),
        message,
    }))
}
