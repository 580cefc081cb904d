use std::fmt;

use thiserror::Error;

/// Application-wide error type - single point of truth
#[derive(Error, Debug)]
pub enum AppError {
    /// Token protocol failures (codec, lineage, funds, attestation, authorization)
    #[error("{0}")]
    Token(#[from] TokenError),

    /// Explorer (raw transaction lookup / broadcast) operations
    #[error("Explorer error: {0}")]
    Explorer(#[from] ExplorerError),

    /// File I/O operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration issues
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation/parsing of user input
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl AppError {
    /// Stable error kind printed by the CLI before the detail
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Token(e) => e.kind(),
            AppError::Explorer(_) => "ExplorerError",
            AppError::Io(_) => "IoError",
            AppError::Config(_) => "ConfigError",
            AppError::InvalidData(_) => "InvalidData",
        }
    }
}

/// Covenant clause that failed local verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationClause {
    /// Public key does not hash to the consumed owner/issuer
    WrongSigner,
    /// Signature does not verify over the recomputed sighash preimage
    InvalidSignature,
    /// Token id was not carried (or incremented) as the covenant requires
    StaleTokenId,
    /// A produced token output names a different genesis binding
    WrongGenesis,
    /// Spend-proof does not describe the consumed output's transaction
    ProofMismatch,
    /// Spend-proof required but absent
    MissingProof,
    /// Payment output of a buy does not credit the seller exactly
    WrongPayment,
    /// Inputs do not equal outputs + fee + change
    FeeMismatch,
    /// Token output present where none (or another state) is allowed
    UnexpectedTokenOutput,
    /// Consumed input does not match the transaction being authorized
    WrongInput,
}

impl fmt::Display for AuthorizationClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthorizationClause::WrongSigner => "wrong signer",
            AuthorizationClause::InvalidSignature => "invalid signature",
            AuthorizationClause::StaleTokenId => "stale token id",
            AuthorizationClause::WrongGenesis => "wrong genesis",
            AuthorizationClause::ProofMismatch => "spend-proof mismatch",
            AuthorizationClause::MissingProof => "missing spend-proof",
            AuthorizationClause::WrongPayment => "wrong payment",
            AuthorizationClause::FeeMismatch => "fee mismatch",
            AuthorizationClause::UnexpectedTokenOutput => "unexpected token output",
            AuthorizationClause::WrongInput => "wrong input",
        };
        f.write_str(name)
    }
}

/// Token protocol errors
///
/// Validation errors (`MalformedPayload`, `LineageMismatch`) are raised before any
/// network call. `AttestationUnavailable` is the only retryable class.
#[derive(Error, Debug)]
pub enum TokenError {
    /// Payload or genesis bytes could not be decoded
    #[error("malformed payload: {reason}")]
    MalformedPayload { reason: String },

    /// Genesis binding, token id or outpoint discontinuity
    #[error("lineage mismatch on {field}: expected {expected}, got {actual}")]
    LineageMismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },

    /// Computed change is negative
    #[error("insufficient funds: need {needed} sats, have {available} sats")]
    InsufficientFunds { needed: u64, available: u64 },

    /// Oracle could not be reached after the retry budget
    #[error("attestation unavailable after {attempts} attempts: {message}")]
    AttestationUnavailable { attempts: usize, message: String },

    /// Oracle answered with something that fails local validation
    #[error("attestation rejected: {reason}")]
    AttestationRejected { reason: String },

    /// Local covenant verification failed
    #[error("authorization failed ({clause}): {detail}")]
    AuthorizationFailed {
        clause: AuthorizationClause,
        detail: String,
    },
}

impl TokenError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        TokenError::MalformedPayload {
            reason: reason.into(),
        }
    }

    pub fn mismatch(
        field: &'static str,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        TokenError::LineageMismatch {
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn unauthorized(clause: AuthorizationClause, detail: impl Into<String>) -> Self {
        TokenError::AuthorizationFailed {
            clause,
            detail: detail.into(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        TokenError::AttestationRejected {
            reason: reason.into(),
        }
    }

    /// Stable kind name, printed by the CLI
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::MalformedPayload { .. } => "MalformedPayload",
            TokenError::LineageMismatch { .. } => "LineageMismatch",
            TokenError::InsufficientFunds { .. } => "InsufficientFunds",
            TokenError::AttestationUnavailable { .. } => "AttestationUnavailable",
            TokenError::AttestationRejected { .. } => "AttestationRejected",
            TokenError::AuthorizationFailed { .. } => "AuthorizationFailed",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, TokenError::AttestationUnavailable { .. })
    }

    /// Failing clause for `AuthorizationFailed`
    pub fn clause(&self) -> Option<AuthorizationClause> {
        match self {
            TokenError::AuthorizationFailed { clause, .. } => Some(*clause),
            _ => None,
        }
    }
}

/// Broadcast failure reported by the explorer, classified from its opaque message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastRejection {
    InsufficientFee,
    MissingInputs,
    AlreadyInChain,
    Other(String),
}

impl fmt::Display for BroadcastRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BroadcastRejection::InsufficientFee => f.write_str("insufficient fee"),
            BroadcastRejection::MissingInputs => f.write_str("missing inputs"),
            BroadcastRejection::AlreadyInChain => f.write_str("already in chain"),
            BroadcastRejection::Other(message) => write!(f, "{}", message),
        }
    }
}

/// Explorer error types
#[derive(Error, Debug)]
pub enum ExplorerError {
    /// Failed to reach the explorer
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// TXID string format is invalid (not valid hex or wrong length)
    #[error("Invalid txid: {txid}")]
    InvalidTxid { txid: String },

    /// HTTP call returned a non-success status
    #[error("Request failed: {operation} - HTTP {status}: {message}")]
    RequestFailed {
        operation: String,
        status: u16,
        message: String,
    },

    /// Retry limit exceeded
    #[error("Max retries exceeded: {operation}")]
    MaxRetriesExceeded { operation: String },

    /// Request timed out
    #[error("Request timeout: {timeout_seconds}s for {operation}")]
    Timeout {
        timeout_seconds: u64,
        operation: String,
    },

    /// Unexpected or malformed response data
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Transaction not known to the explorer
    #[error("Transaction not found: {txid}")]
    TransactionNotFound { txid: String },

    /// Broadcast refused by the network
    #[error("Broadcast rejected: {0}")]
    BroadcastRejected(BroadcastRejection),
}

/// Application-wide result type - single point of truth
pub type AppResult<T> = Result<T, AppError>;

/// Result type for token protocol operations
pub type TokenResult<T> = Result<T, TokenError>;

/// Result type for explorer operations
pub type ExplorerResult<T> = Result<T, ExplorerError>;

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidData(format!("JSON error: {}", err))
    }
}

impl From<hex::FromHexError> for AppError {
    fn from(err: hex::FromHexError) -> Self {
        AppError::InvalidData(format!("hex error: {}", err))
    }
}
