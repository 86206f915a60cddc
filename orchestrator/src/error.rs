use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a failure should be handled by whoever drives the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input, rejected before any network call.
    Validation,
    /// Rejected by the ledger: expired or reused authorization, wrong signer or role.
    Authorization,
    /// Rejected by the ledger for lack of tokens or allowance.
    Balance,
    /// Relay, RPC or worker trouble. Safe to retry.
    Infrastructure,
    /// Submitted, but no terminal receipt was seen. Re-poll, never resubmit.
    UnknownOutcome,
}

#[derive(Error, Debug)]
pub enum GaslessError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid call data `{data}`: {reason}")]
    InvalidCall { data: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("batch of {0} users exceeds the limit of {max}", max = ledger_std::MAX_BATCH)]
    BatchTooLarge(usize),

    #[error("users and points differ in length ({users} vs {points})")]
    ArrayLengthMismatch { users: usize, points: usize },

    #[error("signer error: {0}")]
    Signer(String),

    /// The ledger program rejected the operation with a named error code.
    #[error("ledger rejected the operation: {code}")]
    Ledger { code: String },

    #[error("operation reverted: {0}")]
    Reverted(String),

    #[error("relay error: {0}")]
    Relay(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("operation {handle} reached no terminal state within {waited:?}")]
    Timeout { handle: String, waited: Duration },

    #[error("worker failed: {0}")]
    Worker(String),

    /// Failure reported by a worker through its result file.
    #[error("operation failed: {reason}")]
    Outcome {
        kind: ErrorKind,
        reason: String,
        handle: Option<String>,
    },

    #[error("store error: {0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GaslessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_)
            | Self::InvalidCall { .. }
            | Self::Config(_)
            | Self::BatchTooLarge(_)
            | Self::ArrayLengthMismatch { .. }
            | Self::Signer(_)
            | Self::Store(_)
            | Self::Json(_) => ErrorKind::Validation,
            Self::Ledger { code } => classify_ledger_error(code),
            Self::Reverted(_)
            | Self::Relay(_)
            | Self::Rpc { .. }
            | Self::Http(_)
            | Self::Worker(_)
            | Self::Io(_) => ErrorKind::Infrastructure,
            Self::Timeout { .. } => ErrorKind::UnknownOutcome,
            Self::Outcome { kind, .. } => *kind,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Infrastructure
    }
}

/// Maps a ledger program error name back onto the failure taxonomy.
pub fn classify_ledger_error(code: &str) -> ErrorKind {
    match code {
        "SignatureExpired" | "NonceAlreadyUsed" | "InvalidSignature" | "InvalidOperator"
        | "InvalidAuthority" => ErrorKind::Authorization,
        "InsufficientBalance"
        | "InsufficientAllowance"
        | "InsufficientWellBalance"
        | "InsufficientWellAllowance" => ErrorKind::Balance,
        _ => ErrorKind::Validation,
    }
}

pub type Result<T> = std::result::Result<T, GaslessError>;
