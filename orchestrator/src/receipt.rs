//! Receipt polling and normalization.
//!
//! Providers disagree on how they report an outcome. Every recognized shape is
//! listed in the tables below; supporting a new provider means extending them.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::signature::Signature;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::{GaslessError, Result};
use crate::relay::RelayClient;

/// Accepted success encodings, compared after lowercasing strings.
const SUCCESS_ENCODINGS: &[(&str, bool)] = &[
    ("true", true),
    ("1", true),
    ("0x1", true),
    ("success", true),
    ("false", false),
    ("0", false),
    ("0x0", false),
    ("failed", false),
    ("reverted", false),
];

// JSON pointers tried in order for each canonical field
const SUCCESS_FIELDS: &[&str] = &["/success", "/status", "/receipt/status"];
const HASH_FIELDS: &[&str] = &[
    "/transactionHash",
    "/receipt/transactionHash",
    "/txHash",
    "/signature",
    "/transaction/signatures/0",
];
const BLOCK_FIELDS: &[&str] = &["/blockNumber", "/receipt/blockNumber", "/slot"];
const GAS_FIELDS: &[&str] = &[
    "/gasUsed",
    "/receipt/gasUsed",
    "/actualGasUsed",
    "/meta/computeUnitsConsumed",
];
const REASON_FIELDS: &[&str] = &["/revertReason", "/reason", "/error"];
const LOG_FIELDS: &[&str] = &["/meta/logMessages", "/logs"];

const ANCHOR_ERROR_CODE: &str = "Error Code: ";
const ANCHOR_ERROR_MESSAGE: &str = "Error Message: ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReceipt {
    pub success: bool,
    pub transaction_hash: String,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
    /// Name of the ledger error that reverted the operation, when it was one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
}

impl ExecutionReceipt {
    /// The reverted operation as an error, `None` for a successful one.
    pub fn failure(&self) -> Option<GaslessError> {
        match (self.success, &self.ledger_error) {
            (true, _) => None,
            (false, Some(code)) => Some(GaslessError::Ledger { code: code.clone() }),
            (false, None) => Some(GaslessError::Reverted(
                self.revert_reason
                    .clone()
                    .unwrap_or_else(|| "no reason reported".into()),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptStatus {
    /// Not final yet. `stage` is the latest intermediate status, if any.
    Pending { stage: Option<String> },
    Terminal(ExecutionReceipt),
}

/// Normalizes a raw receipt. `None` means the shape carries no outcome yet.
pub fn normalize(handle: &str, raw: &Value) -> Option<ExecutionReceipt> {
    if raw.is_null() {
        return None;
    }

    let logs = LOG_FIELDS
        .iter()
        .find_map(|pointer| raw.pointer(pointer).and_then(Value::as_array))
        .map(|lines| {
            lines
                .iter()
                .filter_map(|line| line.as_str().map(str::to_string))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    // a cluster transaction: `meta.err` is null on success
    let success = match raw.pointer("/meta") {
        Some(meta) => meta.get("err").map_or(true, Value::is_null),
        None => SUCCESS_FIELDS
            .iter()
            .find_map(|pointer| raw.pointer(pointer).and_then(success_encoding))?,
    };

    let transaction_hash = HASH_FIELDS
        .iter()
        .find_map(|pointer| raw.pointer(pointer).and_then(Value::as_str))
        .unwrap_or(handle)
        .to_string();
    let block_number = BLOCK_FIELDS
        .iter()
        .find_map(|pointer| raw.pointer(pointer).and_then(number));
    let gas_used = GAS_FIELDS
        .iter()
        .find_map(|pointer| raw.pointer(pointer).and_then(number));

    let (ledger_error, log_reason) = anchor_error(&logs);
    let revert_reason = match success {
        true => None,
        false => log_reason
            .or_else(|| {
                REASON_FIELDS
                    .iter()
                    .find_map(|pointer| raw.pointer(pointer).and_then(Value::as_str))
                    .map(str::to_string)
            })
            .or_else(|| raw.pointer("/meta/err").map(Value::to_string)),
    };

    Some(ExecutionReceipt {
        success,
        transaction_hash,
        block_number,
        gas_used,
        revert_reason,
        ledger_error: if success { None } else { ledger_error },
        logs,
    })
}

fn success_encoding(value: &Value) -> Option<bool> {
    let text = match value {
        Value::Bool(flag) => return Some(*flag),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().to_ascii_lowercase(),
        _ => return None,
    };

    SUCCESS_ENCODINGS
        .iter()
        .find(|(encoding, _)| *encoding == text)
        .map(|(_, success)| *success)
}

fn number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => match text.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => text.parse().ok(),
        },
        _ => None,
    }
}

/// `(error code, error message)` from an Anchor error log line.
fn anchor_error(logs: &[String]) -> (Option<String>, Option<String>) {
    let Some(line) = logs.iter().find(|line| line.contains(ANCHOR_ERROR_CODE)) else {
        return (None, None);
    };

    let field = |marker: &str| {
        line.split_once(marker).map(|(_, rest)| {
            rest.split(". ")
                .next()
                .unwrap_or(rest)
                .trim_end_matches('.')
                .trim()
                .to_string()
        })
    };

    (field(ANCHOR_ERROR_CODE), field(ANCHOR_ERROR_MESSAGE))
}

pub struct ReceiptReconciler<'a, R: RelayClient + ?Sized> {
    relay: &'a R,
    poll_interval: Duration,
    timeout: Duration,
}

impl<'a, R: RelayClient + ?Sized> ReceiptReconciler<'a, R> {
    pub fn new(relay: &'a R, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            relay,
            poll_interval,
            timeout,
        }
    }

    /// One look at the operation. Pending is a normal answer, not an error.
    #[instrument(skip(self), fields(handle = %handle))]
    pub async fn check(&self, handle: &Signature) -> Result<ReceiptStatus> {
        let label = handle.to_string();

        if let Some(receipt) = self
            .relay
            .receipt(handle)
            .await?
            .and_then(|raw| normalize(&label, &raw))
        {
            return Ok(ReceiptStatus::Terminal(receipt));
        }

        let stage = self.relay.status(handle).await?;
        debug!(?stage, "operation still pending");

        Ok(ReceiptStatus::Pending { stage })
    }

    /// Polls until the operation is terminal or the timeout elapses.
    ///
    /// A timeout is an unknown outcome: the operation may still land, so the
    /// caller keeps the handle and polls again later.
    #[instrument(skip(self), fields(handle = %handle))]
    pub async fn wait(&self, handle: &Signature) -> Result<ExecutionReceipt> {
        let started = Instant::now();

        loop {
            match self.check(handle).await {
                Ok(ReceiptStatus::Terminal(receipt)) => {
                    info!(
                        success = receipt.success,
                        block = ?receipt.block_number,
                        "operation reached a terminal state"
                    );
                    return Ok(receipt);
                }
                Ok(ReceiptStatus::Pending { .. }) => {}
                Err(e) if e.is_retryable() => warn!(error = %e, "receipt poll failed"),
                Err(e) => return Err(e),
            }

            if started.elapsed() + self.poll_interval > self.timeout {
                return Err(GaslessError::Timeout {
                    handle: handle.to_string(),
                    waited: started.elapsed(),
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
