//! Request/result protocol between a caller and a worker.
//!
//! A caller hands a [`WorkerRequest`] to a [`Transport`] and gets a
//! [`WorkerResult`] back. [`ProcessTransport`] runs each request in a fresh
//! worker process and exchanges JSON files with it; [`InProcessTransport`]
//! runs the same worker code as a task.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::signature::Signature;
use tracing::{info, instrument, warn};

use crate::batch::CallIntent;
use crate::config::OrchestratorConfig;
use crate::error::{ErrorKind, GaslessError, Result};
use crate::keys::SignerSource;
use crate::receipt::ExecutionReceipt;
use crate::worker::Worker;

pub const RESULT_SUFFIX: &str = "-result.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallData {
    pub data: String,
}

#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkerRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smart_account_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_ref: Option<String>,
    pub chain_id: u64,
    pub calls: Vec<CallData>,
}

impl fmt::Debug for WorkerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerRequest")
            .field("smart_account_address", &self.smart_account_address)
            .field(
                "user_private_key",
                &self.user_private_key.as_ref().map(|_| "<redacted>"),
            )
            .field("signer_ref", &self.signer_ref)
            .field("chain_id", &self.chain_id)
            .field("calls", &self.calls)
            .finish()
    }
}

impl WorkerRequest {
    pub fn new(signer_ref: impl Into<String>, chain_id: u64, intents: &[CallIntent]) -> Result<Self> {
        let calls = intents
            .iter()
            .map(|intent| intent.to_call_data().map(|data| CallData { data }))
            .collect::<Result<_>>()?;

        Ok(Self {
            signer_ref: Some(signer_ref.into()),
            chain_id,
            calls,
            ..Default::default()
        })
    }

    /// Structural checks, done before any network call.
    pub fn validate(&self, chain_id: u64) -> Result<()> {
        if self.calls.is_empty() {
            return Err(GaslessError::InvalidRequest("calls must not be empty".into()));
        }

        if self.chain_id != chain_id {
            return Err(GaslessError::InvalidRequest(format!(
                "chain id {} does not match the configured {chain_id}",
                self.chain_id
            )));
        }

        self.signer_source().map(|_| ())
    }

    pub fn signer_source(&self) -> Result<SignerSource<'_>> {
        match (&self.user_private_key, &self.signer_ref) {
            (Some(key), None) => Ok(SignerSource::Inline(key)),
            (None, Some(name)) => Ok(SignerSource::Reference(name)),
            (None, None) => Err(GaslessError::InvalidRequest(
                "one of user_private_key or signer_ref is required".into(),
            )),
            (Some(_), Some(_)) => Err(GaslessError::InvalidRequest(
                "user_private_key and signer_ref are mutually exclusive".into(),
            )),
        }
    }

    pub fn intents(&self) -> Result<Vec<CallIntent>> {
        self.calls
            .iter()
            .map(|call| CallIntent::parse(&call.data))
            .collect()
    }
}

/// What a worker reports. Business failures are results, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_op_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<ExecutionReceipt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl WorkerResult {
    pub fn from_receipt(handle: &Signature, receipt: ExecutionReceipt) -> Self {
        let failure = receipt.failure();

        Self {
            success: receipt.success,
            user_op_hash: Some(handle.to_string()),
            transaction_hash: Some(receipt.transaction_hash.clone()),
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            error: receipt.revert_reason.clone(),
            stack: failure.as_ref().map(|e| format!("{e:?}")),
            kind: failure.map(|e| e.kind()),
            receipt: Some(receipt),
        }
    }

    pub fn failed(error: &GaslessError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            stack: Some(format!("{error:?}")),
            kind: Some(error.kind()),
            ..Default::default()
        }
    }

    /// Submitted, terminal state not seen. The handle is all a caller needs to re-poll.
    pub fn unknown(handle: &Signature, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            user_op_hash: Some(handle.to_string()),
            error: Some(reason.into()),
            kind: Some(ErrorKind::UnknownOutcome),
            ..Default::default()
        }
    }

    pub fn handle(&self) -> Option<Signature> {
        self.user_op_hash
            .as_deref()
            .and_then(|raw| Signature::from_str(raw).ok())
    }

    pub fn is_unknown(&self) -> bool {
        !self.success && self.kind == Some(ErrorKind::UnknownOutcome)
    }

    /// The reported failure as an error, `None` on success.
    pub fn failure(&self) -> Option<GaslessError> {
        if self.success {
            return None;
        }

        Some(GaslessError::Outcome {
            kind: self.kind.unwrap_or(ErrorKind::Infrastructure),
            reason: self
                .error
                .clone()
                .unwrap_or_else(|| "worker reported no reason".into()),
            handle: self.user_op_hash.clone(),
        })
    }
}

/// `<dir>/<stem>-result.json` for a request at `<dir>/<stem>.<ext>`.
pub fn result_path(request: &Path) -> PathBuf {
    let stem = request
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "request".into());

    request.with_file_name(format!("{stem}{RESULT_SUFFIX}"))
}

/// Writes `result` next to its final path first, so readers never see a partial file.
pub fn write_result(path: &Path, result: &WorkerResult) -> Result<()> {
    let staging = path.with_extension("json.tmp");
    std::fs::write(&staging, serde_json::to_vec_pretty(result)?)?;
    std::fs::rename(&staging, path)?;

    Ok(())
}

pub fn read_result(path: &Path) -> Result<Option<WorkerResult>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Runs one request to completion. `Err` is reserved for adapter failures;
    /// everything the worker decided arrives as a [`WorkerResult`].
    async fn execute(&self, request: &WorkerRequest) -> Result<WorkerResult>;
}

/// One worker process per request.
pub struct ProcessTransport {
    program: PathBuf,
    timeout: Duration,
}

impl ProcessTransport {
    pub fn new(config: &OrchestratorConfig) -> Result<Self> {
        let program = match &config.worker_bin {
            Some(program) => program.clone(),
            None => std::env::current_exe()?,
        };

        Ok(Self::with_program(program, config.worker_timeout))
    }

    pub fn with_program(program: PathBuf, timeout: Duration) -> Self {
        Self { program, timeout }
    }
}

#[async_trait]
impl Transport for ProcessTransport {
    #[instrument(skip_all, fields(program = %self.program.display()))]
    async fn execute(&self, request: &WorkerRequest) -> Result<WorkerResult> {
        // removed on drop, together with the result file
        let dir = tempfile::Builder::new().prefix("gasless-").tempdir()?;
        let request_path = dir.path().join("request.json");
        let result_path = result_path(&request_path);
        tokio::fs::write(&request_path, serde_json::to_vec(request)?).await?;

        let mut child = tokio::process::Command::new(&self.program)
            .arg("worker")
            .arg(&request_path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => Some(status?),
            Err(_) => {
                warn!(timeout = ?self.timeout, "worker timed out, killing it");
                child.kill().await?;
                None
            }
        };
        let result = read_result(&result_path)?;

        match (status, result) {
            (Some(status), Some(result)) if status.success() => Ok(result),
            (None, Some(result)) if !result.is_unknown() => Ok(result),
            (None, result) => {
                let reason = format!("worker timed out after {:?}", self.timeout);
                match result.as_ref().and_then(WorkerResult::handle) {
                    Some(handle) => Ok(WorkerResult::unknown(&handle, reason)),
                    None => Ok(WorkerResult {
                        kind: Some(ErrorKind::UnknownOutcome),
                        ..WorkerResult::failed(&GaslessError::Worker(reason))
                    }),
                }
            }
            (Some(status), result) => match result.as_ref().and_then(WorkerResult::handle) {
                Some(handle) => {
                    info!(%status, handle = %handle, "worker died after submitting");
                    Ok(WorkerResult::unknown(
                        &handle,
                        format!("worker exited with {status}"),
                    ))
                }
                None => Err(GaslessError::Worker(format!(
                    "exited with {status} and no result"
                ))),
            },
        }
    }
}

/// Runs the worker in the calling process.
pub struct InProcessTransport {
    worker: Worker,
}

impl InProcessTransport {
    pub fn new(worker: Worker) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn execute(&self, request: &WorkerRequest) -> Result<WorkerResult> {
        Ok(self.worker.run(request).await)
    }
}
