//! The worker side of the process boundary: one request in, one result out.

use std::path::Path;
use std::sync::Arc;

use solana_sdk::signature::{Signature, Signer};
use tracing::{error, info, instrument, warn};

use crate::config::OrchestratorConfig;
use crate::error::{GaslessError, Result};
use crate::keys::load_keypair;
use crate::protocol::{self, WorkerRequest, WorkerResult};
use crate::receipt::ReceiptReconciler;
use crate::relay::{parse_pubkey, RelayClient};
use crate::submit::{ExecutionSubmitter, Submission};

pub struct Worker {
    relay: Arc<dyn RelayClient>,
    config: OrchestratorConfig,
}

impl Worker {
    pub fn new(relay: Arc<dyn RelayClient>, config: OrchestratorConfig) -> Self {
        Self { relay, config }
    }

    /// Derive, submit, then wait for a terminal receipt. Never fails: every
    /// outcome, including bad input, is reported in the result.
    pub async fn run(&self, request: &WorkerRequest) -> WorkerResult {
        self.execute(request, |_| {}).await
    }

    /// Serves a request file and writes the result next to it.
    ///
    /// `Err` means the adapter itself failed (unreadable request, unwritable
    /// result) and the process should exit non-zero.
    #[instrument(skip(self), fields(request = %path.display()))]
    pub async fn run_request_file(&self, path: &Path) -> Result<WorkerResult> {
        let bytes = tokio::fs::read(path).await?;
        let result_path = protocol::result_path(path);

        let result = match serde_json::from_slice::<WorkerRequest>(&bytes) {
            Ok(request) => {
                self.execute(&request, |handle| {
                    // lets a caller that gives up early still re-poll the operation
                    let interim = WorkerResult::unknown(handle, "awaiting terminal receipt");
                    if let Err(e) = protocol::write_result(&result_path, &interim) {
                        warn!(error = %e, "failed to write interim result");
                    }
                })
                .await
            }
            Err(e) => WorkerResult::failed(&GaslessError::InvalidRequest(e.to_string())),
        };

        protocol::write_result(&result_path, &result)?;
        info!(success = result.success, result = %result_path.display(), "result written");

        Ok(result)
    }

    async fn execute(
        &self,
        request: &WorkerRequest,
        on_submitted: impl FnOnce(&Signature),
    ) -> WorkerResult {
        let submission = match self.submit(request).await {
            Ok(submission) => submission,
            Err(e) => {
                error!(error = ?e, kind = ?e.kind(), "operation not submitted");
                return WorkerResult::failed(&e);
            }
        };
        on_submitted(&submission.handle);

        let reconciler = ReceiptReconciler::new(
            &*self.relay,
            self.config.poll_interval,
            self.config.receipt_timeout,
        );

        match reconciler.wait(&submission.handle).await {
            Ok(receipt) => {
                if let Some(reason) = &receipt.revert_reason {
                    warn!(handle = %submission.handle, %reason, "operation reverted");
                }
                WorkerResult::from_receipt(&submission.handle, receipt)
            }
            Err(e) => {
                warn!(handle = %submission.handle, error = %e, "outcome unknown");
                WorkerResult::unknown(&submission.handle, e.to_string())
            }
        }
    }

    async fn submit(&self, request: &WorkerRequest) -> Result<Submission> {
        request.validate(self.config.chain_id)?;
        let intents = request.intents()?;
        let signer = load_keypair(&request.signer_source()?, &self.config.key_dir)?;
        let submitter = ExecutionSubmitter::new(&*self.relay, &self.config);

        if let Some(expected) = &request.smart_account_address {
            let derived = submitter.deriver().address(&signer.pubkey());
            if parse_pubkey(expected)? != derived {
                return Err(GaslessError::InvalidRequest(format!(
                    "smart_account_address {expected} does not belong to the signer, expected {derived}"
                )));
            }
        }

        submitter.submit(&signer, &intents).await
    }
}
