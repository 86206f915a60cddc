//! Nightly settlement of earned points into tokens.
//!
//! Pending users are chunked into batch jobs. Each job is one operation with a
//! single `batch_reconcile` instruction, so it settles entirely or not at all.
//! A chunk whose transaction would not fit in one packet is halved until it does.
//! Points are credited only after a terminal success was observed.

use std::collections::VecDeque;
use std::str::FromStr;

use anchor_lang::{InstructionData, ToAccountMetas};
use anchor_spl::token::spl_token;
use redemption_ledger::instructions::BatchReconcileArgs;
use redemption_ledger::state::Config;
use serde::Serialize;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::packet::PACKET_DATA_SIZE;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Signature, Signer};
use tracing::{debug, error, info, instrument, warn};

use crate::account::AccountDeriver;
use crate::batch::{BatchContext, CallIntent, IntentBatcher};
use crate::config::OrchestratorConfig;
use crate::error::{GaslessError, Result};
use crate::keys::{load_keypair, SignerSource};
use crate::observe::decode_events;
use crate::protocol::{Transport, WorkerRequest, WorkerResult};
use crate::receipt::{ReceiptReconciler, ReceiptStatus};
use crate::relay::{parse_pubkey, RelayClient};
use crate::store::{OperationRecord, Settlement, Store};
use crate::submit::{transaction_size, unix_now};

/// One chunk of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub entries: Vec<BatchEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub user_id: String,
    pub wallet: Pubkey,
    pub points: u64,
}

impl BatchJob {
    pub fn settlement(&self) -> Vec<Settlement> {
        self.entries
            .iter()
            .map(|entry| Settlement {
                user_id: entry.user_id.clone(),
                points: entry.points,
            })
            .collect()
    }

    /// Halves the job, `None` for a single entry.
    pub fn split(&self) -> Option<(BatchJob, BatchJob)> {
        if self.entries.len() < 2 {
            return None;
        }
        let (head, tail) = self.entries.split_at(self.entries.len() / 2);

        Some((
            BatchJob {
                entries: head.to_vec(),
            },
            BatchJob {
                entries: tail.to_vec(),
            },
        ))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub batches: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub unknown: usize,
    pub points_settled: u64,
}

pub struct ReconciliationJob<'a, S: Store, T: Transport + ?Sized> {
    store: &'a S,
    transport: &'a T,
    relay: &'a dyn RelayClient,
    config: &'a OrchestratorConfig,
    deriver: AccountDeriver,
    operator: Pubkey,
    operator_ref: String,
}

impl<'a, S: Store, T: Transport + ?Sized> ReconciliationJob<'a, S, T> {
    /// `operator_ref` names the operator keypair inside the key directory.
    pub fn new(
        store: &'a S,
        transport: &'a T,
        relay: &'a dyn RelayClient,
        config: &'a OrchestratorConfig,
        operator_ref: &str,
    ) -> Result<Self> {
        let operator =
            load_keypair(&SignerSource::Reference(operator_ref), &config.key_dir)?.pubkey();

        Ok(Self {
            store,
            transport,
            relay,
            config,
            deriver: AccountDeriver::new(config.mint),
            operator,
            operator_ref: operator_ref.to_string(),
        })
    }

    /// Pending users minus points already in flight, in chunks of at most `reconcile_chunk`.
    pub fn plan(&self) -> Result<Vec<BatchJob>> {
        let state = self.store.load()?;

        let entries = state
            .settleable()
            .into_iter()
            .filter_map(|Settlement { user_id, points }| {
                let wallet = &state.users.get(&user_id)?.wallet;
                match parse_pubkey(wallet) {
                    Ok(wallet) => Some(BatchEntry {
                        user_id,
                        wallet,
                        points,
                    }),
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "skipping user with malformed wallet");
                        None
                    }
                }
            })
            .collect::<Vec<_>>();

        Ok(entries
            .chunks(self.config.reconcile_chunk)
            .map(|chunk| BatchJob {
                entries: chunk.to_vec(),
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<JobSummary> {
        let mut jobs = VecDeque::from(self.plan()?);
        let mut summary = JobSummary::default();
        info!(batches = jobs.len(), "reconciliation started");

        while let Some(job) = jobs.pop_front() {
            let intents = self.intents(&job).await?;
            if !self.fits(&intents).await? {
                match job.split() {
                    Some((head, tail)) => {
                        debug!(users = job.entries.len(), "batch exceeds one transaction, halving");
                        jobs.push_front(tail);
                        jobs.push_front(head);
                    }
                    None => {
                        error!(users = job.entries.len(), "settlement does not fit in one transaction");
                        summary.batches += 1;
                        summary.failed += 1;
                    }
                }
                continue;
            }

            summary.batches += 1;
            self.record_accounts(&job)?;

            let request = WorkerRequest::new(&self.operator_ref, self.config.chain_id, &intents)?;
            match self.transport.execute(&request).await {
                Ok(result) => self.settle(&job, result, &mut summary)?,
                Err(e) => {
                    error!(error = %e, users = job.entries.len(), "batch not executed");
                    summary.failed += 1;
                }
            }
        }

        info!(?summary, "reconciliation finished");

        Ok(summary)
    }

    /// Re-polls operations left without an outcome and settles those that finished.
    #[instrument(skip(self))]
    pub async fn resume_pending(&self) -> Result<JobSummary> {
        let reconciler = ReceiptReconciler::new(
            self.relay,
            self.config.poll_interval,
            self.config.receipt_timeout,
        );
        let mut summary = JobSummary::default();

        for operation in self.store.load()?.pending_operations() {
            summary.batches += 1;

            let handle = Signature::from_str(&operation.handle)
                .map_err(|e| GaslessError::Store(format!("{}: {e}", operation.handle)))?;
            let receipt = match reconciler.check(&handle).await {
                Ok(ReceiptStatus::Terminal(receipt)) => receipt,
                Ok(ReceiptStatus::Pending { stage }) => {
                    info!(handle = %handle, ?stage, "operation still pending");
                    summary.unknown += 1;
                    continue;
                }
                Err(e) => {
                    warn!(handle = %handle, error = %e, "re-poll failed");
                    summary.unknown += 1;
                    continue;
                }
            };

            self.store
                .update(|state| state.finish_operation(&operation.handle, &receipt, unix_now()))?;
            tally(&mut summary, receipt.success, &operation.settlement);
        }

        Ok(summary)
    }

    async fn intents(&self, job: &BatchJob) -> Result<Vec<CallIntent>> {
        let mut intents = Vec::with_capacity(job.entries.len() + 1);

        for entry in &job.entries {
            let account = self.deriver.derive(self.relay, &entry.wallet).await?;
            if !account.is_deployed() {
                intents.push(CallIntent::EnsureAccount {
                    owner: entry.wallet,
                });
            }
        }
        intents.push(CallIntent::Raw(self.batch_instruction(job).into()));

        Ok(intents)
    }

    /// Whether `intents`, signed by the operator and paid by the sponsor, fit in one packet.
    async fn fits(&self, intents: &[CallIntent]) -> Result<bool> {
        let context = BatchContext {
            owner: self.operator,
            fee_payer: self.relay.sponsor().await?,
        };
        let instructions =
            IntentBatcher::new(self.config.ledger_program_id, self.deriver).encode(&context, intents)?;

        Ok(transaction_size(&instructions, &context.fee_payer)? <= PACKET_DATA_SIZE)
    }

    /// Stores the token account each user of `job` is settled into.
    fn record_accounts(&self, job: &BatchJob) -> Result<()> {
        self.store.update(|state| {
            for entry in &job.entries {
                let address = self.deriver.address(&entry.wallet).to_string();
                state
                    .user_mut(&entry.user_id)?
                    .smart_account_address
                    .get_or_insert(address);
            }

            Ok(())
        })
    }

    fn batch_instruction(&self, job: &BatchJob) -> Instruction {
        let mut accounts = redemption_ledger::accounts::BatchReconcile {
            config: Config::pda().0,
            operator: self.operator,
            mint: self.config.mint,
            token_program: spl_token::ID,
        }
        .to_account_metas(None);
        accounts.extend(
            job.entries
                .iter()
                .map(|entry| AccountMeta::new(self.deriver.address(&entry.wallet), false)),
        );

        Instruction {
            program_id: self.config.ledger_program_id,
            accounts,
            data: redemption_ledger::instruction::BatchReconcile {
                args: BatchReconcileArgs {
                    users: job.entries.iter().map(|entry| entry.wallet).collect(),
                    points: job.entries.iter().map(|entry| entry.points).collect(),
                },
            }
            .data(),
        }
    }

    fn settle(&self, job: &BatchJob, result: WorkerResult, summary: &mut JobSummary) -> Result<()> {
        let settlement = job.settlement();
        let handle = result.handle();

        if result.is_unknown() {
            match handle {
                Some(handle) => {
                    warn!(handle = %handle, "batch outcome unknown, kept for re-poll");
                    self.store.update(|state| {
                        state.insert_operation(OperationRecord::pending(
                            handle.to_string(),
                            unix_now(),
                            settlement,
                        ))
                    })?;
                }
                None => error!(
                    users = job.entries.len(),
                    "batch outcome unknown and no handle was reported"
                ),
            }
            summary.unknown += 1;
            return Ok(());
        }

        match (handle, &result.receipt) {
            (Some(handle), Some(receipt)) => {
                let settled = decode_events(&receipt.logs).len();
                info!(handle = %handle, success = receipt.success, settled, "batch finished");

                self.store.update(|state| {
                    state.insert_operation(OperationRecord::pending(
                        handle.to_string(),
                        unix_now(),
                        settlement.clone(),
                    ))?;
                    state.finish_operation(&handle.to_string(), receipt, unix_now())
                })?;
                tally(summary, receipt.success, &settlement);
            }
            _ => {
                warn!(error = ?result.error, kind = ?result.kind, "batch rejected before submission");
                summary.failed += 1;
            }
        }

        Ok(())
    }
}

fn tally(summary: &mut JobSummary, success: bool, settlement: &[Settlement]) {
    if success {
        summary.succeeded += 1;
        summary.points_settled += settlement.iter().map(|entry| entry.points).sum::<u64>();
    } else {
        summary.failed += 1;
    }
}
