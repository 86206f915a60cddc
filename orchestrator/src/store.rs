//! Application state next to the ledger: users' point counters, operations in
//! flight and redemption records.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{GaslessError, Result};
use crate::observe::{decode_events, LedgerEvent, BATCH_REWARD};
use crate::receipt::ExecutionReceipt;
use crate::redeem::redemption_code;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    /// Owner key of the user's account, base58.
    pub wallet: String,
    pub total_points: u64,
    pub points_reconciled: u64,
    #[serde(default)]
    pub smart_account_address: Option<String>,
}

impl UserRecord {
    pub fn new(user_id: impl Into<String>, wallet: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            wallet: wallet.into(),
            total_points: 0,
            points_reconciled: 0,
            smart_account_address: None,
        }
    }

    pub fn pending(&self) -> u64 {
        self.total_points.saturating_sub(self.points_reconciled)
    }

    pub fn earn(&mut self, points: u64) -> Result<()> {
        self.total_points = self
            .total_points
            .checked_add(points)
            .ok_or_else(|| GaslessError::Store(format!("{}: total points overflow", self.user_id)))?;

        Ok(())
    }

    /// Records `points` as settled on chain. Never lets reconciled exceed total.
    pub fn credit_reconciled(&mut self, points: u64) -> Result<()> {
        match self.points_reconciled.checked_add(points) {
            Some(reconciled) if reconciled <= self.total_points => {
                self.points_reconciled = reconciled;
                Ok(())
            }
            _ => Err(GaslessError::Store(format!(
                "{}: crediting {points} points would exceed the {} earned",
                self.user_id, self.total_points
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub user_id: String,
    pub points: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub handle: String,
    pub status: OperationStatus,
    #[serde(default)]
    pub entry_point_tx_hash: Option<String>,
    #[serde(default)]
    pub revert_reason: Option<String>,
    pub submitted_at: i64,
    /// Points each user gets credited once the operation succeeds.
    #[serde(default)]
    pub settlement: Vec<Settlement>,
}

impl OperationRecord {
    pub fn pending(handle: impl Into<String>, submitted_at: i64, settlement: Vec<Settlement>) -> Self {
        Self {
            handle: handle.into(),
            status: OperationStatus::Pending,
            entry_point_tx_hash: None,
            revert_reason: None,
            submitted_at,
            settlement,
        }
    }

    /// Moves a pending operation to its terminal state. Terminal operations never reopen.
    pub fn finish(&mut self, receipt: &ExecutionReceipt) -> Result<()> {
        if self.status != OperationStatus::Pending {
            return Err(GaslessError::Store(format!(
                "operation {} is already {:?}",
                self.handle, self.status
            )));
        }

        self.status = match receipt.success {
            true => OperationStatus::Success,
            false => OperationStatus::Failed,
        };
        self.entry_point_tx_hash = Some(receipt.transaction_hash.clone());
        self.revert_reason = receipt.revert_reason.clone();

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountUnit {
    Tokens,
    Points,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionPath {
    Direct,
    Signed,
    Batch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRecord {
    pub code: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub user: String,
    pub reward_id: String,
    pub amount: u64,
    pub unit: AmountUnit,
    pub path: RedemptionPath,
    pub transaction: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationStatus {
    pub pending_users: usize,
    pub pending_points: u64,
    pub operations_in_flight: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub users: BTreeMap<String, UserRecord>,
    #[serde(default)]
    pub operations: BTreeMap<String, OperationRecord>,
    #[serde(default)]
    pub redemptions: BTreeMap<String, RedemptionRecord>,
}

impl State {
    pub fn user_mut(&mut self, user_id: &str) -> Result<&mut UserRecord> {
        self.users
            .get_mut(user_id)
            .ok_or_else(|| GaslessError::Store(format!("unknown user {user_id}")))
    }

    /// Adds earned points to `user_id`, registering the user under `wallet` on first sight.
    pub fn earn(&mut self, user_id: &str, points: u64, wallet: Option<&str>) -> Result<UserRecord> {
        if points == 0 {
            return Err(GaslessError::InvalidRequest("earned points must be positive".into()));
        }

        if !self.users.contains_key(user_id) {
            let wallet = wallet.ok_or_else(|| {
                GaslessError::InvalidRequest(format!("unknown user {user_id}, a wallet is required"))
            })?;
            self.users
                .insert(user_id.to_string(), UserRecord::new(user_id, wallet));
        }

        let user = self.user_mut(user_id)?;
        if let Some(wallet) = wallet.filter(|wallet| *wallet != user.wallet) {
            return Err(GaslessError::InvalidRequest(format!(
                "{user_id} is registered with wallet {}, not {wallet}",
                user.wallet
            )));
        }
        user.earn(points)?;

        Ok(user.clone())
    }

    /// A redemption code not issued yet.
    pub fn fresh_code(&self, reward_id: &str) -> String {
        loop {
            let code = redemption_code(reward_id);
            if !self.redemptions.contains_key(&code) {
                return code;
            }
        }
    }

    /// Points of `user_id` already submitted in operations without an outcome.
    pub fn in_flight(&self, user_id: &str) -> u64 {
        self.operations
            .values()
            .filter(|operation| operation.status == OperationStatus::Pending)
            .flat_map(|operation| &operation.settlement)
            .filter(|settlement| settlement.user_id == user_id)
            .map(|settlement| settlement.points)
            .sum()
    }

    /// Users with points to settle that are not already in flight, by user id.
    pub fn settleable(&self) -> Vec<Settlement> {
        self.users
            .values()
            .filter(|user| !user.wallet.is_empty())
            .filter_map(|user| {
                let points = user.pending().saturating_sub(self.in_flight(&user.user_id));
                (points > 0).then(|| Settlement {
                    user_id: user.user_id.clone(),
                    points,
                })
            })
            .collect()
    }

    pub fn pending_operations(&self) -> Vec<OperationRecord> {
        self.operations
            .values()
            .filter(|operation| operation.status == OperationStatus::Pending)
            .cloned()
            .collect()
    }

    /// Applies a terminal receipt to a stored operation. On success its users are
    /// credited and every `UserReconciled` event becomes a batch redemption.
    pub fn finish_operation(&mut self, handle: &str, receipt: &ExecutionReceipt, now: i64) -> Result<()> {
        let operation = self
            .operations
            .get_mut(handle)
            .ok_or_else(|| GaslessError::Store(format!("unknown operation {handle}")))?;
        operation.finish(receipt)?;
        if !receipt.success {
            return Ok(());
        }

        let settlement = operation.settlement.clone();
        for Settlement { user_id, points } in &settlement {
            self.user_mut(user_id)?.credit_reconciled(*points)?;
        }

        for event in decode_events(&receipt.logs) {
            let LedgerEvent::UserReconciled(reconciled) = &event else {
                continue;
            };
            let wallet = reconciled.user.to_string();
            let Some(user_id) = settlement
                .iter()
                .map(|entry| &entry.user_id)
                .find(|user_id| self.users.get(*user_id).is_some_and(|user| user.wallet == wallet))
                .cloned()
            else {
                continue;
            };

            let code = self.fresh_code(BATCH_REWARD);
            self.insert_redemption(event.to_record(
                code,
                Some(user_id),
                &receipt.transaction_hash,
                now,
            ))?;
        }

        Ok(())
    }

    pub fn insert_operation(&mut self, operation: OperationRecord) -> Result<()> {
        if self.operations.contains_key(&operation.handle) {
            return Err(GaslessError::Store(format!(
                "operation {} already recorded",
                operation.handle
            )));
        }
        self.operations.insert(operation.handle.clone(), operation);

        Ok(())
    }

    pub fn insert_redemption(&mut self, record: RedemptionRecord) -> Result<()> {
        if self.redemptions.contains_key(&record.code) {
            return Err(GaslessError::Store(format!(
                "redemption code {} already issued",
                record.code
            )));
        }
        self.redemptions.insert(record.code.clone(), record);

        Ok(())
    }

    pub fn status(&self) -> ReconciliationStatus {
        let pending = self.users.values().filter(|user| user.pending() > 0);

        ReconciliationStatus {
            pending_users: pending.clone().count(),
            pending_points: pending.map(UserRecord::pending).sum(),
            operations_in_flight: self.pending_operations().len(),
        }
    }
}

pub trait Store: Send + Sync {
    fn load(&self) -> Result<State>;

    fn save(&self, state: &State) -> Result<()>;

    /// Load, mutate and save. Nothing is saved when `apply` fails.
    fn update<T>(&self, apply: impl FnOnce(&mut State) -> Result<T>) -> Result<T>
    where
        Self: Sized,
    {
        let mut state = self.load()?;
        let value = apply(&mut state)?;
        self.save(&state)?;

        Ok(value)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new(state: State) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

impl Store for MemoryStore {
    fn load(&self) -> Result<State> {
        self.state
            .lock()
            .map(|state| state.clone())
            .map_err(|_| GaslessError::Store("state lock poisoned".into()))
    }

    fn save(&self, state: &State) -> Result<()> {
        let mut current = self
            .state
            .lock()
            .map_err(|_| GaslessError::Store("state lock poisoned".into()))?;
        *current = state.clone();

        Ok(())
    }
}

/// State kept as one JSON document, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Store for FileStore {
    fn load(&self) -> Result<State> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(State::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, state: &State) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, state)?;
        file.persist(&self.path).map_err(|e| e.error)?;

        Ok(())
    }
}
