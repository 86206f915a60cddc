use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;

use crate::error::{GaslessError, Result};
use crate::relay::{RelayClient, Simulation};

#[derive(Default)]
struct FakeState {
    deployed: HashSet<Pubkey>,
    statuses: HashMap<Signature, String>,
    receipts: HashMap<Signature, Value>,
    submitted: Vec<(Signature, Transaction)>,
    // outcome applied to every transaction as soon as it is submitted
    auto_land: Option<(bool, Vec<String>)>,
    reject_submissions: bool,
    simulation: Simulation,
    queued_simulations: VecDeque<Simulation>,
}

/// In-memory relay and cluster.
pub struct FakeRelay {
    sponsor: Pubkey,
    blockhash: Hash,
    state: Mutex<FakeState>,
}

impl Default for FakeRelay {
    fn default() -> Self {
        Self {
            sponsor: Pubkey::new_unique(),
            blockhash: Hash::new_unique(),
            state: Mutex::default(),
        }
    }
}

impl FakeRelay {
    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn sponsor_key(&self) -> Pubkey {
        self.sponsor
    }

    pub fn deploy(&self, address: Pubkey) {
        self.state().deployed.insert(address);
    }

    pub fn set_status(&self, signature: Signature, status: &str) {
        self.state().statuses.insert(signature, status.to_string());
    }

    pub fn land(&self, signature: Signature, success: bool) {
        self.land_with_logs(signature, success, Vec::new());
    }

    pub fn land_with_logs(&self, signature: Signature, success: bool, logs: Vec<String>) {
        self.state()
            .receipts
            .insert(signature, receipt(&signature, success, &logs));
    }

    /// Lands every later submission with `success` and `logs`.
    pub fn auto_land(&self, success: bool, logs: Vec<String>) {
        self.state().auto_land = Some((success, logs));
    }

    pub fn reject_submissions(&self) {
        self.state().reject_submissions = true;
    }

    pub fn set_simulation(&self, simulation: Simulation) {
        self.state().simulation = simulation;
    }

    /// Answers the next simulation, ahead of the one set with `set_simulation`.
    pub fn queue_simulation(&self, simulation: Simulation) {
        self.state().queued_simulations.push_back(simulation);
    }

    pub fn submitted(&self) -> Vec<(Signature, Transaction)> {
        self.state().submitted.clone()
    }
}

fn receipt(signature: &Signature, success: bool, logs: &[String]) -> Value {
    let err = match success {
        true => Value::Null,
        false => json!({ "InstructionError": [0, { "Custom": 6000 }] }),
    };

    json!({
        "slot": 42,
        "meta": { "err": err, "computeUnitsConsumed": 12_000, "logMessages": logs },
        "transaction": { "signatures": [signature.to_string()] },
    })
}

#[async_trait]
impl RelayClient for FakeRelay {
    async fn sponsor(&self) -> Result<Pubkey> {
        Ok(self.sponsor)
    }

    async fn latest_blockhash(&self) -> Result<Hash> {
        Ok(self.blockhash)
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool> {
        Ok(self.state().deployed.contains(address))
    }

    async fn submit(&self, transaction: &str) -> Result<Signature> {
        let mut state = self.state();
        if state.reject_submissions {
            return Err(GaslessError::Relay("sponsorship unavailable".into()));
        }

        let bytes = BASE64.decode(transaction).unwrap();
        let transaction: Transaction = bincode::deserialize(&bytes).unwrap();
        let signature = Signature::new_unique();

        if let Some((success, logs)) = state.auto_land.clone() {
            state
                .receipts
                .insert(signature, receipt(&signature, success, &logs));
        }
        state.submitted.push((signature, transaction));

        Ok(signature)
    }

    async fn receipt(&self, signature: &Signature) -> Result<Option<Value>> {
        Ok(self.state().receipts.get(signature).cloned())
    }

    async fn status(&self, signature: &Signature) -> Result<Option<String>> {
        Ok(self.state().statuses.get(signature).cloned())
    }

    async fn simulate(&self, _transaction: &str) -> Result<Simulation> {
        let mut state = self.state();
        let simulation = match state.queued_simulations.pop_front() {
            Some(simulation) => simulation,
            None => state.simulation.clone(),
        };

        Ok(simulation)
    }
}
