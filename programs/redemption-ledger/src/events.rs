use anchor_lang::prelude::*;
use derive_new::new;
use ledger_std::{Bytes32, EthAddress};

#[event]
#[derive(new, Clone, Debug, PartialEq, Eq)]
pub struct LedgerInitialized {
    pub authority: Pubkey,
    pub operator: Pubkey,
    pub backend_signer: EthAddress,
    pub mint: Pubkey,
    pub points_to_well_rate: u64,
    pub rate: u64,
}

#[event]
#[derive(new, Clone, Debug, PartialEq, Eq)]
pub struct Redeemed {
    pub user: Pubkey,
    pub reward_id: String,
    pub amount: u64,
    pub points_equivalent: u64,
}

#[event]
#[derive(new, Clone, Debug, PartialEq, Eq)]
pub struct PointsRedeemed {
    pub user: Pubkey,
    pub points: u64,
    pub reward_id: String,
    pub nonce: Bytes32,
    pub amount: u64,
}

#[event]
#[derive(new, Clone, Debug, PartialEq, Eq)]
pub struct UserReconciled {
    pub user: Pubkey,
    pub points: u64,
    pub amount: u64,
}

#[event]
#[derive(new, Clone, Debug, PartialEq, Eq)]
pub struct BatchReconciled {
    pub users: u32,
    pub total_points: u64,
    pub total_amount: u64,
}

#[event]
#[derive(new, Clone, Debug, PartialEq, Eq)]
pub struct PointsToWellRateUpdated {
    pub old: u64,
    pub new: u64,
}

#[event]
#[derive(new, Clone, Debug, PartialEq, Eq)]
pub struct RateUpdated {
    pub old: u64,
    pub new: u64,
}

#[event]
#[derive(new, Clone, Debug, PartialEq, Eq)]
pub struct BackendSignerUpdated {
    pub old: EthAddress,
    pub new: EthAddress,
}

#[event]
#[derive(new, Clone, Debug, PartialEq, Eq)]
pub struct OperatorUpdated {
    pub old: Pubkey,
    pub new: Pubkey,
}
