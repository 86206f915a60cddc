//! Ledger events recovered from transaction logs.

use anchor_lang::{AnchorDeserialize, Discriminator};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use redemption_ledger::events::{PointsRedeemed, Redeemed, UserReconciled};
use solana_sdk::pubkey::Pubkey;

use crate::store::{AmountUnit, RedemptionPath, RedemptionRecord};

const PROGRAM_DATA: &str = "Program data: ";
pub const BATCH_REWARD: &str = "batch-settlement";

#[derive(Debug, Clone)]
pub enum LedgerEvent {
    Redeemed(Redeemed),
    PointsRedeemed(PointsRedeemed),
    UserReconciled(UserReconciled),
}

impl LedgerEvent {
    pub fn user(&self) -> Pubkey {
        match self {
            Self::Redeemed(event) => event.user,
            Self::PointsRedeemed(event) => event.user,
            Self::UserReconciled(event) => event.user,
        }
    }

    /// Redemption row for this event, keyed by `code`.
    pub fn to_record(
        &self,
        code: String,
        user_id: Option<String>,
        transaction: &str,
        timestamp: i64,
    ) -> RedemptionRecord {
        let (reward_id, amount, unit, path) = match self {
            Self::Redeemed(event) => (
                event.reward_id.clone(),
                event.amount,
                AmountUnit::Tokens,
                RedemptionPath::Direct,
            ),
            Self::PointsRedeemed(event) => (
                event.reward_id.clone(),
                event.points,
                AmountUnit::Points,
                RedemptionPath::Signed,
            ),
            Self::UserReconciled(event) => (
                BATCH_REWARD.to_string(),
                event.points,
                AmountUnit::Points,
                RedemptionPath::Batch,
            ),
        };

        RedemptionRecord {
            code,
            user_id,
            user: self.user().to_string(),
            reward_id,
            amount,
            unit,
            path,
            transaction: transaction.to_string(),
            timestamp,
        }
    }
}

/// Every recognized ledger event in `logs`, in emission order.
pub fn decode_events(logs: &[String]) -> Vec<LedgerEvent> {
    logs.iter()
        .filter_map(|line| line.strip_prefix(PROGRAM_DATA))
        .filter_map(|data| BASE64.decode(data.trim()).ok())
        .filter_map(|bytes| decode(&bytes))
        .collect()
}

fn decode(bytes: &[u8]) -> Option<LedgerEvent> {
    if let Some(mut body) = bytes.strip_prefix(Redeemed::DISCRIMINATOR) {
        return Redeemed::deserialize(&mut body).ok().map(LedgerEvent::Redeemed);
    }

    if let Some(mut body) = bytes.strip_prefix(PointsRedeemed::DISCRIMINATOR) {
        return PointsRedeemed::deserialize(&mut body)
            .ok()
            .map(LedgerEvent::PointsRedeemed);
    }

    if let Some(mut body) = bytes.strip_prefix(UserReconciled::DISCRIMINATOR) {
        return UserReconciled::deserialize(&mut body)
            .ok()
            .map(LedgerEvent::UserReconciled);
    }

    None
}

#[cfg(test)]
pub(crate) fn program_data(event: &impl anchor_lang::Event) -> String {
    format!("{PROGRAM_DATA}{}", BASE64.encode(event.data()))
}
