use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::B256;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use ledger_std::authorization::{Authorization, SIGNATURE_LEN};
use ledger_std::EthAddress;
use redemption_ledger::instructions::RedeemWithPointsArgs;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::error::{GaslessError, Result};
use crate::relay::parse_pubkey;

/// A backend-approved points redemption, as handed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedAuthorization {
    pub user: String,
    pub points: u64,
    pub reward_id: String,
    /// 0x-prefixed hex.
    pub nonce: String,
    pub deadline: i64,
    /// 0x-prefixed hex of `r || s || v`.
    pub signature: String,
}

impl SignedAuthorization {
    pub fn into_args(self) -> Result<RedeemWithPointsArgs> {
        Ok(RedeemWithPointsArgs {
            user: parse_pubkey(&self.user)?,
            points: self.points,
            reward_id: self.reward_id,
            nonce: decode_hex::<32>("nonce", &self.nonce)?.into(),
            deadline: self.deadline,
            signature: decode_hex::<SIGNATURE_LEN>("signature", &self.signature)?,
        })
    }
}

pub struct AuthorizationIssuer {
    signer: PrivateKeySigner,
    program_id: Pubkey,
    ttl: Duration,
}

impl AuthorizationIssuer {
    pub fn new(signer: PrivateKeySigner, program_id: Pubkey, ttl: Duration) -> Self {
        Self {
            signer,
            program_id,
            ttl,
        }
    }

    /// `key` is a hex encoded secp256k1 secret key.
    pub fn from_hex(key: &str, program_id: Pubkey, ttl: Duration) -> Result<Self> {
        let signer = PrivateKeySigner::from_str(key.trim())
            .map_err(|e| GaslessError::Signer(format!("backend key: {e}")))?;

        Ok(Self::new(signer, program_id, ttl))
    }

    /// The address the ledger must have registered as backend signer.
    pub fn address(&self) -> EthAddress {
        self.signer.address().0 .0.into()
    }

    /// Signs a single-use authorization valid until `now + ttl`.
    pub fn issue(&self, user: Pubkey, points: u64, reward_id: &str, now: i64) -> Result<SignedAuthorization> {
        if points == 0 {
            return Err(GaslessError::InvalidRequest("points must be positive".into()));
        }
        if reward_id.is_empty() {
            return Err(GaslessError::InvalidRequest("reward id must not be empty".into()));
        }

        let authorization = Authorization {
            user,
            points,
            reward_id: reward_id.to_string(),
            nonce: rand::random::<[u8; 32]>().into(),
            deadline: now.saturating_add(self.ttl.as_secs() as i64),
        };
        let digest = authorization.digest(&self.program_id);
        let signature = self
            .signer
            .sign_hash_sync(&B256::from(digest))
            .map_err(|e| GaslessError::Signer(e.to_string()))?;
        debug!(user = %user, points, deadline = authorization.deadline, "authorization issued");

        Ok(SignedAuthorization {
            user: user.to_string(),
            points,
            reward_id: authorization.reward_id,
            nonce: format!("0x{}", hex::encode(authorization.nonce.as_ref())),
            deadline: authorization.deadline,
            signature: format!("0x{}", hex::encode(signature.as_bytes())),
        })
    }
}

fn decode_hex<const N: usize>(field: &str, raw: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(raw.trim_start_matches("0x"))
        .map_err(|e| GaslessError::InvalidRequest(format!("{field}: {e}")))?;

    bytes.try_into().map_err(|bytes: Vec<u8>| {
        GaslessError::InvalidRequest(format!("{field}: expected {N} bytes, got {}", bytes.len()))
    })
}
