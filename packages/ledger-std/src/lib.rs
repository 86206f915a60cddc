use anchor_lang::prelude::*;
use derive_more::Deref;

pub mod account;
pub mod authorization;
pub mod conversion;

#[cfg(feature = "mainnet")]
pub const CHAIN_ID: u64 = 1399811149;
#[cfg(not(feature = "mainnet"))]
pub const CHAIN_ID: u64 = 1399811150;

/// Decimals of the reward mint. SPL amounts are `u64`, so the scale stays at 10^9.
pub const DECIMALS: u8 = 9;
pub const SCALE: u64 = 10u64.pow(DECIMALS as u32);
/// Upper bound on users per `batch_reconcile` call.
pub const MAX_BATCH: usize = 200;

#[derive(
    AnchorSerialize, AnchorDeserialize, InitSpace, Deref, Clone, Copy, Debug, PartialEq, Eq, Hash,
)]
pub struct Bytes32([u8; 32]);

impl From<[u8; 32]> for Bytes32 {
    fn from(bytes: [u8; 32]) -> Self {
        Bytes32(bytes)
    }
}

impl From<Bytes32> for [u8; 32] {
    fn from(bytes: Bytes32) -> Self {
        bytes.0
    }
}

impl AsRef<[u8]> for Bytes32 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// 20-byte secp256k1 signer address, derived the Ethereum way
/// (last 20 bytes of the keccak of the uncompressed public key).
#[derive(
    AnchorSerialize,
    AnchorDeserialize,
    InitSpace,
    Deref,
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
)]
pub struct EthAddress([u8; 20]);

impl EthAddress {
    pub const ZERO: EthAddress = EthAddress([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl From<[u8; 20]> for EthAddress {
    fn from(bytes: [u8; 20]) -> Self {
        EthAddress(bytes)
    }
}

impl From<EthAddress> for [u8; 20] {
    fn from(address: EthAddress) -> Self {
        address.0
    }
}

/// Serializable version of Solana's `AccountMeta`.
///
/// Used by off-chain callers to ship already-encoded instructions through
/// text-only channels (request files) and rebuild them on the other side.
#[derive(AnchorDeserialize, AnchorSerialize, Clone, Debug, PartialEq, Eq)]
pub struct SerializableAccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl From<AccountMeta> for SerializableAccountMeta {
    fn from(account_meta: AccountMeta) -> Self {
        Self {
            pubkey: account_meta.pubkey,
            is_signer: account_meta.is_signer,
            is_writable: account_meta.is_writable,
        }
    }
}

impl From<SerializableAccountMeta> for AccountMeta {
    fn from(meta: SerializableAccountMeta) -> Self {
        AccountMeta {
            pubkey: meta.pubkey,
            is_signer: meta.is_signer,
            is_writable: meta.is_writable,
        }
    }
}
