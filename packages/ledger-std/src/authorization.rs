//! Typed, domain-separated authorization digest for points redemptions.
//!
//! The layout follows EIP-712: `keccak(0x19 0x01 || domainSeparator || structHash)`,
//! so any secp256k1 signer that speaks typed data can produce the signature. The
//! ledger program and the off-chain issuer both hash through this module.

use anchor_lang::prelude::*;
use anchor_lang::solana_program::secp256k1_recover::secp256k1_recover;
use tiny_keccak::{Hasher, Keccak};

use crate::{Bytes32, EthAddress, CHAIN_ID};

pub const DOMAIN_NAME: &str = "RedemptionLedger";
pub const DOMAIN_VERSION: &str = "1";
pub const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,bytes32 verifyingContract)";
pub const AUTHORIZATION_TYPE: &str =
    "RedeemWithPoints(bytes32 user,uint256 points,string rewardId,bytes32 nonce,int256 deadline)";

pub const SIGNATURE_LEN: usize = 65;

// secp256k1 group order / 2, signatures with a larger `s` are malleable twins.
const HALF_ORDER: [u8; 32] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b, 0x20, 0xa0,
];

/// The message a backend signer approves for one points redemption.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct Authorization {
    pub user: Pubkey,
    pub points: u64,
    pub reward_id: String,
    pub nonce: Bytes32,
    pub deadline: i64,
}

impl Authorization {
    pub fn struct_hash(&self) -> [u8; 32] {
        let mut hasher = Keccak::v256();

        hasher.update(&keccak(AUTHORIZATION_TYPE.as_bytes()));
        hasher.update(self.user.as_ref());
        hasher.update(&u256_be(self.points));
        hasher.update(&keccak(self.reward_id.as_bytes()));
        hasher.update(self.nonce.as_ref());
        hasher.update(&i256_be(self.deadline));

        finalize(hasher)
    }

    /// Digest signed by the backend, bound to the ledger deployed at `program_id`.
    pub fn digest(&self, program_id: &Pubkey) -> [u8; 32] {
        let mut hasher = Keccak::v256();

        hasher.update(&[0x19, 0x01]);
        hasher.update(&domain_separator(program_id));
        hasher.update(&self.struct_hash());

        finalize(hasher)
    }
}

pub fn domain_separator(program_id: &Pubkey) -> [u8; 32] {
    let mut hasher = Keccak::v256();

    hasher.update(&keccak(DOMAIN_TYPE.as_bytes()));
    hasher.update(&keccak(DOMAIN_NAME.as_bytes()));
    hasher.update(&keccak(DOMAIN_VERSION.as_bytes()));
    hasher.update(&u256_be(CHAIN_ID));
    hasher.update(program_id.as_ref());

    finalize(hasher)
}

/// Recovers the address that produced `signature` (`r || s || v`) over `digest`.
///
/// `v` may be given as 0/1 or 27/28. High-`s` signatures are rejected.
pub fn recover_signer(digest: &[u8; 32], signature: &[u8; SIGNATURE_LEN]) -> Option<EthAddress> {
    let recovery_id = match signature[64] {
        v @ (0 | 1) => v,
        v @ (27 | 28) => v - 27,
        _ => return None,
    };

    if signature[32..64] > HALF_ORDER[..] {
        return None;
    }

    let public_key = secp256k1_recover(digest, recovery_id, &signature[..64]).ok()?;

    Some(address_of(&public_key.to_bytes()))
}

/// Ethereum-style address of an uncompressed (64-byte, no prefix) public key.
pub fn address_of(public_key: &[u8; 64]) -> EthAddress {
    let hash = keccak(public_key);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);

    address.into()
}

fn keccak(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(bytes);

    finalize(hasher)
}

fn finalize(hasher: Keccak) -> [u8; 32] {
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);

    out
}

fn u256_be(value: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[24..].copy_from_slice(&value.to_be_bytes());

    out
}

// two's complement, sign-extended to 256 bits
fn i256_be(value: i64) -> [u8; 32] {
    let mut out = if value < 0 { [0xffu8; 32] } else { [0u8; 32] };
    out[24..].copy_from_slice(&value.to_be_bytes());

    out
}
