use anchor_lang::prelude::*;
use derive_new::new;
use ledger_std::account::AccountExt;
use ledger_std::conversion::{points_to_tokens, tokens_to_points};
use ledger_std::{Bytes32, EthAddress};

use crate::instructions::LedgerError;

pub const CONFIG_SEED: &[u8] = b"config";
pub const MINT_SEED: &[u8] = b"mint";
pub const NONCE_SEED: &[u8] = b"nonce";

pub fn mint_pda() -> (Pubkey, u8) {
    Pubkey::find_program_address(&[MINT_SEED], &crate::ID)
}

/// Ledger-wide settings. Mint authority of the reward mint and delegate for burns.
#[account]
#[derive(InitSpace, Debug, PartialEq, Eq)]
pub struct Config {
    pub authority: Pubkey,
    pub operator: Pubkey,
    pub backend_signer: EthAddress,
    pub mint: Pubkey,
    /// Points that convert into one whole token.
    pub points_to_well_rate: u64,
    /// Points value of one whole token on the direct redemption path.
    pub rate: u64,
    pub bump: u8,
}

impl Config {
    pub fn new(
        authority: Pubkey,
        operator: Pubkey,
        backend_signer: EthAddress,
        mint: Pubkey,
        points_to_well_rate: u64,
        rate: u64,
        bump: u8,
    ) -> Result<Self> {
        require!(points_to_well_rate > 0 && rate > 0, LedgerError::InvalidRate);
        require!(!backend_signer.is_zero(), LedgerError::InvalidSigner);
        require!(operator != Pubkey::default(), LedgerError::InvalidOperator);

        Ok(Self {
            authority,
            operator,
            backend_signer,
            mint,
            points_to_well_rate,
            rate,
            bump,
        })
    }

    pub fn pda() -> (Pubkey, u8) {
        Pubkey::find_program_address(&[CONFIG_SEED], &crate::ID)
    }

    pub fn points_to_well(&self, points: u64) -> Result<u64> {
        points_to_tokens(points, self.points_to_well_rate).ok_or(LedgerError::AmountOverflow.into())
    }

    pub fn points_equivalent(&self, amount: u64) -> Result<u64> {
        tokens_to_points(amount, self.rate).ok_or(LedgerError::AmountOverflow.into())
    }

    pub fn set_points_to_well_rate(&mut self, rate: u64) -> Result<u64> {
        require!(rate > 0, LedgerError::InvalidRate);

        Ok(std::mem::replace(&mut self.points_to_well_rate, rate))
    }

    pub fn set_rate(&mut self, rate: u64) -> Result<u64> {
        require!(rate > 0, LedgerError::InvalidRate);

        Ok(std::mem::replace(&mut self.rate, rate))
    }

    pub fn set_backend_signer(&mut self, signer: EthAddress) -> Result<EthAddress> {
        require!(!signer.is_zero(), LedgerError::InvalidSigner);

        Ok(std::mem::replace(&mut self.backend_signer, signer))
    }

    pub fn set_operator(&mut self, operator: Pubkey) -> Result<Pubkey> {
        require!(operator != Pubkey::default(), LedgerError::InvalidOperator);

        Ok(std::mem::replace(&mut self.operator, operator))
    }
}

/// Exists iff its nonce has been consumed by a signed redemption.
#[account]
#[derive(InitSpace, Debug, new)]
pub struct NonceMarker {
    pub user: Pubkey,
    pub consumed_at: i64,
}

impl NonceMarker {
    pub fn pda(nonce: &Bytes32) -> (Pubkey, u8) {
        Pubkey::find_program_address(&[NONCE_SEED, nonce.as_ref()], &crate::ID)
    }
}

impl AccountExt for NonceMarker {}
