//! Side-effect-free reads. Results travel back as return data.

use anchor_lang::prelude::*;
use anchor_spl::token::TokenAccount;
use ledger_std::account::AccountExt;
use ledger_std::Bytes32;

use crate::instructions::LedgerError;
use crate::state::{Config, NonceMarker, CONFIG_SEED, NONCE_SEED};
use crate::token;

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rates {
    pub points_to_well_rate: u64,
    pub rate: u64,
}

#[derive(Accounts)]
pub struct ReadConfig<'info> {
    #[account(seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, Config>,
}

#[derive(Accounts)]
pub struct CanUserRedeem<'info> {
    #[account(seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, Config>,
    #[account(constraint = user_token.mint == config.mint @ LedgerError::InvalidTokenAccount)]
    pub user_token: Account<'info, TokenAccount>,
}

#[derive(Accounts)]
#[instruction(nonce: Bytes32)]
pub struct IsNonceUsed<'info> {
    /// CHECK: address is validated
    #[account(seeds = [NONCE_SEED, nonce.as_ref()], bump)]
    pub nonce_marker: UncheckedAccount<'info>,
}

pub fn read_rates(ctx: Context<ReadConfig>) -> Result<Rates> {
    let config = &ctx.accounts.config;

    Ok(Rates {
        points_to_well_rate: config.points_to_well_rate,
        rate: config.rate,
    })
}

pub fn convert_points(ctx: Context<ReadConfig>, points: u64) -> Result<u64> {
    ctx.accounts.config.points_to_well(points)
}

/// Whether `redeem_direct` with `amount` would pass its balance and allowance checks.
pub fn check_can_redeem(ctx: Context<CanUserRedeem>, amount: u64) -> Result<bool> {
    let user_token = &ctx.accounts.user_token;

    Ok(amount > 0
        && user_token.amount >= amount
        && token::allowance(user_token, &ctx.accounts.config.key()) >= amount)
}

pub fn check_nonce_used(ctx: Context<IsNonceUsed>, _nonce: Bytes32) -> Result<bool> {
    Ok(NonceMarker::exists(&ctx.accounts.nonce_marker))
}
