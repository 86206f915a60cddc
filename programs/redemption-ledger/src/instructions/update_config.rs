use anchor_lang::prelude::*;
use ledger_std::EthAddress;

use crate::events::{BackendSignerUpdated, OperatorUpdated, PointsToWellRateUpdated, RateUpdated};
use crate::instructions::LedgerError;
use crate::state::{Config, CONFIG_SEED};

#[derive(Accounts)]
pub struct UpdateConfig<'info> {
    #[account(mut, seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, Config>,
    #[account(address = config.authority @ LedgerError::InvalidAuthority)]
    pub authority: Signer<'info>,
}

pub fn update_points_to_well_rate(ctx: Context<UpdateConfig>, rate: u64) -> Result<()> {
    let old = ctx.accounts.config.set_points_to_well_rate(rate)?;

    emit!(PointsToWellRateUpdated::new(old, rate));

    Ok(())
}

pub fn update_rate(ctx: Context<UpdateConfig>, rate: u64) -> Result<()> {
    let old = ctx.accounts.config.set_rate(rate)?;

    emit!(RateUpdated::new(old, rate));

    Ok(())
}

pub fn update_backend_signer(ctx: Context<UpdateConfig>, signer: EthAddress) -> Result<()> {
    let old = ctx.accounts.config.set_backend_signer(signer)?;

    emit!(BackendSignerUpdated::new(old, signer));

    Ok(())
}

pub fn update_operator(ctx: Context<UpdateConfig>, operator: Pubkey) -> Result<()> {
    let old = ctx.accounts.config.set_operator(operator)?;

    emit!(OperatorUpdated::new(old, operator));

    Ok(())
}
