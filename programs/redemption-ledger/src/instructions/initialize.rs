use anchor_lang::prelude::*;
use anchor_spl::token::{Mint, Token};
use ledger_std::{EthAddress, DECIMALS};

use crate::events::LedgerInitialized;
use crate::instructions::LedgerError;
use crate::program::RedemptionLedger;
use crate::state::{Config, CONFIG_SEED, MINT_SEED};

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct InitializeArgs {
    pub operator: Pubkey,
    pub backend_signer: EthAddress,
    pub points_to_well_rate: u64,
    pub rate: u64,
}

#[derive(Accounts)]
pub struct Initialize<'info> {
    #[account(
        init,
        payer = authority,
        space = 8 + Config::INIT_SPACE,
        seeds = [CONFIG_SEED],
        bump
    )]
    pub config: Account<'info, Config>,
    #[account(
        init,
        payer = authority,
        seeds = [MINT_SEED],
        bump,
        mint::decimals = DECIMALS,
        mint::authority = config,
    )]
    pub mint: Account<'info, Mint>,
    /// The upgrade authority of the deployed program.
    #[account(mut)]
    pub authority: Signer<'info>,
    #[account(
        constraint = program.programdata_address()? == Some(program_data.key())
            @ LedgerError::InvalidProgramData
    )]
    pub program: Program<'info, RedemptionLedger>,
    #[account(
        constraint = program_data.upgrade_authority_address == Some(authority.key())
            @ LedgerError::InvalidAuthority
    )]
    pub program_data: Account<'info, ProgramData>,
    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
}

pub fn initialize_ledger(ctx: Context<Initialize>, args: InitializeArgs) -> Result<()> {
    let InitializeArgs {
        operator,
        backend_signer,
        points_to_well_rate,
        rate,
    } = args;
    let authority = ctx.accounts.authority.key();
    let mint = ctx.accounts.mint.key();

    ctx.accounts.config.set_inner(Config::new(
        authority,
        operator,
        backend_signer,
        mint,
        points_to_well_rate,
        rate,
        ctx.bumps.config,
    )?);

    emit!(LedgerInitialized::new(
        authority,
        operator,
        backend_signer,
        mint,
        points_to_well_rate,
        rate
    ));

    Ok(())
}
