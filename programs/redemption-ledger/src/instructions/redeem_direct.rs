use anchor_lang::prelude::*;
use anchor_spl::token::{Mint, Token, TokenAccount};

use crate::events::Redeemed;
use crate::instructions::LedgerError;
use crate::state::{Config, CONFIG_SEED};
use crate::token;

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct RedeemDirectArgs {
    pub reward_id: String,
    pub amount: u64,
}

#[derive(Accounts)]
pub struct RedeemDirect<'info> {
    #[account(seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, Config>,
    #[account(mut, address = config.mint @ LedgerError::InvalidMint)]
    pub mint: Account<'info, Mint>,
    pub user: Signer<'info>,
    #[account(
        mut,
        constraint = user_token.mint == mint.key() @ LedgerError::InvalidTokenAccount,
        constraint = user_token.owner == user.key() @ LedgerError::InvalidTokenAccount,
    )]
    pub user_token: Account<'info, TokenAccount>,
    pub token_program: Program<'info, Token>,
}

pub fn redeem_tokens(ctx: Context<RedeemDirect>, args: RedeemDirectArgs) -> Result<()> {
    let RedeemDirectArgs { reward_id, amount } = args;
    let config = &ctx.accounts.config;
    let user_token = &ctx.accounts.user_token;

    require!(amount > 0, LedgerError::ZeroAmount);
    require!(
        user_token.amount >= amount,
        LedgerError::InsufficientBalance
    );
    require!(
        token::allowance(user_token, &config.key()) >= amount,
        LedgerError::InsufficientAllowance
    );
    let points_equivalent = config.points_equivalent(amount)?;

    token::burn(
        &ctx.accounts.token_program,
        &ctx.accounts.mint,
        user_token,
        config,
        amount,
    )?;

    emit!(Redeemed::new(
        ctx.accounts.user.key(),
        reward_id,
        amount,
        points_equivalent
    ));

    Ok(())
}
