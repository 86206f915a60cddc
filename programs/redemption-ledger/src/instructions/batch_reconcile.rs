use anchor_lang::prelude::*;
use anchor_spl::associated_token::get_associated_token_address;
use anchor_spl::token::{Mint, Token};
use ledger_std::MAX_BATCH;

use crate::events::{BatchReconciled, UserReconciled};
use crate::instructions::LedgerError;
use crate::state::{Config, CONFIG_SEED};
use crate::token;

#[derive(AnchorSerialize, AnchorDeserialize, Clone)]
pub struct BatchReconcileArgs {
    pub users: Vec<Pubkey>,
    pub points: Vec<u64>,
}

/// Remaining accounts: the users' associated token accounts, in `users` order.
#[derive(Accounts)]
pub struct BatchReconcile<'info> {
    #[account(seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, Config>,
    #[account(address = config.operator @ LedgerError::InvalidOperator)]
    pub operator: Signer<'info>,
    #[account(mut, address = config.mint @ LedgerError::InvalidMint)]
    pub mint: Account<'info, Mint>,
    pub token_program: Program<'info, Token>,
}

struct Settlement<'info> {
    user: Pubkey,
    points: u64,
    amount: u64,
    token_account: AccountInfo<'info>,
}

pub fn reconcile_batch<'info>(
    ctx: Context<'_, '_, '_, 'info, BatchReconcile<'info>>,
    args: BatchReconcileArgs,
) -> Result<()> {
    let BatchReconcileArgs { users, points } = args;

    validate_shape(users.len(), points.len(), ctx.remaining_accounts.len())?;

    let settlements = plan_settlements(
        &ctx.accounts.config,
        &ctx.accounts.mint.key(),
        &users,
        &points,
        ctx.remaining_accounts,
    )?;

    let (total_points, total_amount) = settlements.iter().try_fold(
        (0u64, 0u64),
        |(total_points, total_amount), settlement| {
            Some((
                total_points.checked_add(settlement.points)?,
                total_amount.checked_add(settlement.amount)?,
            ))
        },
    )
    .ok_or(LedgerError::AmountOverflow)?;

    for settlement in &settlements {
        token::mint_to(
            &ctx.accounts.token_program,
            &ctx.accounts.mint,
            &settlement.token_account,
            &ctx.accounts.config,
            settlement.amount,
        )?;

        emit!(UserReconciled::new(
            settlement.user,
            settlement.points,
            settlement.amount
        ));
    }

    emit!(BatchReconciled::new(
        settlements.len() as u32,
        total_points,
        total_amount
    ));

    Ok(())
}

fn validate_shape(users: usize, points: usize, token_accounts: usize) -> Result<()> {
    require!(users == points, LedgerError::ArrayLengthMismatch);
    require!(users <= MAX_BATCH, LedgerError::BatchTooLarge);
    require!(
        token_accounts == users,
        LedgerError::InvalidRemainingAccounts
    );

    Ok(())
}

// zero-point entries are dropped, everything else is validated before any mint
fn plan_settlements<'info>(
    config: &Config,
    mint: &Pubkey,
    users: &[Pubkey],
    points: &[u64],
    token_accounts: &[AccountInfo<'info>],
) -> Result<Vec<Settlement<'info>>> {
    users
        .iter()
        .zip(points)
        .zip(token_accounts)
        .filter(|((_, points), _)| **points > 0)
        .map(|((user, points), token_account)| {
            require_keys_eq!(
                token_account.key(),
                get_associated_token_address(user, mint),
                LedgerError::InvalidTokenAccount
            );

            Ok(Settlement {
                user: *user,
                points: *points,
                amount: config.points_to_well(*points)?,
                token_account: token_account.clone(),
            })
        })
        .collect()
}
