use anchor_lang::prelude::*;
use anchor_spl::token::{Mint, Token, TokenAccount};
use ledger_std::account::AccountExt;
use ledger_std::authorization::{recover_signer, Authorization, SIGNATURE_LEN};
use ledger_std::{Bytes32, EthAddress};

use crate::events::PointsRedeemed;
use crate::instructions::LedgerError;
use crate::state::{Config, NonceMarker, CONFIG_SEED, NONCE_SEED};
use crate::token;

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct RedeemWithPointsArgs {
    pub user: Pubkey,
    pub points: u64,
    pub reward_id: String,
    pub nonce: Bytes32,
    pub deadline: i64,
    pub signature: [u8; SIGNATURE_LEN],
}

impl RedeemWithPointsArgs {
    pub fn authorization(&self) -> Authorization {
        Authorization {
            user: self.user,
            points: self.points,
            reward_id: self.reward_id.clone(),
            nonce: self.nonce,
            deadline: self.deadline,
        }
    }
}

#[derive(Accounts)]
#[instruction(args: RedeemWithPointsArgs)]
pub struct RedeemWithPoints<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,
    #[account(seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, Config>,
    #[account(mut, address = config.mint @ LedgerError::InvalidMint)]
    pub mint: Account<'info, Mint>,
    #[account(
        mut,
        constraint = user_token.mint == mint.key() @ LedgerError::InvalidTokenAccount,
        constraint = user_token.owner == args.user @ LedgerError::InvalidTokenAccount,
    )]
    pub user_token: Account<'info, TokenAccount>,
    /// CHECK: address is validated
    #[account(mut)]
    pub nonce_marker: UncheckedAccount<'info>,
    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
}

pub fn redeem_points(ctx: Context<RedeemWithPoints>, args: RedeemWithPointsArgs) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let config = &ctx.accounts.config;

    let bump = nonce_marker_bump(&ctx.accounts.nonce_marker, &args.nonce)?;
    check_authorization(
        &args,
        now,
        NonceMarker::exists(&ctx.accounts.nonce_marker),
        &config.backend_signer,
    )?;

    let amount = config.points_to_well(args.points)?;
    let user_token = &ctx.accounts.user_token;
    require!(
        user_token.amount >= amount,
        LedgerError::InsufficientWellBalance
    );
    require!(
        token::allowance(user_token, &config.key()) >= amount,
        LedgerError::InsufficientWellAllowance
    );

    // consumed before the burn
    consume_nonce(&ctx, &args.nonce, args.user, bump, now)?;

    token::burn(
        &ctx.accounts.token_program,
        &ctx.accounts.mint,
        user_token,
        config,
        amount,
    )?;

    let RedeemWithPointsArgs {
        user,
        points,
        reward_id,
        nonce,
        ..
    } = args;
    emit!(PointsRedeemed::new(user, points, reward_id, nonce, amount));

    Ok(())
}

/// Preconditions of a points redemption, cheapest first.
pub(crate) fn check_authorization(
    args: &RedeemWithPointsArgs,
    now: i64,
    nonce_used: bool,
    backend_signer: &EthAddress,
) -> Result<()> {
    require!(args.points != 0, LedgerError::ZeroPoints);
    require!(now <= args.deadline, LedgerError::SignatureExpired);
    require!(!nonce_used, LedgerError::NonceAlreadyUsed);
    require!(
        is_authorized(args, backend_signer),
        LedgerError::InvalidSignature
    );

    Ok(())
}

fn nonce_marker_bump(nonce_marker: &AccountInfo, nonce: &Bytes32) -> Result<u8> {
    let (nonce_marker_pda, bump) = NonceMarker::pda(nonce);
    require_keys_eq!(
        nonce_marker.key(),
        nonce_marker_pda,
        LedgerError::InvalidNonceMarker
    );

    Ok(bump)
}

fn is_authorized(args: &RedeemWithPointsArgs, backend_signer: &EthAddress) -> bool {
    let digest = args.authorization().digest(&crate::ID);

    recover_signer(&digest, &args.signature).as_ref() == Some(backend_signer)
}

fn consume_nonce(
    ctx: &Context<RedeemWithPoints>,
    nonce: &Bytes32,
    user: Pubkey,
    bump: u8,
    now: i64,
) -> Result<()> {
    let signer_seeds = [NONCE_SEED, nonce.as_ref(), &[bump]];

    NonceMarker::new(user, now).init(
        &ctx.accounts.nonce_marker,
        &ctx.accounts.payer,
        &ctx.accounts.system_program,
        &[&signer_seeds],
    )
}
