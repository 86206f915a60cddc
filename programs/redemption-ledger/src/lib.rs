use anchor_lang::prelude::*;

declare_id!("3YTsVxLFJbgVKbZPfS4BRpLirkZxR76PZvc756bRz54R");

pub mod events;
pub mod instructions;
pub mod state;
pub mod token;

use instructions::*;
use ledger_std::{Bytes32, EthAddress};

#[program]
pub mod redemption_ledger {
    use super::*;

    pub fn initialize(ctx: Context<Initialize>, args: InitializeArgs) -> Result<()> {
        initialize_ledger(ctx, args)
    }

    pub fn redeem_direct(ctx: Context<RedeemDirect>, args: RedeemDirectArgs) -> Result<()> {
        redeem_tokens(ctx, args)
    }

    pub fn redeem_with_points(
        ctx: Context<RedeemWithPoints>,
        args: RedeemWithPointsArgs,
    ) -> Result<()> {
        redeem_points(ctx, args)
    }

    pub fn batch_reconcile<'info>(
        ctx: Context<'_, '_, '_, 'info, BatchReconcile<'info>>,
        args: BatchReconcileArgs,
    ) -> Result<()> {
        reconcile_batch(ctx, args)
    }

    pub fn set_points_to_well_rate(ctx: Context<UpdateConfig>, rate: u64) -> Result<()> {
        update_points_to_well_rate(ctx, rate)
    }

    pub fn set_rate(ctx: Context<UpdateConfig>, rate: u64) -> Result<()> {
        update_rate(ctx, rate)
    }

    pub fn set_backend_signer(ctx: Context<UpdateConfig>, signer: EthAddress) -> Result<()> {
        update_backend_signer(ctx, signer)
    }

    pub fn set_operator(ctx: Context<UpdateConfig>, operator: Pubkey) -> Result<()> {
        update_operator(ctx, operator)
    }

    pub fn get_rate(ctx: Context<ReadConfig>) -> Result<Rates> {
        read_rates(ctx)
    }

    pub fn points_to_well(ctx: Context<ReadConfig>, points: u64) -> Result<u64> {
        convert_points(ctx, points)
    }

    pub fn can_user_redeem(ctx: Context<CanUserRedeem>, amount: u64) -> Result<bool> {
        check_can_redeem(ctx, amount)
    }

    pub fn is_nonce_used(ctx: Context<IsNonceUsed>, nonce: Bytes32) -> Result<bool> {
        check_nonce_used(ctx, nonce)
    }
}
