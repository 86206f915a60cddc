use anchor_lang::prelude::AccountMeta;
use ledger_std::SCALE;
use redemption_ledger::events::{BatchReconciled, UserReconciled};
use redemption_ledger::instructions::LedgerError;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;

pub mod common;

fn users(ctx: &mut common::Context, count: usize) -> Vec<Pubkey> {
    (0..count).map(|_| ctx.new_user().pubkey()).collect()
}

#[test]
fn batch_reconcile_mints_points_at_rate() {
    let mut ctx = common::Context::initialized();
    let users = users(&mut ctx, 1);

    let result = ctx.ledger().batch_reconcile(&users, &[250]);

    assert!(result
        .clone()
        .is_ok_and(common::contains_event(UserReconciled::new(
            users[0],
            250,
            2_500_000_000
        ))));
    assert!(result.is_ok_and(common::contains_event(BatchReconciled::new(
        1,
        250,
        2_500_000_000
    ))));
    assert_eq!(ctx.token_balance(&users[0]), 2_500_000_000);
    assert_eq!(ctx.supply(), 2_500_000_000);
}

#[test]
fn batch_reconcile_skips_zero_points() {
    let mut ctx = common::Context::initialized();
    let users = users(&mut ctx, 3);

    let result = ctx.ledger().batch_reconcile(&users, &[0, 100, 50]);

    assert!(result.is_ok_and(common::contains_event(BatchReconciled::new(
        2,
        150,
        SCALE + SCALE / 2
    ))));
    assert_eq!(ctx.token_balance(&users[0]), 0);
    assert_eq!(ctx.token_balance(&users[1]), SCALE);
    assert_eq!(ctx.token_balance(&users[2]), SCALE / 2);
}

#[test]
fn batch_reconcile_fail_length_mismatch() {
    let mut ctx = common::Context::initialized();
    let users = users(&mut ctx, 2);

    let result = ctx.ledger().batch_reconcile(&users, &[100]);

    assert!(result.is_err_and(common::is_error(LedgerError::ArrayLengthMismatch)));
    assert_eq!(ctx.supply(), 0);
}

#[test]
fn batch_reconcile_fail_not_operator() {
    let mut ctx = common::Context::initialized();
    let users = users(&mut ctx, 1);
    let impostor = Keypair::new();
    let token_accounts = vec![AccountMeta::new(common::token_account(&users[0]), false)];

    let result = ctx
        .ledger()
        .batch_reconcile_with(&impostor, &users, &[100], token_accounts);

    assert!(result.is_err_and(common::is_error(LedgerError::InvalidOperator)));
    assert_eq!(ctx.token_balance(&users[0]), 0);
}

#[test]
fn batch_reconcile_fail_foreign_token_account() {
    let mut ctx = common::Context::initialized();
    let users = users(&mut ctx, 2);
    let stranger = ctx.new_user().pubkey();
    let operator = ctx.operator.insecure_clone();
    let token_accounts = vec![
        AccountMeta::new(common::token_account(&users[0]), false),
        AccountMeta::new(common::token_account(&stranger), false),
    ];

    let result = ctx
        .ledger()
        .batch_reconcile_with(&operator, &users, &[100, 100], token_accounts);

    assert!(result.is_err_and(common::is_error(LedgerError::InvalidTokenAccount)));
    assert_eq!(ctx.token_balance(&users[0]), 0);
    assert_eq!(ctx.token_balance(&stranger), 0);
}

#[test]
fn batch_reconcile_fail_missing_token_accounts() {
    let mut ctx = common::Context::initialized();
    let users = users(&mut ctx, 2);
    let operator = ctx.operator.insecure_clone();
    let token_accounts = vec![AccountMeta::new(common::token_account(&users[0]), false)];

    let result = ctx
        .ledger()
        .batch_reconcile_with(&operator, &users, &[100, 100], token_accounts);

    assert!(result.is_err_and(common::is_error(LedgerError::InvalidRemainingAccounts)));
}
