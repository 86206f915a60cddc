use alloy_signer_local::PrivateKeySigner;
use redemption_ledger::events::{
    BackendSignerUpdated, OperatorUpdated, PointsToWellRateUpdated, RateUpdated,
};
use redemption_ledger::instructions::LedgerError;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;

pub mod common;

#[test]
fn set_rate_success() {
    let mut ctx = common::Context::initialized();
    let authority = ctx.authority.insecure_clone();

    let result = ctx.ledger().set_rate(&authority, 150);

    assert!(result.is_ok_and(common::contains_event(RateUpdated::new(
        common::RATE,
        150
    ))));
    assert_eq!(ctx.config().rate, 150);
}

#[test]
fn set_rate_fail_not_authority() {
    let mut ctx = common::Context::initialized();
    let operator = ctx.operator.insecure_clone();

    let result = ctx.ledger().set_rate(&operator, 150);

    assert!(result.is_err_and(common::is_error(LedgerError::InvalidAuthority)));
    assert_eq!(ctx.config().rate, common::RATE);
}

#[test]
fn set_rate_fail_zero() {
    let mut ctx = common::Context::initialized();
    let authority = ctx.authority.insecure_clone();

    let result = ctx.ledger().set_rate(&authority, 0);

    assert!(result.is_err_and(common::is_error(LedgerError::InvalidRate)));
}

#[test]
fn set_points_to_well_rate_applies_to_next_batch() {
    let mut ctx = common::Context::initialized();
    let authority = ctx.authority.insecure_clone();
    let user = ctx.new_user().pubkey();

    let result = ctx.ledger().set_points_to_well_rate(&authority, 200);
    assert!(result.is_ok_and(common::contains_event(PointsToWellRateUpdated::new(
        common::POINTS_TO_WELL_RATE,
        200
    ))));

    ctx.ledger().batch_reconcile(&[user], &[250]).unwrap();

    assert_eq!(ctx.token_balance(&user), 1_250_000_000);
}

#[test]
fn set_backend_signer_rotates_authorizations() {
    let mut ctx = common::Context::initialized();
    let authority = ctx.authority.insecure_clone();
    let user = ctx.new_user();
    ctx.ledger()
        .batch_reconcile(&[user.pubkey()], &[500])
        .unwrap();
    ctx.approve(&user, 5_000_000_000);
    let stale = ctx.authorization(&user.pubkey(), 100, "coffee_voucher");
    let old = ctx.backend_address();

    ctx.backend = PrivateKeySigner::random();
    let new = ctx.backend_address();
    let result = ctx.ledger().set_backend_signer(&authority, new);
    assert!(result.is_ok_and(common::contains_event(BackendSignerUpdated::new(old, new))));

    let result = ctx.ledger().redeem_with_points(stale);
    assert!(result.is_err_and(common::is_error(LedgerError::InvalidSignature)));

    let fresh = ctx.authorization(&user.pubkey(), 100, "coffee_voucher");
    assert!(ctx.ledger().redeem_with_points(fresh).is_ok());
}

#[test]
fn set_operator_hands_over_reconciliation() {
    let mut ctx = common::Context::initialized();
    let authority = ctx.authority.insecure_clone();
    let old = ctx.operator.insecure_clone();
    let new = Keypair::new();
    let user = ctx.new_user().pubkey();
    let token_accounts = || [anchor_lang::prelude::AccountMeta::new(common::token_account(&user), false)];

    let result = ctx.ledger().set_operator(&authority, new.pubkey());
    assert!(result.is_ok_and(common::contains_event(OperatorUpdated::new(
        old.pubkey(),
        new.pubkey()
    ))));

    let result = ctx
        .ledger()
        .batch_reconcile_with(&old, &[user], &[100], token_accounts());
    assert!(result.is_err_and(common::is_error(LedgerError::InvalidOperator)));

    let result = ctx
        .ledger()
        .batch_reconcile_with(&new, &[user], &[100], token_accounts());
    assert!(result.is_ok());
    assert_eq!(ctx.config().operator, new.pubkey());
}

#[test]
fn set_operator_fail_default_key() {
    let mut ctx = common::Context::initialized();
    let authority = ctx.authority.insecure_clone();

    let result = ctx.ledger().set_operator(&authority, Pubkey::default());

    assert!(result.is_err_and(common::is_error(LedgerError::InvalidOperator)));
}
