use anchor_lang::prelude::*;

pub mod batch_reconcile;
pub mod initialize;
pub mod redeem_direct;
pub mod redeem_with_points;
pub mod update_config;
pub mod views;

pub use batch_reconcile::*;
pub use initialize::*;
pub use redeem_direct::*;
pub use redeem_with_points::*;
pub use update_config::*;
pub use views::*;

#[error_code]
pub enum LedgerError {
    ZeroPoints,
    ZeroAmount,
    SignatureExpired,
    NonceAlreadyUsed,
    InvalidSignature,
    InsufficientBalance,
    InsufficientAllowance,
    InsufficientWellBalance,
    InsufficientWellAllowance,
    ArrayLengthMismatch,
    BatchTooLarge,
    InvalidRate,
    InvalidSigner,
    InvalidOperator,
    InvalidAuthority,
    InvalidMint,
    InvalidNonceMarker,
    InvalidTokenAccount,
    InvalidRemainingAccounts,
    AmountOverflow,
    InvalidProgramData,
}
