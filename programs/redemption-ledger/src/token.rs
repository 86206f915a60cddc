use anchor_lang::prelude::*;
use anchor_lang::solana_program::program_option::COption;
use anchor_spl::token::{self, Burn, Mint, MintTo, Token, TokenAccount};

use crate::state::{Config, CONFIG_SEED};

/// Amount `spender` may still burn from `account`.
pub fn allowance(account: &TokenAccount, spender: &Pubkey) -> u64 {
    match account.delegate {
        COption::Some(delegate) if delegate == *spender => account.delegated_amount,
        _ => 0,
    }
}

/// Burns `amount` from `from` using the config PDA's delegation.
pub fn burn<'info>(
    token_program: &Program<'info, Token>,
    mint: &Account<'info, Mint>,
    from: &Account<'info, TokenAccount>,
    config: &Account<'info, Config>,
    amount: u64,
) -> Result<()> {
    let signer_seeds: &[&[u8]] = &[CONFIG_SEED, &[config.bump]];

    token::burn(
        CpiContext::new_with_signer(
            token_program.to_account_info(),
            Burn {
                mint: mint.to_account_info(),
                from: from.to_account_info(),
                authority: config.to_account_info(),
            },
            &[signer_seeds],
        ),
        amount,
    )
}

pub fn mint_to<'info>(
    token_program: &Program<'info, Token>,
    mint: &Account<'info, Mint>,
    to: &AccountInfo<'info>,
    config: &Account<'info, Config>,
    amount: u64,
) -> Result<()> {
    let signer_seeds: &[&[u8]] = &[CONFIG_SEED, &[config.bump]];

    token::mint_to(
        CpiContext::new_with_signer(
            token_program.to_account_info(),
            MintTo {
                mint: mint.to_account_info(),
                to: to.clone(),
                authority: config.to_account_info(),
            },
            &[signer_seeds],
        ),
        amount,
    )
}
