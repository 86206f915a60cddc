use anchor_lang::prelude::*;
use anchor_lang::solana_program::program::invoke_signed;
use anchor_lang::solana_program::system_instruction;

/// Program-owned PDA records that are created lazily from inside an instruction
/// (rather than through an `init` constraint) so the handler can decide the
/// order of its own checks before the account exists.
pub trait AccountExt: AccountSerialize + AccountDeserialize + Owner + Space {
    /// Size of the record including the 8-byte discriminator.
    fn data_len() -> usize {
        8 + Self::INIT_SPACE
    }

    /// A record exists once the program owns the address and it carries data.
    fn exists(account: &AccountInfo<'_>) -> bool {
        !account.data_is_empty() && *account.owner == Self::owner()
    }

    /// Creates the record at `account` and writes `self` into it.
    ///
    /// Fails with `ConstraintZero` if the record already exists.
    fn init<'info>(
        self,
        account: &AccountInfo<'info>,
        payer: &AccountInfo<'info>,
        system_program: &Program<'info, System>,
        signer_seeds: &[&[&[u8]]],
    ) -> Result<()> {
        require!(
            !Self::exists(account),
            anchor_lang::error::ErrorCode::ConstraintZero
        );

        allocate_pda(
            account,
            payer,
            system_program,
            &Self::owner(),
            Self::data_len(),
            signer_seeds,
        )?;

        self.try_serialize(&mut &mut account.try_borrow_mut_data()?[..])
    }
}

/// Turns `account` into a rent-exempt, `owner`-owned account of `space` bytes.
///
/// Someone may have sent lamports to the address ahead of time; `create_account`
/// refuses funded addresses, so that case is handled as top-up, allocate, assign.
pub fn allocate_pda<'info>(
    account: &AccountInfo<'info>,
    payer: &AccountInfo<'info>,
    system_program: &Program<'info, System>,
    owner: &Pubkey,
    space: usize,
    signer_seeds: &[&[&[u8]]],
) -> Result<()> {
    let rent_exempt = Rent::get()?.minimum_balance(space);
    let funding_accounts = [
        payer.to_account_info(),
        account.to_account_info(),
        system_program.to_account_info(),
    ];

    if account.lamports() == 0 {
        invoke_signed(
            &system_instruction::create_account(
                payer.key,
                account.key,
                rent_exempt,
                space as u64,
                owner,
            ),
            &funding_accounts,
            signer_seeds,
        )?;

        return Ok(());
    }

    let shortfall = rent_exempt.saturating_sub(account.lamports());
    if shortfall > 0 {
        invoke_signed(
            &system_instruction::transfer(payer.key, account.key, shortfall),
            &funding_accounts,
            signer_seeds,
        )?;
    }

    let own_accounts = [account.to_account_info(), system_program.to_account_info()];
    invoke_signed(
        &system_instruction::allocate(account.key, space as u64),
        &own_accounts,
        signer_seeds,
    )?;
    invoke_signed(
        &system_instruction::assign(account.key, owner),
        &own_accounts,
        signer_seeds,
    )?;

    Ok(())
}
