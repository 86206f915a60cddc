use anchor_lang::prelude::AccountMeta;
use anchor_lang::{AnchorDeserialize, InstructionData, ToAccountMetas};
use derive_more::{Deref, DerefMut};
use ledger_std::{Bytes32, EthAddress};
use redemption_ledger::instructions::{
    BatchReconcileArgs, InitializeArgs, Rates, RedeemDirectArgs, RedeemWithPointsArgs,
};
use redemption_ledger::state::{mint_pda, Config, NonceMarker};
#[allow(deprecated)]
use solana_sdk::bpf_loader_upgradeable::get_program_data_address;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;

use crate::common::{token_account, Context, TransactionResult};

#[derive(Deref, DerefMut)]
pub struct Ledger<'a>(&'a mut Context);

impl Context {
    pub fn ledger(&mut self) -> Ledger {
        Ledger(self)
    }
}

impl Ledger<'_> {
    pub fn initialize(&mut self, points_to_well_rate: u64, rate: u64) -> TransactionResult {
        let authority = self.authority.insecure_clone();

        self.initialize_as(&authority, points_to_well_rate, rate)
    }

    pub fn initialize_as(
        &mut self,
        authority: &Keypair,
        points_to_well_rate: u64,
        rate: u64,
    ) -> TransactionResult {
        let args = InitializeArgs {
            operator: self.operator.pubkey(),
            backend_signer: self.backend_address(),
            points_to_well_rate,
            rate,
        };
        let instruction = redemption_ledger::instruction::Initialize { args };
        let accounts = redemption_ledger::accounts::Initialize {
            config: Config::pda().0,
            mint: mint_pda().0,
            authority: authority.pubkey(),
            program: redemption_ledger::ID,
            program_data: get_program_data_address(&redemption_ledger::ID),
            token_program: anchor_spl::token::ID,
            system_program: anchor_lang::system_program::ID,
        }
        .to_account_metas(None);

        self.send(&[instruction_of(accounts, instruction.data())], &[authority])
    }

    pub fn redeem_direct(&mut self, user: &Keypair, reward_id: &str, amount: u64) -> TransactionResult {
        let args = RedeemDirectArgs {
            reward_id: reward_id.to_string(),
            amount,
        };
        let instruction = redemption_ledger::instruction::RedeemDirect { args };
        let accounts = redemption_ledger::accounts::RedeemDirect {
            config: Config::pda().0,
            mint: mint_pda().0,
            user: user.pubkey(),
            user_token: token_account(&user.pubkey()),
            token_program: anchor_spl::token::ID,
        }
        .to_account_metas(None);

        self.send(&[instruction_of(accounts, instruction.data())], &[user])
    }

    /// Submitted by the context payer, the user does not sign.
    pub fn redeem_with_points(&mut self, args: RedeemWithPointsArgs) -> TransactionResult {
        let accounts = redemption_ledger::accounts::RedeemWithPoints {
            payer: self.payer.pubkey(),
            config: Config::pda().0,
            mint: mint_pda().0,
            user_token: token_account(&args.user),
            nonce_marker: NonceMarker::pda(&args.nonce).0,
            token_program: anchor_spl::token::ID,
            system_program: anchor_lang::system_program::ID,
        }
        .to_account_metas(None);
        let instruction = redemption_ledger::instruction::RedeemWithPoints { args };

        self.send(&[instruction_of(accounts, instruction.data())], &[])
    }

    pub fn batch_reconcile(&mut self, users: &[Pubkey], points: &[u64]) -> TransactionResult {
        let operator = self.operator.insecure_clone();
        let token_accounts = users
            .iter()
            .map(|user| AccountMeta::new(token_account(user), false));

        self.batch_reconcile_with(&operator, users, points, token_accounts)
    }

    pub fn batch_reconcile_with(
        &mut self,
        operator: &Keypair,
        users: &[Pubkey],
        points: &[u64],
        token_accounts: impl IntoIterator<Item = AccountMeta>,
    ) -> TransactionResult {
        let args = BatchReconcileArgs {
            users: users.to_vec(),
            points: points.to_vec(),
        };
        let instruction = redemption_ledger::instruction::BatchReconcile { args };
        let accounts = redemption_ledger::accounts::BatchReconcile {
            config: Config::pda().0,
            operator: operator.pubkey(),
            mint: mint_pda().0,
            token_program: anchor_spl::token::ID,
        }
        .to_account_metas(None)
        .into_iter()
        .chain(token_accounts)
        .collect();

        self.send(&[instruction_of(accounts, instruction.data())], &[operator])
    }

    pub fn set_rate(&mut self, authority: &Keypair, rate: u64) -> TransactionResult {
        let instruction = redemption_ledger::instruction::SetRate { rate };

        self.send(
            &[instruction_of(update_config(authority), instruction.data())],
            &[authority],
        )
    }

    pub fn set_points_to_well_rate(&mut self, authority: &Keypair, rate: u64) -> TransactionResult {
        let instruction = redemption_ledger::instruction::SetPointsToWellRate { rate };

        self.send(
            &[instruction_of(update_config(authority), instruction.data())],
            &[authority],
        )
    }

    pub fn set_backend_signer(&mut self, authority: &Keypair, signer: EthAddress) -> TransactionResult {
        let instruction = redemption_ledger::instruction::SetBackendSigner { signer };

        self.send(
            &[instruction_of(update_config(authority), instruction.data())],
            &[authority],
        )
    }

    pub fn set_operator(&mut self, authority: &Keypair, operator: Pubkey) -> TransactionResult {
        let instruction = redemption_ledger::instruction::SetOperator { operator };

        self.send(
            &[instruction_of(update_config(authority), instruction.data())],
            &[authority],
        )
    }

    pub fn get_rate(&mut self) -> Rates {
        let instruction = redemption_ledger::instruction::GetRate {};

        self.view(read_config(), instruction.data())
    }

    pub fn points_to_well(&mut self, points: u64) -> u64 {
        let instruction = redemption_ledger::instruction::PointsToWell { points };

        self.view(read_config(), instruction.data())
    }

    pub fn can_user_redeem(&mut self, user: &Pubkey, amount: u64) -> bool {
        let instruction = redemption_ledger::instruction::CanUserRedeem { amount };
        let accounts = redemption_ledger::accounts::CanUserRedeem {
            config: Config::pda().0,
            user_token: token_account(user),
        }
        .to_account_metas(None);

        self.view(accounts, instruction.data())
    }

    pub fn is_nonce_used(&mut self, nonce: Bytes32) -> bool {
        let accounts = redemption_ledger::accounts::IsNonceUsed {
            nonce_marker: NonceMarker::pda(&nonce).0,
        }
        .to_account_metas(None);
        let instruction = redemption_ledger::instruction::IsNonceUsed { nonce };

        self.view(accounts, instruction.data())
    }

    fn view<T: AnchorDeserialize>(&mut self, accounts: Vec<AccountMeta>, data: Vec<u8>) -> T {
        let result = self.send(&[instruction_of(accounts, data)], &[]).unwrap();
        // trailing zero bytes of return data are trimmed
        let mut data = result.return_data.data;
        data.resize(data.len() + 32, 0);

        T::deserialize(&mut data.as_slice()).unwrap()
    }
}

fn instruction_of(accounts: Vec<AccountMeta>, data: Vec<u8>) -> Instruction {
    Instruction {
        program_id: redemption_ledger::ID,
        accounts,
        data,
    }
}

fn update_config(authority: &Keypair) -> Vec<AccountMeta> {
    redemption_ledger::accounts::UpdateConfig {
        config: Config::pda().0,
        authority: authority.pubkey(),
    }
    .to_account_metas(None)
}

fn read_config() -> Vec<AccountMeta> {
    redemption_ledger::accounts::ReadConfig {
        config: Config::pda().0,
    }
    .to_account_metas(None)
}
