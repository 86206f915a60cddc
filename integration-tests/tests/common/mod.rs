use std::ops::Deref;

use alloy_primitives::B256;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use anchor_lang::Event;
use anchor_spl::associated_token::get_associated_token_address;
use anchor_spl::associated_token::spl_associated_token_account::instruction::create_associated_token_account;
use anchor_spl::token::{self, spl_token};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use derive_more::{Deref, DerefMut};
use ledger_std::authorization::SIGNATURE_LEN;
use ledger_std::EthAddress;
use litesvm::types::{FailedTransactionMetadata, TransactionMetadata};
use litesvm::LiteSVM;
use rand::random;
use redemption_ledger::instructions::RedeemWithPointsArgs;
use redemption_ledger::state::{mint_pda, Config};
use solana_sdk::account::Account;
#[allow(deprecated)]
use solana_sdk::bpf_loader_upgradeable::{self, get_program_data_address, UpgradeableLoaderState};
use solana_sdk::clock::Clock;
use solana_sdk::instruction::{Instruction, InstructionError};
use solana_sdk::message::Message;
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::rent::Rent;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::{Transaction, TransactionError};

mod ledger_context;

pub const POINTS_TO_WELL_RATE: u64 = 100;
pub const RATE: u64 = 100;

const LEDGER_BIN: &[u8] = include_bytes!("../../../target/deploy/redemption_ledger.so");

pub type TransactionResult = Result<TransactionMetadata, Box<FailedTransactionMetadata>>;

#[derive(Deref, DerefMut)]
pub struct Context {
    #[deref]
    #[deref_mut]
    svm: LiteSVM,
    pub authority: Keypair,
    pub operator: Keypair,
    pub payer: Keypair,
    pub backend: PrivateKeySigner,
}

impl Default for Context {
    fn default() -> Self {
        let mut svm = LiteSVM::new();
        let authority = Keypair::new();

        deploy_upgradeable(&mut svm, &redemption_ledger::ID, &authority.pubkey(), LEDGER_BIN);

        let operator = Keypair::new();
        let payer = Keypair::new();

        svm.airdrop(&authority.pubkey(), sol_amount(10.0)).unwrap();
        svm.airdrop(&operator.pubkey(), sol_amount(10.0)).unwrap();
        svm.airdrop(&payer.pubkey(), sol_amount(10.0)).unwrap();

        Self {
            svm,
            authority,
            operator,
            payer,
            backend: PrivateKeySigner::random(),
        }
    }
}

impl Context {
    /// Fresh ledger with the default rates.
    pub fn initialized() -> Self {
        let mut ctx = Self::default();
        ctx.ledger()
            .initialize(POINTS_TO_WELL_RATE, RATE)
            .unwrap();

        ctx
    }

    pub fn now(&self) -> i64 {
        self.svm.get_sysvar::<Clock>().unix_timestamp
    }

    pub fn warp_to_timestamp(&mut self, unix_timestamp: i64) {
        let mut clock = self.get_sysvar::<Clock>();
        clock.unix_timestamp = unix_timestamp;

        self.set_sysvar(&clock);
    }

    pub fn backend_address(&self) -> EthAddress {
        self.backend.address().0 .0.into()
    }

    pub fn config(&self) -> Config {
        self.account(&Config::pda().0).unwrap()
    }

    pub fn account<T: anchor_lang::AccountDeserialize>(&self, pubkey: &Pubkey) -> Option<T> {
        self.svm
            .get_account(pubkey)
            .and_then(|account| T::try_deserialize(&mut account.data.as_slice()).ok())
    }

    /// A funded user with an empty token account.
    pub fn new_user(&mut self) -> Keypair {
        let user = Keypair::new();
        self.airdrop(&user.pubkey(), sol_amount(1.0)).unwrap();
        self.create_token_account(&user.pubkey());

        user
    }

    pub fn create_token_account(&mut self, owner: &Pubkey) {
        let instruction = create_associated_token_account(
            &self.payer.pubkey(),
            owner,
            &mint_pda().0,
            &token::ID,
        );

        self.send(&[instruction], &[]).unwrap();
    }

    /// Lets the ledger burn up to `amount` of `user`'s tokens.
    pub fn approve(&mut self, user: &Keypair, amount: u64) {
        let instruction = spl_token::instruction::approve(
            &token::ID,
            &token_account(&user.pubkey()),
            &Config::pda().0,
            &user.pubkey(),
            &[],
            amount,
        )
        .unwrap();

        self.send(&[instruction], &[user]).unwrap();
    }

    pub fn token_balance(&self, owner: &Pubkey) -> u64 {
        self.get_account(&token_account(owner))
            .and_then(|account| spl_token::state::Account::unpack(&account.data).ok())
            .map(|account| account.amount)
            .unwrap_or_default()
    }

    pub fn supply(&self) -> u64 {
        self.get_account(&mint_pda().0)
            .and_then(|account| spl_token::state::Mint::unpack(&account.data).ok())
            .map(|mint| mint.supply)
            .unwrap_or_default()
    }

    /// Backend-signed authorization for `user` to redeem `points`.
    pub fn authorization(&self, user: &Pubkey, points: u64, reward_id: &str) -> RedeemWithPointsArgs {
        let mut args = RedeemWithPointsArgs {
            user: *user,
            points,
            reward_id: reward_id.to_string(),
            nonce: random::<[u8; 32]>().into(),
            deadline: self.now() + 600,
            signature: [0u8; SIGNATURE_LEN],
        };
        self.sign(&mut args);

        args
    }

    pub fn sign(&self, args: &mut RedeemWithPointsArgs) {
        let digest = args.authorization().digest(&redemption_ledger::ID);

        args.signature = self
            .backend
            .sign_hash_sync(&B256::from(digest))
            .unwrap()
            .as_bytes();
    }

    /// Sends `instructions` paid by the context payer.
    pub fn send(&mut self, instructions: &[Instruction], signers: &[&Keypair]) -> TransactionResult {
        let payer = self.payer.insecure_clone();
        let signers: Vec<_> = std::iter::once(&payer).chain(signers.iter().copied()).collect();
        let transaction = Transaction::new(
            &signers[..],
            Message::new(instructions, Some(&payer.pubkey())),
            self.svm.latest_blockhash(),
        );

        self.send_transaction(transaction)
    }

    fn send_transaction(&mut self, transaction: Transaction) -> TransactionResult {
        let result = self.svm.send_transaction(transaction);
        self.expire_blockhash();
        let slot = self.svm.get_sysvar::<Clock>().slot;
        self.svm.warp_to_slot(slot + 1);

        result.map_err(Box::new)
    }
}

/// Loads `elf` behind the upgradeable loader, the way `solana program deploy` leaves it.
fn deploy_upgradeable(svm: &mut LiteSVM, program_id: &Pubkey, upgrade_authority: &Pubkey, elf: &[u8]) {
    let rent = svm.get_sysvar::<Rent>();
    let program_data = get_program_data_address(program_id);

    let mut data = bincode::serialize(&UpgradeableLoaderState::ProgramData {
        slot: 0,
        upgrade_authority_address: Some(*upgrade_authority),
    })
    .unwrap();
    data.resize(UpgradeableLoaderState::size_of_programdata_metadata(), 0);
    data.extend_from_slice(elf);
    svm.set_account(
        program_data,
        Account {
            lamports: rent.minimum_balance(data.len()),
            data,
            owner: bpf_loader_upgradeable::ID,
            executable: false,
            rent_epoch: 0,
        },
    )
    .unwrap();

    let data = bincode::serialize(&UpgradeableLoaderState::Program {
        programdata_address: program_data,
    })
    .unwrap();
    svm.set_account(
        *program_id,
        Account {
            lamports: rent.minimum_balance(data.len()),
            data,
            owner: bpf_loader_upgradeable::ID,
            executable: true,
            rent_epoch: 0,
        },
    )
    .unwrap();
}

pub fn token_account(owner: &Pubkey) -> Pubkey {
    get_associated_token_address(owner, &mint_pda().0)
}

pub fn sol_amount(amount: f64) -> u64 {
    (amount * 1_000_000_000.0) as u64
}

pub fn contains_event<E>(expected: E) -> impl Fn(TransactionMetadata) -> bool
where
    E: Event,
{
    let expected = STANDARD.encode(expected.data());

    move |actual: TransactionMetadata| {
        actual
            .logs
            .iter()
            .any(|log| log.contains(format!("Program data: {}", expected).as_str()))
    }
}

pub fn is_error<T, Err>(expected: Err) -> impl Fn(T) -> bool
where
    T: Deref<Target = FailedTransactionMetadata>,
    Err: Into<u32>,
{
    let expected = expected.into();

    move |actual: T| match actual.err {
        TransactionError::InstructionError(_, InstructionError::Custom(error_code)) => {
            error_code == expected
        }
        _ => false,
    }
}
