//! User-initiated voucher redemptions.

use anchor_lang::{AnchorDeserialize, InstructionData, ToAccountMetas};
use ledger_std::conversion::points_to_tokens;
use redemption_ledger::instructions::Rates;
use redemption_ledger::state::Config;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::Transaction;
use tracing::{debug, info, instrument, warn};

use crate::account::AccountDeriver;
use crate::authorize::AuthorizationIssuer;
use crate::batch::{BatchContext, CallIntent, IntentBatcher};
use crate::config::OrchestratorConfig;
use crate::error::{GaslessError, Result};
use crate::observe::{decode_events, LedgerEvent};
use crate::protocol::{Transport, WorkerRequest};
use crate::relay::{parse_pubkey, RelayClient};
use crate::store::{AmountUnit, RedemptionPath, RedemptionRecord, Store};
use crate::submit::{encode_transaction, unix_now};

const CODE_PREFIX: &str = "RWD";
const CODE_REWARD_LEN: usize = 12;
const RETURN_DATA_PAD: usize = 32;

pub struct RedemptionService<'a, S: Store, T: Transport + ?Sized> {
    store: &'a S,
    transport: &'a T,
    relay: &'a dyn RelayClient,
    config: &'a OrchestratorConfig,
    deriver: AccountDeriver,
}

impl<'a, S: Store, T: Transport + ?Sized> RedemptionService<'a, S, T> {
    pub fn new(
        store: &'a S,
        transport: &'a T,
        relay: &'a dyn RelayClient,
        config: &'a OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            transport,
            relay,
            config,
            deriver: AccountDeriver::new(config.mint),
        }
    }

    pub async fn rates(&self) -> Result<Rates> {
        let instruction = Instruction {
            program_id: self.config.ledger_program_id,
            accounts: redemption_ledger::accounts::ReadConfig {
                config: Config::pda().0,
            }
            .to_account_metas(None),
            data: redemption_ledger::instruction::GetRate {}.data(),
        };

        let bytes = self
            .view(&[instruction])
            .await?
            .ok_or_else(|| GaslessError::Reverted("get_rate failed in simulation".into()))?;

        decode_return(bytes, "get_rate")
    }

    /// Whether `owner` could redeem `amount` right now, with the approval the
    /// redemption itself grants. Answered by simulation, nothing is submitted.
    #[instrument(skip(self))]
    pub async fn can_redeem(&self, owner: &Pubkey, amount: u64) -> Result<bool> {
        let context = BatchContext {
            owner: *owner,
            fee_payer: *owner,
        };
        let mut instructions = IntentBatcher::new(self.config.ledger_program_id, self.deriver)
            .encode(&context, &[self.approve(amount)])?;
        instructions.push(Instruction {
            program_id: self.config.ledger_program_id,
            accounts: redemption_ledger::accounts::CanUserRedeem {
                config: Config::pda().0,
                user_token: self.deriver.address(owner),
            }
            .to_account_metas(None),
            data: redemption_ledger::instruction::CanUserRedeem { amount }.data(),
        });

        match self.view(&instructions).await? {
            Some(bytes) => decode_return(bytes, "can_user_redeem"),
            None => Ok(false),
        }
    }

    /// Burns `amount` tokens of `user_id` for `reward_id`.
    #[instrument(skip(self))]
    pub async fn redeem_direct(
        &self,
        user_id: &str,
        signer_ref: &str,
        reward_id: &str,
        amount: u64,
    ) -> Result<RedemptionRecord> {
        if reward_id.is_empty() || amount == 0 {
            return Err(GaslessError::InvalidRequest(
                "reward id and amount are required".into(),
            ));
        }
        let owner = self.owner(user_id)?;
        self.preflight(&owner, amount).await?;

        let intents = [
            self.approve(amount),
            CallIntent::Redeem {
                reward_id: reward_id.to_string(),
                amount,
            },
        ];
        let fallback = Fallback {
            reward_id,
            amount,
            unit: AmountUnit::Tokens,
            path: RedemptionPath::Direct,
        };

        self.execute(user_id, signer_ref, &owner, &intents, fallback)
            .await
    }

    /// Spends `points` of `user_id` through a backend authorization. The
    /// equivalent tokens must already be in the user's account.
    #[instrument(skip(self, issuer))]
    pub async fn redeem_signed(
        &self,
        user_id: &str,
        signer_ref: &str,
        issuer: &AuthorizationIssuer,
        reward_id: &str,
        points: u64,
    ) -> Result<RedemptionRecord> {
        let owner = self.owner(user_id)?;
        let rates = self.rates().await?;
        let amount = points_to_tokens(points, rates.points_to_well_rate)
            .ok_or_else(|| GaslessError::InvalidRequest(format!("{points} points overflow")))?;
        if amount == 0 {
            return Err(GaslessError::InvalidRequest(format!(
                "{points} points convert to zero tokens"
            )));
        }
        self.preflight(&owner, amount).await?;

        let authorization = issuer.issue(owner, points, reward_id, unix_now())?;
        let intents = [
            self.approve(amount),
            CallIntent::RedeemSigned(Box::new(authorization.into_args()?)),
        ];
        let fallback = Fallback {
            reward_id,
            amount: points,
            unit: AmountUnit::Points,
            path: RedemptionPath::Signed,
        };

        self.execute(user_id, signer_ref, &owner, &intents, fallback)
            .await
    }

    fn owner(&self, user_id: &str) -> Result<Pubkey> {
        let state = self.store.load()?;
        let user = state
            .users
            .get(user_id)
            .ok_or_else(|| GaslessError::InvalidRequest(format!("unknown user {user_id}")))?;

        parse_pubkey(&user.wallet)
    }

    fn approve(&self, amount: u64) -> CallIntent {
        CallIntent::Approve {
            spender: Config::pda().0,
            amount,
        }
    }

    async fn preflight(&self, owner: &Pubkey, amount: u64) -> Result<()> {
        if self.can_redeem(owner, amount).await? {
            return Ok(());
        }

        info!(owner = %owner, amount, "redemption rejected by pre-flight check");
        Err(GaslessError::Ledger {
            code: "InsufficientBalance".into(),
        })
    }

    async fn execute(
        &self,
        user_id: &str,
        signer_ref: &str,
        owner: &Pubkey,
        intents: &[CallIntent],
        fallback: Fallback<'_>,
    ) -> Result<RedemptionRecord> {
        let smart_account = self.deriver.address(owner).to_string();
        let mut request = WorkerRequest::new(signer_ref, self.config.chain_id, intents)?;
        request.smart_account_address = Some(smart_account.clone());

        let result = self.transport.execute(&request).await?;
        if let Some(e) = result.failure() {
            warn!(user_id, error = %e, "redemption failed");
            return Err(e);
        }

        let transaction = result.transaction_hash.clone().unwrap_or_default();
        let event = result.receipt.as_ref().and_then(|receipt| {
            decode_events(&receipt.logs)
                .into_iter()
                .find(|event| fallback.matches(event))
        });
        if event.is_none() {
            warn!(user_id, transaction = %transaction, "no redemption event in receipt, recording request values");
        }

        let record = self.store.update(|state| {
            if let Some(user) = state.users.get_mut(user_id) {
                user.smart_account_address.get_or_insert(smart_account);
            }
            let code = state.fresh_code(fallback.reward_id);
            let record = match &event {
                Some(event) => event.to_record(code, Some(user_id.to_string()), &transaction, unix_now()),
                None => fallback.to_record(code, user_id, owner, &transaction),
            };
            state.insert_redemption(record.clone())?;

            Ok(record)
        })?;
        info!(code = %record.code, transaction = %transaction, "redemption recorded");

        Ok(record)
    }

    /// Return data of the last instruction, `None` when the simulation failed.
    async fn view(&self, instructions: &[Instruction]) -> Result<Option<Vec<u8>>> {
        let fee_payer = self.relay.sponsor().await?;
        let message = Message::new_with_blockhash(instructions, Some(&fee_payer), &Hash::default());
        let encoded = encode_transaction(&Transaction::new_unsigned(message))?;

        let simulation = self.relay.simulate(&encoded).await?;
        if let Some(err) = simulation.err {
            debug!(%err, logs = ?simulation.logs, "view simulation failed");
            return Ok(None);
        }

        Ok(simulation.return_data)
    }
}

// the runtime trims trailing zero bytes off return data
fn decode_return<T: AnchorDeserialize>(mut bytes: Vec<u8>, view: &str) -> Result<T> {
    bytes.resize(bytes.len() + RETURN_DATA_PAD, 0);

    T::deserialize(&mut bytes.as_slice())
        .map_err(|e| GaslessError::Relay(format!("malformed {view} result: {e}")))
}

struct Fallback<'a> {
    reward_id: &'a str,
    amount: u64,
    unit: AmountUnit,
    path: RedemptionPath,
}

impl Fallback<'_> {
    fn matches(&self, event: &LedgerEvent) -> bool {
        matches!(
            (self.path, event),
            (RedemptionPath::Direct, LedgerEvent::Redeemed(_))
                | (RedemptionPath::Signed, LedgerEvent::PointsRedeemed(_))
        )
    }

    fn to_record(&self, code: String, user_id: &str, owner: &Pubkey, transaction: &str) -> RedemptionRecord {
        RedemptionRecord {
            code,
            user_id: Some(user_id.to_string()),
            user: owner.to_string(),
            reward_id: self.reward_id.to_string(),
            amount: self.amount,
            unit: self.unit,
            path: self.path,
            transaction: transaction.to_string(),
            timestamp: unix_now(),
        }
    }
}

/// `RWD-<REWARD>-<8 HEX>`, the reward reduced to its uppercase alphanumerics.
pub fn redemption_code(reward_id: &str) -> String {
    let reward = reward_id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .take(CODE_REWARD_LEN)
        .collect::<String>();

    format!("{CODE_PREFIX}-{reward}-{:08X}", rand::random::<u32>())
}
