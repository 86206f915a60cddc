//! Turns semantic call intents into the ordered instruction list of one transaction.
//!
//! Call data arrives as text. Recognized shorthands:
//!
//! * `approve_<spender>_<amount>`: SPL `approve` from the signer's token account
//! * `redeem_<rewardId>_<amount>`: ledger `redeem_direct`
//! * `redeemsigned_<base64 args>`: ledger `redeem_with_points`, rent paid by the sponsor
//! * `ensure_<owner>`: idempotent creation of `owner`'s token account, paid by the sponsor
//!
//! The amount is always the last `_`-separated segment, so reward ids may contain `_`.
//! Anything else must be a base64 borsh [`RawCall`] and is passed through unchanged.

use std::str::FromStr;

use anchor_lang::prelude::borsh;
use anchor_lang::{AnchorDeserialize, AnchorSerialize, InstructionData, ToAccountMetas};
use anchor_spl::associated_token::spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use anchor_spl::token::spl_token;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ledger_std::SerializableAccountMeta;
use redemption_ledger::instructions::{RedeemDirectArgs, RedeemWithPointsArgs};
use redemption_ledger::state::{Config, NonceMarker};
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;

use crate::account::AccountDeriver;
use crate::error::{GaslessError, Result};

const APPROVE: &str = "approve_";
const REDEEM: &str = "redeem_";
const REDEEM_SIGNED: &str = "redeemsigned_";
const ENSURE: &str = "ensure_";

/// Already-encoded instruction shipped as call data.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct RawCall {
    pub program_id: Pubkey,
    pub accounts: Vec<SerializableAccountMeta>,
    pub data: Vec<u8>,
}

impl RawCall {
    pub fn encode(&self) -> Result<String> {
        let bytes = borsh_bytes(self)?;

        Ok(BASE64.encode(bytes))
    }

    pub fn decode(raw: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(raw.trim())
            .map_err(|e| invalid_call(raw, format!("not a shorthand and not base64: {e}")))?;

        Self::try_from_slice(&bytes).map_err(|e| invalid_call(raw, e))
    }
}

impl From<Instruction> for RawCall {
    fn from(instruction: Instruction) -> Self {
        Self {
            program_id: instruction.program_id,
            accounts: instruction.accounts.into_iter().map(Into::into).collect(),
            data: instruction.data,
        }
    }
}

impl From<RawCall> for Instruction {
    fn from(call: RawCall) -> Self {
        Instruction {
            program_id: call.program_id,
            accounts: call.accounts.into_iter().map(Into::into).collect(),
            data: call.data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallIntent {
    Approve { spender: Pubkey, amount: u64 },
    Redeem { reward_id: String, amount: u64 },
    RedeemSigned(Box<RedeemWithPointsArgs>),
    EnsureAccount { owner: Pubkey },
    Raw(RawCall),
}

impl CallIntent {
    pub fn parse(data: &str) -> Result<Self> {
        if let Some(rest) = data.strip_prefix(APPROVE) {
            let (spender, amount) = split_amount(data, rest)?;
            let spender = Pubkey::from_str(spender).map_err(|e| invalid_call(data, e))?;

            return Ok(Self::Approve { spender, amount });
        }

        if let Some(rest) = data.strip_prefix(REDEEM) {
            let (reward_id, amount) = split_amount(data, rest)?;
            if reward_id.is_empty() {
                return Err(invalid_call(data, "empty reward id"));
            }

            return Ok(Self::Redeem {
                reward_id: reward_id.to_string(),
                amount,
            });
        }

        if let Some(rest) = data.strip_prefix(REDEEM_SIGNED) {
            let bytes = BASE64.decode(rest).map_err(|e| invalid_call(data, e))?;
            let args =
                RedeemWithPointsArgs::try_from_slice(&bytes).map_err(|e| invalid_call(data, e))?;

            return Ok(Self::RedeemSigned(Box::new(args)));
        }

        if let Some(rest) = data.strip_prefix(ENSURE) {
            let owner = Pubkey::from_str(rest).map_err(|e| invalid_call(data, e))?;

            return Ok(Self::EnsureAccount { owner });
        }

        RawCall::decode(data).map(Self::Raw)
    }

    /// Text form accepted by [`CallIntent::parse`].
    pub fn to_call_data(&self) -> Result<String> {
        Ok(match self {
            Self::Approve { spender, amount } => format!("{APPROVE}{spender}_{amount}"),
            Self::Redeem { reward_id, amount } => format!("{REDEEM}{reward_id}_{amount}"),
            Self::RedeemSigned(args) => {
                format!("{REDEEM_SIGNED}{}", BASE64.encode(borsh_bytes(args.as_ref())?))
            }
            Self::EnsureAccount { owner } => format!("{ENSURE}{owner}"),
            Self::Raw(call) => call.encode()?,
        })
    }
}

/// Who a batch is encoded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchContext {
    /// Signer of the intent, owner of the token account calls act on.
    pub owner: Pubkey,
    /// Pays fees and rent.
    pub fee_payer: Pubkey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentBatcher {
    program_id: Pubkey,
    deriver: AccountDeriver,
}

impl IntentBatcher {
    pub fn new(program_id: Pubkey, deriver: AccountDeriver) -> Self {
        Self {
            program_id,
            deriver,
        }
    }

    /// Encodes `intents` in order. The resulting instructions execute atomically.
    pub fn encode(&self, context: &BatchContext, intents: &[CallIntent]) -> Result<Vec<Instruction>> {
        if intents.is_empty() {
            return Err(GaslessError::InvalidRequest("call list is empty".into()));
        }

        intents
            .iter()
            .map(|intent| self.encode_one(context, intent))
            .collect()
    }

    fn encode_one(&self, context: &BatchContext, intent: &CallIntent) -> Result<Instruction> {
        let owner_token = self.deriver.address(&context.owner);

        match intent {
            CallIntent::Approve { spender, amount } => spl_token::instruction::approve(
                &spl_token::ID,
                &owner_token,
                spender,
                &context.owner,
                &[],
                *amount,
            )
            .map_err(|e| GaslessError::InvalidRequest(format!("approve: {e}"))),
            CallIntent::Redeem { reward_id, amount } => Ok(Instruction {
                program_id: self.program_id,
                accounts: redemption_ledger::accounts::RedeemDirect {
                    config: Config::pda().0,
                    mint: self.deriver.mint(),
                    user: context.owner,
                    user_token: owner_token,
                    token_program: spl_token::ID,
                }
                .to_account_metas(None),
                data: redemption_ledger::instruction::RedeemDirect {
                    args: RedeemDirectArgs {
                        reward_id: reward_id.clone(),
                        amount: *amount,
                    },
                }
                .data(),
            }),
            CallIntent::RedeemSigned(args) => Ok(Instruction {
                program_id: self.program_id,
                accounts: redemption_ledger::accounts::RedeemWithPoints {
                    payer: context.fee_payer,
                    config: Config::pda().0,
                    mint: self.deriver.mint(),
                    user_token: self.deriver.address(&args.user),
                    nonce_marker: NonceMarker::pda(&args.nonce).0,
                    token_program: spl_token::ID,
                    system_program: solana_sdk::system_program::ID,
                }
                .to_account_metas(None),
                data: redemption_ledger::instruction::RedeemWithPoints {
                    args: args.as_ref().clone(),
                }
                .data(),
            }),
            CallIntent::EnsureAccount { owner } => Ok(create_associated_token_account_idempotent(
                &context.fee_payer,
                owner,
                &self.deriver.mint(),
                &spl_token::ID,
            )),
            CallIntent::Raw(call) => Ok(call.clone().into()),
        }
    }
}

fn split_amount<'a>(data: &str, rest: &'a str) -> Result<(&'a str, u64)> {
    let (head, amount) = rest
        .rsplit_once('_')
        .ok_or_else(|| invalid_call(data, "missing amount segment"))?;
    let amount = amount
        .parse::<u64>()
        .map_err(|e| invalid_call(data, format!("amount: {e}")))?;

    Ok((head, amount))
}

fn borsh_bytes<T: AnchorSerialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    value.serialize(&mut bytes)?;

    Ok(bytes)
}

fn invalid_call(data: &str, reason: impl ToString) -> GaslessError {
    GaslessError::InvalidCall {
        data: data.to_string(),
        reason: reason.to_string(),
    }
}
