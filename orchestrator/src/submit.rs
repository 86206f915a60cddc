use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::Message;
use solana_sdk::packet::PACKET_DATA_SIZE;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use tracing::{debug, info, instrument};

use crate::account::{AbstractedAccount, AccountDeriver};
use crate::batch::{BatchContext, CallIntent, IntentBatcher};
use crate::config::OrchestratorConfig;
use crate::error::{GaslessError, Result};
use crate::relay::RelayClient;

/// An operation the relay accepted. Nothing is known yet about its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub handle: Signature,
    pub account: AbstractedAccount,
    pub fee_payer: Pubkey,
    pub instructions: usize,
    pub submitted_at: i64,
}

pub struct ExecutionSubmitter<'a, R: RelayClient + ?Sized> {
    relay: &'a R,
    deriver: AccountDeriver,
    batcher: IntentBatcher,
}

impl<'a, R: RelayClient + ?Sized> ExecutionSubmitter<'a, R> {
    pub fn new(relay: &'a R, config: &OrchestratorConfig) -> Self {
        let deriver = AccountDeriver::new(config.mint);

        Self {
            relay,
            deriver,
            batcher: IntentBatcher::new(config.ledger_program_id, deriver),
        }
    }

    pub fn deriver(&self) -> &AccountDeriver {
        &self.deriver
    }

    /// Encodes `intents` into one sponsored transaction, signs it as `signer`
    /// and hands it to the relay. Returns once the relay accepted it.
    #[instrument(skip_all, fields(signer = %signer.pubkey(), calls = intents.len()))]
    pub async fn submit(&self, signer: &Keypair, intents: &[CallIntent]) -> Result<Submission> {
        let owner = signer.pubkey();
        let account = self.deriver.derive(self.relay, &owner).await?;
        let fee_payer = self.relay.sponsor().await?;
        let context = BatchContext { owner, fee_payer };

        let mut instructions = self.batcher.encode(&context, intents)?;
        let touches_account = instructions
            .iter()
            .flat_map(|instruction| &instruction.accounts)
            .any(|meta| meta.pubkey == account.address);
        if !account.is_deployed() && touches_account {
            debug!(account = %account.address, "account not deployed, creating it first");
            let ensure = self
                .batcher
                .encode(&context, &[CallIntent::EnsureAccount { owner }])?;
            instructions.splice(0..0, ensure);
        }

        let blockhash = self.relay.latest_blockhash().await?;
        let transaction = sponsored_transaction(&instructions, &fee_payer, blockhash, signer)?;
        let encoded = encode_transaction(&transaction)?;

        let handle = self.relay.submit(&encoded).await?;
        info!(handle = %handle, account = %account.address, "operation submitted");

        Ok(Submission {
            handle,
            account,
            fee_payer,
            instructions: instructions.len(),
            submitted_at: unix_now(),
        })
    }
}

/// Transaction paid by `fee_payer`, partially signed by `signer` when the
/// instructions require its signature. The relay adds the fee payer's.
pub fn sponsored_transaction(
    instructions: &[Instruction],
    fee_payer: &Pubkey,
    blockhash: Hash,
    signer: &Keypair,
) -> Result<Transaction> {
    let message = Message::new_with_blockhash(instructions, Some(fee_payer), &blockhash);
    let mut transaction = Transaction::new_unsigned(message);

    let signer_key = signer.pubkey();
    if transaction.message.signer_keys().contains(&&signer_key) {
        transaction
            .try_partial_sign(&[signer], blockhash)
            .map_err(|e| GaslessError::Signer(e.to_string()))?;
    }

    Ok(transaction)
}

/// Wire size of the transaction built from `instructions` with every signature attached.
pub fn transaction_size(instructions: &[Instruction], fee_payer: &Pubkey) -> Result<usize> {
    let transaction = Transaction::new_unsigned(Message::new(instructions, Some(fee_payer)));

    bincode::serialized_size(&transaction)
        .map(|size| size as usize)
        .map_err(|e| GaslessError::InvalidRequest(format!("transaction encoding: {e}")))
}

pub fn encode_transaction(transaction: &Transaction) -> Result<String> {
    let bytes = bincode::serialize(transaction)
        .map_err(|e| GaslessError::InvalidRequest(format!("transaction encoding: {e}")))?;
    if bytes.len() > PACKET_DATA_SIZE {
        return Err(GaslessError::InvalidRequest(format!(
            "transaction is {} bytes, the limit is {PACKET_DATA_SIZE}",
            bytes.len()
        )));
    }

    Ok(BASE64.encode(bytes))
}

pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}
