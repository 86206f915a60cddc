//! Transport to the sponsoring relay and the cluster RPC.
//!
//! The relay is an opaque JSON-RPC service that owns a fee payer, co-signs
//! partially signed transactions and lands them. Reads go to a regular Solana
//! RPC node.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use tracing::{debug, instrument, warn};

use crate::config::OrchestratorConfig;
use crate::error::{GaslessError, Result};

const MAX_READ_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Simulation {
    /// Serialized transaction error, `None` when the simulation succeeded.
    pub err: Option<Value>,
    pub logs: Vec<String>,
    pub return_data: Option<Vec<u8>>,
}

#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Key that pays fees and rent for every sponsored transaction.
    async fn sponsor(&self) -> Result<Pubkey>;

    async fn latest_blockhash(&self) -> Result<Hash>;

    async fn account_exists(&self, address: &Pubkey) -> Result<bool>;

    /// Hands a partially signed, base64 encoded transaction to the relay.
    /// Returns as soon as the relay accepted it.
    async fn submit(&self, transaction: &str) -> Result<Signature>;

    /// Raw receipt for `signature`, `None` while the transaction is not final.
    async fn receipt(&self, signature: &Signature) -> Result<Option<Value>>;

    /// Intermediate status (`processed`, `confirmed`, ...) if the cluster has seen it.
    async fn status(&self, signature: &Signature) -> Result<Option<String>>;

    async fn simulate(&self, transaction: &str) -> Result<Simulation>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Contextual<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockhashValue {
    blockhash: String,
}

#[derive(Debug, Deserialize)]
struct AddressValue {
    address: String,
}

#[derive(Debug, Deserialize)]
struct SubmitValue {
    signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusValue {
    confirmation_status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulationValue {
    err: Option<Value>,
    #[serde(default)]
    logs: Option<Vec<String>>,
    return_data: Option<ReturnData>,
}

#[derive(Debug, Deserialize)]
struct ReturnData {
    data: (String, String),
}

pub struct HttpRelayClient {
    client: reqwest::Client,
    relay_url: String,
    rpc_url: String,
}

impl HttpRelayClient {
    pub fn new(config: &OrchestratorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self {
            client,
            relay_url: config.relay_url.clone(),
            rpc_url: config.rpc_url.clone(),
        })
    }

    async fn call<T: DeserializeOwned>(&self, url: &str, method: &str, params: Value) -> Result<T> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self.client.post(url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GaslessError::Relay(format!("{method} failed {status} {text}")));
        }

        decode_response(method, response.json::<RpcResponse>().await?)
    }

    // reads are idempotent, so transport failures are retried with backoff
    async fn read<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let mut attempt = 1;
        loop {
            match self.call(&self.rpc_url, method, params.clone()).await {
                Err(e) if e.is_retryable() && attempt < MAX_READ_ATTEMPTS => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                    warn!(method, attempt, error = %e, "rpc read failed, retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl RelayClient for HttpRelayClient {
    #[instrument(skip(self))]
    async fn sponsor(&self) -> Result<Pubkey> {
        let value: AddressValue = self.call(&self.relay_url, "getSponsor", json!([])).await?;

        parse_pubkey(&value.address).map_err(|e| GaslessError::Relay(format!("malformed sponsor: {e}")))
    }

    async fn latest_blockhash(&self) -> Result<Hash> {
        let value: Contextual<BlockhashValue> = self
            .read("getLatestBlockhash", json!([{ "commitment": "confirmed" }]))
            .await?;

        Hash::from_str(&value.value.blockhash)
            .map_err(|e| GaslessError::Relay(format!("malformed blockhash: {e}")))
    }

    #[instrument(skip(self))]
    async fn account_exists(&self, address: &Pubkey) -> Result<bool> {
        let value: Contextual<Option<Value>> = self
            .read(
                "getAccountInfo",
                json!([address.to_string(), { "encoding": "base64", "commitment": "confirmed" }]),
            )
            .await?;

        Ok(value.value.is_some())
    }

    #[instrument(skip_all)]
    async fn submit(&self, transaction: &str) -> Result<Signature> {
        let value: SubmitValue = self
            .call(
                &self.relay_url,
                "signAndSendTransaction",
                json!({ "transaction": transaction }),
            )
            .await?;
        debug!(signature = %value.signature, "relay accepted transaction");

        value.signature()
    }

    async fn receipt(&self, signature: &Signature) -> Result<Option<Value>> {
        self.read(
            "getTransaction",
            json!([
                signature.to_string(),
                {
                    "encoding": "json",
                    "commitment": "confirmed",
                    "maxSupportedTransactionVersion": 0,
                }
            ]),
        )
        .await
    }

    async fn status(&self, signature: &Signature) -> Result<Option<String>> {
        let value: Contextual<Vec<Option<StatusValue>>> = self
            .read(
                "getSignatureStatuses",
                json!([[signature.to_string()], { "searchTransactionHistory": true }]),
            )
            .await?;

        Ok(first_status(value))
    }

    #[instrument(skip_all)]
    async fn simulate(&self, transaction: &str) -> Result<Simulation> {
        let value: Contextual<SimulationValue> = self
            .read(
                "simulateTransaction",
                json!([
                    transaction,
                    {
                        "encoding": "base64",
                        "sigVerify": false,
                        "replaceRecentBlockhash": true,
                        "commitment": "confirmed",
                    }
                ]),
            )
            .await?;

        simulation(value.value)
    }
}

// a `null` result is only valid where the caller asked for an `Option`
fn decode_response<T: DeserializeOwned>(method: &str, response: RpcResponse) -> Result<T> {
    match response {
        RpcResponse {
            error: Some(error), ..
        } => Err(GaslessError::Rpc {
            code: error.code,
            message: error.message,
        }),
        RpcResponse { result, .. } => serde_json::from_value(result).map_err(|e| {
            GaslessError::Relay(format!("{method} returned an unexpected result: {e}"))
        }),
    }
}

impl SubmitValue {
    fn signature(&self) -> Result<Signature> {
        Signature::from_str(&self.signature)
            .map_err(|e| GaslessError::Relay(format!("malformed signature: {e}")))
    }
}

fn first_status(value: Contextual<Vec<Option<StatusValue>>>) -> Option<String> {
    value
        .value
        .into_iter()
        .next()
        .flatten()
        .map(|status| status.confirmation_status.unwrap_or_else(|| "submitted".into()))
}

fn simulation(value: SimulationValue) -> Result<Simulation> {
    let SimulationValue {
        err,
        logs,
        return_data,
    } = value;

    let return_data = return_data
        .map(|data| BASE64.decode(data.data.0))
        .transpose()
        .map_err(|e| GaslessError::Relay(format!("malformed return data: {e}")))?;

    Ok(Simulation {
        err,
        logs: logs.unwrap_or_default(),
        return_data,
    })
}

pub(crate) fn parse_pubkey(raw: &str) -> Result<Pubkey> {
    Pubkey::from_str(raw).map_err(|e| GaslessError::InvalidRequest(format!("`{raw}`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode<T: DeserializeOwned>(method: &str, body: Value) -> Result<T> {
        decode_response(method, serde_json::from_value(body).unwrap())
    }

    #[test]
    fn decode_sponsor_address() {
        let sponsor = Pubkey::new_unique();

        let value: AddressValue = decode(
            "getSponsor",
            json!({ "jsonrpc": "2.0", "id": 1, "result": { "address": sponsor.to_string() } }),
        )
        .unwrap();

        assert_eq!(parse_pubkey(&value.address).unwrap(), sponsor);
    }

    #[test]
    fn decode_rpc_error() {
        let result: Result<AddressValue> = decode(
            "getSponsor",
            json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32002, "message": "sponsor exhausted" } }),
        );

        assert!(matches!(result, Err(GaslessError::Rpc { code: -32002, ref message }) if message == "sponsor exhausted"));
    }

    #[test]
    fn decode_unexpected_result_shape() {
        let result: Result<SubmitValue> = decode(
            "signAndSendTransaction",
            json!({ "jsonrpc": "2.0", "id": 1, "result": "5VERv8NMvzbJMEkV8xnrLkEaWRtSz9CosKDYjCJjBRnb" }),
        );

        assert!(matches!(result, Err(GaslessError::Relay(_))));
    }

    #[test]
    fn decode_submitted_signature() {
        let signature = Signature::new_unique();

        let value: SubmitValue = decode(
            "signAndSendTransaction",
            json!({ "jsonrpc": "2.0", "id": 1, "result": { "signature": signature.to_string() } }),
        )
        .unwrap();
        assert_eq!(value.signature().unwrap(), signature);

        let value = SubmitValue {
            signature: "not-a-signature".into(),
        };
        assert!(matches!(value.signature(), Err(GaslessError::Relay(_))));
    }

    #[test]
    fn decode_signature_statuses() {
        let status = |result: Value| {
            first_status(decode("getSignatureStatuses", json!({ "jsonrpc": "2.0", "id": 1, "result": result })).unwrap())
        };

        assert_eq!(status(json!({ "context": { "slot": 7 }, "value": [null] })), None);
        assert_eq!(
            status(json!({ "context": { "slot": 7 }, "value": [{ "slot": 6, "confirmationStatus": "processed", "err": null }] })),
            Some("processed".to_string())
        );
        assert_eq!(
            status(json!({ "context": { "slot": 7 }, "value": [{ "slot": 6, "confirmationStatus": null }] })),
            Some("submitted".to_string())
        );
    }

    #[test]
    fn decode_simulation_return_data() {
        let value: Contextual<SimulationValue> = decode(
            "simulateTransaction",
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {
                    "context": { "slot": 9 },
                    "value": {
                        "err": null,
                        "logs": ["Program log: ok"],
                        "returnData": {
                            "programId": redemption_ledger::ID.to_string(),
                            "data": [BASE64.encode([1u8, 0, 0, 0]), "base64"],
                        },
                        "unitsConsumed": 1200,
                    }
                }
            }),
        )
        .unwrap();

        let decoded = simulation(value.value).unwrap();

        assert_eq!(decoded.err, None);
        assert_eq!(decoded.logs, vec!["Program log: ok".to_string()]);
        assert_eq!(decoded.return_data, Some(vec![1, 0, 0, 0]));
    }

    #[test]
    fn decode_failed_simulation_without_logs() {
        let value: Contextual<SimulationValue> = decode(
            "simulateTransaction",
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {
                    "context": { "slot": 9 },
                    "value": { "err": { "InstructionError": [1, { "Custom": 6005 }] }, "logs": null, "returnData": null }
                }
            }),
        )
        .unwrap();

        let decoded = simulation(value.value).unwrap();

        assert!(decoded.err.is_some());
        assert!(decoded.logs.is_empty());
        assert_eq!(decoded.return_data, None);
    }
}
