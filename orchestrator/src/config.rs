use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;

use crate::error::{GaslessError, Result};

pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8899";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub relay_url: String,
    pub rpc_url: String,
    pub ledger_program_id: Pubkey,
    pub mint: Pubkey,
    pub chain_id: u64,
    pub poll_interval: Duration,
    pub receipt_timeout: Duration,
    pub worker_timeout: Duration,
    pub http_timeout: Duration,
    pub authorization_ttl: Duration,
    /// Directory holding keypair files addressed by `signer_ref`.
    pub key_dir: PathBuf,
    /// Users per reconciliation operation, at most `MAX_BATCH`. Chunks that do
    /// not fit in one transaction are halved at run time.
    pub reconcile_chunk: usize,
    /// Binary launched per request. Defaults to the running executable.
    pub worker_bin: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            rpc_url: DEFAULT_RPC_URL.to_string(),
            ledger_program_id: redemption_ledger::ID,
            mint: redemption_ledger::state::mint_pda().0,
            chain_id: ledger_std::CHAIN_ID,
            poll_interval: Duration::from_millis(1500),
            receipt_timeout: Duration::from_secs(120),
            worker_timeout: Duration::from_secs(300),
            http_timeout: Duration::from_secs(30),
            authorization_ttl: Duration::from_secs(300),
            key_dir: PathBuf::from("keys"),
            reconcile_chunk: ledger_std::MAX_BATCH,
            worker_bin: None,
        }
    }
}

impl OrchestratorConfig {
    /// Reads `GASLESS_*` variables, loading a `.env` file first when one exists.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            relay_url: lookup("GASLESS_RELAY_URL").unwrap_or(defaults.relay_url),
            rpc_url: lookup("GASLESS_RPC_URL").unwrap_or(defaults.rpc_url),
            ledger_program_id: parse(&lookup, "GASLESS_LEDGER_PROGRAM_ID")?
                .unwrap_or(defaults.ledger_program_id),
            mint: parse(&lookup, "GASLESS_MINT")?.unwrap_or(defaults.mint),
            chain_id: parse(&lookup, "GASLESS_CHAIN_ID")?.unwrap_or(defaults.chain_id),
            poll_interval: parse(&lookup, "GASLESS_POLL_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            receipt_timeout: parse(&lookup, "GASLESS_RECEIPT_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.receipt_timeout),
            worker_timeout: parse(&lookup, "GASLESS_WORKER_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.worker_timeout),
            http_timeout: parse(&lookup, "GASLESS_HTTP_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            authorization_ttl: parse(&lookup, "GASLESS_AUTHORIZATION_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.authorization_ttl),
            key_dir: lookup("GASLESS_KEY_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.key_dir),
            reconcile_chunk: parse(&lookup, "GASLESS_RECONCILE_CHUNK")?
                .unwrap_or(defaults.reconcile_chunk),
            worker_bin: lookup("GASLESS_WORKER_BIN").map(PathBuf::from),
        };

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("poll interval", self.poll_interval),
            ("receipt timeout", self.receipt_timeout),
            ("worker timeout", self.worker_timeout),
            ("http timeout", self.http_timeout),
            ("authorization ttl", self.authorization_ttl),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, value)| value.is_zero()) {
            return Err(GaslessError::Config(format!("{name} must be positive")));
        }

        if self.reconcile_chunk == 0 || self.reconcile_chunk > ledger_std::MAX_BATCH {
            return Err(GaslessError::Config(format!(
                "reconcile chunk must be within 1..={}",
                ledger_std::MAX_BATCH
            )));
        }

        Ok(())
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| GaslessError::Config(format!("{key}: {e}")))
        })
        .transpose()
}
