use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use solana_sdk::signature::Signer;
use tracing::info;

use crate::account::AccountDeriver;
use crate::authorize::AuthorizationIssuer;
use crate::config::OrchestratorConfig;
use crate::keys::{load_keypair, SignerSource};
use crate::protocol::ProcessTransport;
use crate::reconcile::ReconciliationJob;
use crate::redeem::RedemptionService;
use crate::relay::{parse_pubkey, HttpRelayClient, RelayClient};
use crate::store::{FileStore, Store, UserRecord};
use crate::submit::unix_now;
use crate::worker::Worker;

#[derive(Debug, Parser)]
#[command(name = "gasless")]
#[command(about = "Sponsored execution and reconciliation for the redemption ledger", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve one request file and write its result next to it
    Worker {
        request: PathBuf,
    },

    /// Settle pending points of every user, re-polling unfinished operations first
    Reconcile {
        #[arg(long, env = "GASLESS_STATE")]
        state: PathBuf,

        /// Operator keypair file name inside the key directory
        #[arg(long, env = "GASLESS_OPERATOR_REF")]
        operator_ref: String,
    },

    /// Credit points a user earned, registering the user with `--wallet` on first sight
    Earn {
        #[arg(long, env = "GASLESS_STATE")]
        state: PathBuf,

        #[arg(long)]
        user_id: String,

        #[arg(long)]
        points: u64,

        /// Owner key of the user's account, base58
        #[arg(long)]
        wallet: Option<String>,
    },

    /// Pending users and points
    Status {
        #[arg(long, env = "GASLESS_STATE")]
        state: PathBuf,
    },

    /// Issue a signed points redemption authorization
    Authorize {
        #[arg(long)]
        user: String,

        #[arg(long)]
        points: u64,

        #[arg(long)]
        reward_id: String,

        /// Hex encoded secp256k1 key of the backend signer
        #[arg(long, env = "GASLESS_BACKEND_KEY", hide_env_values = true)]
        backend_key: String,
    },

    /// Derive an account address and read its deployment status
    Address {
        #[arg(long)]
        signer_ref: String,
    },

    /// Redeem a reward, with tokens (`--amount`) or with points (`--points`)
    Redeem {
        #[arg(long, env = "GASLESS_STATE")]
        state: PathBuf,

        #[arg(long)]
        user_id: String,

        #[arg(long)]
        signer_ref: String,

        #[arg(long)]
        reward_id: String,

        #[arg(long, conflicts_with = "points", required_unless_present = "points")]
        amount: Option<u64>,

        #[arg(long)]
        points: Option<u64>,

        #[arg(long, env = "GASLESS_BACKEND_KEY", hide_env_values = true)]
        backend_key: Option<String>,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = OrchestratorConfig::from_env().context("loading configuration")?;
    let relay: Arc<dyn RelayClient> =
        Arc::new(HttpRelayClient::new(&config).context("building relay client")?);

    match cli.command {
        Command::Worker { request } => {
            let result = Worker::new(relay, config)
                .run_request_file(&request)
                .await
                .with_context(|| format!("serving {}", request.display()))?;
            info!(success = result.success, "worker finished");
        }
        Command::Reconcile {
            state,
            operator_ref,
        } => {
            let store = FileStore::new(state);
            let transport = ProcessTransport::new(&config)?;
            let job = ReconciliationJob::new(&store, &transport, &*relay, &config, &operator_ref)?;

            let resumed = job.resume_pending().await.context("re-polling operations")?;
            let settled = job.run().await.context("reconciling")?;
            print(&json!({ "resumed": resumed, "run": settled }))?;
        }
        Command::Earn {
            state,
            user_id,
            points,
            wallet,
        } => {
            print(&earn(&FileStore::new(state), &user_id, points, wallet.as_deref())?)?;
        }
        Command::Status { state } => {
            print(&FileStore::new(state).load()?.status())?;
        }
        Command::Authorize {
            user,
            points,
            reward_id,
            backend_key,
        } => {
            let issuer = AuthorizationIssuer::from_hex(
                &backend_key,
                config.ledger_program_id,
                config.authorization_ttl,
            )?;
            print(&issuer.issue(parse_pubkey(&user)?, points, &reward_id, unix_now())?)?;
        }
        Command::Address { signer_ref } => {
            let owner =
                load_keypair(&SignerSource::Reference(&signer_ref), &config.key_dir)?.pubkey();
            let account = AccountDeriver::new(config.mint)
                .derive(&*relay, &owner)
                .await?;
            print(&json!({
                "owner": account.owner.to_string(),
                "address": account.address.to_string(),
                "status": account.status,
            }))?;
        }
        Command::Redeem {
            state,
            user_id,
            signer_ref,
            reward_id,
            amount,
            points,
            backend_key,
        } => {
            let store = FileStore::new(state);
            let transport = ProcessTransport::new(&config)?;
            let service = RedemptionService::new(&store, &transport, &*relay, &config);

            let record = match (amount, points) {
                (Some(amount), _) => {
                    service
                        .redeem_direct(&user_id, &signer_ref, &reward_id, amount)
                        .await?
                }
                (None, Some(points)) => {
                    let Some(backend_key) = backend_key else {
                        bail!("--backend-key is required to redeem points");
                    };
                    let issuer = AuthorizationIssuer::from_hex(
                        &backend_key,
                        config.ledger_program_id,
                        config.authorization_ttl,
                    )?;
                    service
                        .redeem_signed(&user_id, &signer_ref, &issuer, &reward_id, points)
                        .await?
                }
                (None, None) => bail!("one of --amount or --points is required"),
            };
            print(&record)?;
        }
    }

    Ok(())
}

fn earn(store: &impl Store, user_id: &str, points: u64, wallet: Option<&str>) -> anyhow::Result<UserRecord> {
    if let Some(wallet) = wallet {
        parse_pubkey(wallet).context("--wallet")?;
    }
    let user = store.update(|state| state.earn(user_id, points, wallet))?;
    info!(user_id, points, total = user.total_points, "points earned");

    Ok(user)
}

fn print(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);

    Ok(())
}
