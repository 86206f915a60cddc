use clap::Parser;
use gasless::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    gasless::logging::init_tracing("info");

    cli::run(Cli::parse()).await
}
