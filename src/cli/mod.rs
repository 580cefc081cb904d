use crate::errors::AppResult;
use clap::{Parser, Subcommand};

pub mod commands;

/// Covenant token transition builder
#[derive(Parser)]
#[command(name = "covenant-token")]
#[command(about = "Build, authorize and verify NFT covenant token transitions")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Create a new NFT lineage from an origin output
    Genesis(commands::transition::GenesisCommand),
    /// Issue the next token id to a receiver
    Issue(commands::transition::IssueCommand),
    /// Transfer a token to a new owner
    Transfer(commands::transition::TransferCommand),
    /// Offer a token in exchange for fungible tokens
    MakeSwap(commands::transition::MakeSwapCommand),
    /// Withdraw a standing swap offer
    CancelSwap(commands::transition::CancelSwapCommand),
    /// Take a standing swap offer
    CompleteSwap(commands::transition::CompleteSwapCommand),
    /// Put a token up for sale
    Sell(commands::transition::SellCommand),
    /// Withdraw a standing sell order
    CancelSell(commands::transition::CancelSellCommand),
    /// Buy a token from a standing sell order
    Buy(commands::transition::BuyCommand),
    /// Remove a token from circulation
    Burn(commands::transition::BurnCommand),
    /// Decode a token payload
    DecodePayload(commands::decode::DecodePayloadCommand),
    /// Decode a token locking script
    DecodeOutput(commands::decode::DecodeOutputCommand),
    /// Fetch a transaction from the block explorer
    Fetch(commands::fetch::FetchCommand),
    /// Broadcast a raw transaction
    Broadcast(commands::fetch::BroadcastCommand),
    /// Test spend-proof oracle connectivity
    TestOracle(commands::test_oracle::TestOracleCommand),
}

pub async fn run() -> AppResult<()> {
    // Uses RUST_LOG environment variable (defaults to "error" if not set)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("error")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Genesis(command) => command.run().await,
        Commands::Issue(command) => command.run().await,
        Commands::Transfer(command) => command.run().await,
        Commands::MakeSwap(command) => command.run().await,
        Commands::CancelSwap(command) => command.run().await,
        Commands::CompleteSwap(command) => command.run().await,
        Commands::Sell(command) => command.run().await,
        Commands::CancelSell(command) => command.run().await,
        Commands::Buy(command) => command.run().await,
        Commands::Burn(command) => command.run().await,
        Commands::DecodePayload(command) => command.run().await,
        Commands::DecodeOutput(command) => command.run().await,
        Commands::Fetch(command) => command.run().await,
        Commands::Broadcast(command) => command.run().await,
        Commands::TestOracle(command) => command.run().await,
    }
}
