//! BaseBadge Client Binary
//!
//! Command-line front end for signing in, checking the cooldown, submitting
//! a score card and reading the dashboard.

use anyhow::{Context, Result};
use basebadge_chain::{ChainClientFactory, NetworkParams};
use basebadge_client::config::{ClientConfig, DEFAULT_API_URL, DEFAULT_SCORE_CHECKER};
use basebadge_client::{
    BadgeEvent, BaseBadgeClient, FileStore, HttpBackend, ScoreRoute, TokenStore, Trigger,
};
use basebadge_types::format_wait;
use clap::{Parser, Subcommand};
use ethers::types::Address;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "basebadge")]
#[command(about = "BaseBadge on-chain trust score client")]
struct Args {
    /// Backend base URL
    #[arg(long, env = "BASEBADGE_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// ScoreChecker contract address
    #[arg(long, env = "BASEBADGE_SCORE_CHECKER", default_value = DEFAULT_SCORE_CHECKER)]
    score_checker: String,

    /// RPC URL of the target chain
    #[arg(long, env = "BASEBADGE_RPC_URL", default_value = "https://mainnet.base.org")]
    rpc_url: String,

    #[arg(long, default_value = "8453")]
    chain_id: u64,

    #[arg(long, default_value = "Base")]
    chain_name: String,

    #[arg(long, default_value = "https://basescan.org")]
    explorer_url: String,

    /// Route that computes the score
    #[arg(long, value_enum, default_value = "direct")]
    score_route: ScoreRoute,

    /// Refuse score cards not signed by this address
    #[arg(long, env = "BASEBADGE_AUTHORIZED_SIGNER")]
    authorized_signer: Option<String>,

    #[arg(long, default_value = "1")]
    confirmations: usize,

    /// Session file (defaults to the platform data directory)
    #[arg(long, env = "BASEBADGE_SESSION_FILE")]
    session_file: Option<PathBuf>,

    /// Wallet private key
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with the wallet
    Login,
    /// Drop the stored session
    Logout,
    /// Show session, fee and cooldown
    Status,
    /// Submit a fresh score card and wait for the on-chain result
    Check,
    /// Show the recorded score, history and badges
    Dashboard,
    /// Watch backend liveness
    Health {
        #[arg(long, default_value = "5000")]
        interval_ms: u64,
    },
}

fn parse_address(raw: &str, what: &str) -> Result<Address> {
    raw.trim()
        .parse::<Address>()
        .with_context(|| format!("invalid {} address: {}", what, raw))
}

impl Args {
    fn client_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::new(
            self.api_url.clone(),
            parse_address(&self.score_checker, "ScoreChecker")?,
        );
        config.network = NetworkParams {
            chain_id: self.chain_id,
            chain_name: self.chain_name.clone(),
            rpc_url: self.rpc_url.clone(),
            explorer_url: self.explorer_url.clone(),
            ..NetworkParams::base_mainnet()
        };
        config.score_route = self.score_route;
        config.authorized_signer = self
            .authorized_signer
            .as_deref()
            .map(|raw| parse_address(raw, "signer"))
            .transpose()?;
        config.confirmations = self.confirmations;
        config.session_file = self.session_file.clone();
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = args.client_config()?;
    if let Commands::Health { interval_ms } = args.command {
        config.health_interval_ms = interval_ms;
    }

    let session_path = config
        .session_path()
        .context("no data directory for the session file; pass --session-file")?;
    let store = TokenStore::new(Arc::new(FileStore::open(&session_path)?));
    let backend = Arc::new(HttpBackend::new(&config.api_base_url, config.score_route)?);
    let chain = ChainClientFactory::connect(config.chain_config(Some(args.private_key.clone()))).await?;

    let client = BaseBadgeClient::new(config, chain, backend, store);

    match args.command {
        Commands::Login => {
            let session = client.auth().login().await?;
            println!("Signed in as {:?}", session.address);
        }
        Commands::Logout => {
            client.auth().logout()?;
            println!("Signed out");
        }
        Commands::Status => run_status(&client).await,
        Commands::Check => run_check(&client).await?,
        Commands::Dashboard => {
            client.on_wallet_connected().await;
            print_dashboard(&client);
        }
        Commands::Health { .. } => run_health(&client).await?,
    }

    Ok(())
}

async fn run_status(client: &BaseBadgeClient) {
    println!(
        "Session: {}",
        if client.auth().is_authenticated() {
            "signed in"
        } else {
            "signed out"
        }
    );
    println!(
        "Network: {}",
        if client.gate().is_on_required_chain().await {
            "ok"
        } else {
            "wrong chain"
        }
    );

    let cooldown = client.on_wallet_connected().await;
    match client.orchestrator().fee() {
        Some(fee) => println!("Fee: {} wei", fee),
        None => println!("Fee: unavailable"),
    }
    match cooldown {
        Some(state) if state.is_open() => println!("Cooldown: ready"),
        Some(state) => println!("Cooldown: {} remaining", format_wait(state.remaining_seconds)),
        None => println!("Cooldown: unavailable"),
    }
}

async fn run_check(client: &BaseBadgeClient) -> Result<()> {
    client.on_wallet_connected().await;

    let orchestrator = client.orchestrator();
    match orchestrator.check_score().await {
        Ok(Trigger::Submitted(tx_hash)) => {
            println!("Submitted: {}", client.config().network.tx_url(tx_hash));
        }
        Ok(Trigger::Ignored) => {
            println!("A check is already in progress");
            return Ok(());
        }
        Err(e) => {
            if let Some(message) = e.user_message() {
                println!("{}", message);
            }
            return Ok(());
        }
    }

    let lifecycle = orchestrator.wait_terminal().await;
    info!("Submission finished: {:?}", lifecycle);

    if let Some(error) = orchestrator.last_error() {
        if let Some(message) = error.user_message() {
            println!("{}", message);
        }
    } else if let Some(error) = orchestrator.refresh_error() {
        println!("{}", error);
    } else if let Some(result) = orchestrator.last_result() {
        println!(
            "Trust score: {} (base {}, security {})",
            result.total_score, result.base_score, result.security_score
        );
    }
    Ok(())
}

fn print_dashboard(client: &BaseBadgeClient) {
    let state = client.refresher().state();
    match state.last_scores {
        Some(scores) => println!(
            "Recorded score: {} (base {}, security {})",
            scores.total_score, scores.base_score, scores.security_score
        ),
        None => println!("No recorded score yet"),
    }
    for entry in &state.history {
        println!("  {}  {}", entry.date, entry.total_score);
    }
    for badge in state.badges.iter().filter(|b| b.earned) {
        println!("Badge: {} {}", badge.icon, badge.name);
    }
}

async fn run_health(client: &BaseBadgeClient) -> Result<()> {
    let mut events = client.events().subscribe();
    let probe = client.spawn_health_probe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => {
                if let Ok(BadgeEvent::BackendStatusChanged { online }) = event {
                    println!("Backend {}", if online { "online" } else { "offline" });
                }
            }
        }
    }

    println!("Shutting down health probe...");
    probe.shutdown().await;
    Ok(())
}
