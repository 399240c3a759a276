//! Oracle Chess - unified CLI

#![warn(missing_docs)]

use anyhow::Result;
use clap::Parser;
use oracle_chess::cli::{Cli, Command};
use oracle_chess::{
    BoardState, InMemoryPositionStore, LlmClient, LlmOracle, MoveArbiter, MoveOracle, OfflineOracle, OracleConfig,
    RulesEngine, ServerConfig, SessionService,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    initialize_tracing();

    let cli = Cli::parse();
    let config = ServerConfig::load_or_default(&cli.config)?.apply_env();

    match cli.command {
        Command::Serve { port, host, static_dir } => run_http_server(config.with_overrides(host, port, static_dir)).await,
        Command::Suggest { fen } => run_suggest(config, fen).await,
    }
}

fn initialize_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,oracle_chess=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Builds the LLM oracle, or the offline one when no API key is set.
#[instrument(skip(config), fields(provider = %config.provider()))]
fn build_oracle(config: &OracleConfig) -> Result<Box<dyn MoveOracle>> {
    match config.llm_config() {
        Ok(llm_config) => {
            let client = LlmClient::new(llm_config)?;
            info!(model = %config.model(), "Oracle ready");
            Ok(Box::new(LlmOracle::new(client, *config.max_answer_chars())))
        }
        Err(e) => {
            warn!(error = %e.message, "No oracle credentials, every reply will be a random legal move");
            Ok(Box::new(OfflineOracle))
        }
    }
}

/// Run the HTTP game server
#[instrument(skip(config), fields(host = %config.host(), port = config.port()))]
async fn run_http_server(config: ServerConfig) -> Result<()> {
    let oracle = build_oracle(config.oracle())?;
    let service = SessionService::new(InMemoryPositionStore::new(), oracle)
        .with_oracle_timeout(config.oracle().timeout());

    let static_dir: Option<PathBuf> = config.static_dir().clone();
    let app = oracle_chess::app(Arc::new(service), static_dir);

    let listener = tokio::net::TcpListener::bind((config.host().as_str(), *config.port())).await?;
    info!("Chess game server running on http://{}:{}", config.host(), config.port());

    axum::serve(listener, app).await?;
    Ok(())
}

/// Run one arbitration round and print it
#[instrument(skip(config))]
async fn run_suggest(config: ServerConfig, fen: Option<String>) -> Result<()> {
    let position = match fen {
        Some(fen) => BoardState::from_fen(&fen)?,
        None => BoardState::start(),
    };

    let rules = RulesEngine::new();
    let status = rules.status(&position);
    if status.is_terminal() {
        println!("{} ({})", position, status);
        return Ok(());
    }

    let legal = rules.legal_moves(&position);
    let oracle = build_oracle(config.oracle())?;
    let answer = match tokio::time::timeout(config.oracle().timeout(), oracle.suggest(&position, &legal)).await {
        Ok(Ok(answer)) => Some(answer),
        Ok(Err(e)) => {
            warn!(reason = %e.reason, "Oracle unavailable");
            None
        }
        Err(_) => {
            warn!("Oracle timed out");
            None
        }
    };

    let resolution = MoveArbiter::new(rules).resolve(&position, &legal, answer.as_deref())?;
    let next = rules.apply(&position, resolution.chosen())?;

    println!("oracle:   {}", answer.as_deref().unwrap_or("<none>"));
    println!("move:     {} ({})", resolution.chosen(), resolution.tier());
    println!("position: {}", next);
    Ok(())
}
