//! Command-line interface for oracle_chess.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Oracle Chess - play chess against a language model
#[derive(Parser, Debug)]
#[command(name = "oracle_chess")]
#[command(about = "Chess server whose opponent is a language model", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "oracle_chess.toml")]
    pub config: PathBuf,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP game server
    Serve {
        /// Port to bind to (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Directory of static assets to serve alongside the API
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// Ask the oracle for one move and show how it was arbitrated
    Suggest {
        /// Position in FEN notation (defaults to the starting position)
        #[arg(long)]
        fen: Option<String>,
    },
}
