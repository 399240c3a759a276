//! Oracle Chess library - chess against a language-model opponent
//!
//! A human plays one side; the other side's moves are suggested by an
//! external oracle (a language model) and arbitrated against the legal-move
//! set so the game always progresses.
//!
//! # Architecture
//!
//! - **Rules**: position parsing, legal moves, move application, game status
//! - **Store**: per-game sessions keyed by id, with a per-session turn lock
//! - **Oracle**: prompt building and the LLM call, failures isolated
//! - **Arbiter**: exact / lenient-parse / random-fallback resolution
//! - **Service**: start a game, play one turn
//! - **Server**: JSON endpoints over HTTP
//!
//! # Example
//!
//! ```no_run
//! use oracle_chess::{InMemoryPositionStore, OfflineOracle, SessionService, SubmitMove};
//!
//! # async fn example() -> Result<(), oracle_chess::GameError> {
//! let service = SessionService::new(InMemoryPositionStore::new(), OfflineOracle);
//! let game = service.start_game().await?;
//!
//! let outcome = service
//!     .submit_move(SubmitMove {
//!         game_id: Some(game.session_id().to_string()),
//!         human_move: Some("e4".to_string()),
//!         fen: Some("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1".to_string()),
//!     })
//!     .await?;
//! println!("reply: {:?}", outcome.ai_move());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod arbiter;
pub mod cli;
pub mod config;
pub mod llm_client;
pub mod oracle;
pub mod rules;
pub mod server;
pub mod service;
pub mod store;

// Crate-level exports - Rules engine
pub use rules::{BoardState, GameStatus, LegalMove, RulesEngine, RulesError, RulesErrorKind, Side};

// Crate-level exports - Position store
pub use store::{
    InMemoryPositionStore, MoveRecord, PositionStore, Session, SessionId, StoreError, StoreErrorKind, TurnGuard,
};

// Crate-level exports - Oracle
pub use llm_client::{LlmClient, LlmConfig, LlmError, LlmProvider};
pub use oracle::{LlmOracle, MoveOracle, OfflineOracle, OracleUnavailable, build_prompt, sanitize_answer};

// Crate-level exports - Arbitration
pub use arbiter::{ArbiterError, MoveArbiter, Resolution, ResolutionTier};

// Crate-level exports - Session service
pub use service::{GameError, GameErrorKind, NewGame, SessionService, SubmitMove, TurnOutcome};

// Crate-level exports - Configuration and HTTP
pub use config::{ConfigError, OracleConfig, ServerConfig};
pub use server::{ApiError, ErrorResponse, MoveRequest, MoveResponse, NewGameResponse, app, router};
