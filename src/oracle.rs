//! Move oracle adapter: asks a language model for one move.
//!
//! The oracle is untrusted. Whatever it answers is only a suggestion; the
//! [`crate::MoveArbiter`] decides what is actually played.

use crate::llm_client::LlmClient;
use crate::rules::{BoardState, LegalMove};
use async_trait::async_trait;
use derive_more::{Display, Error};
use tracing::{debug, instrument, warn};

/// Default cap on the length of an oracle answer, in characters.
pub const DEFAULT_MAX_ANSWER_CHARS: usize = 32;

/// The oracle could not provide a usable answer.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("Oracle unavailable: {}", reason)]
pub struct OracleUnavailable {
    /// Why no answer is available.
    pub reason: String,
}

impl OracleUnavailable {
    /// Creates the condition with a reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Source of move suggestions.
#[async_trait]
pub trait MoveOracle: Send + Sync {
    /// Suggests one move for the side to move as free text.
    ///
    /// Network failures, timeouts and empty answers all surface as
    /// [`OracleUnavailable`].
    async fn suggest(&self, position: &BoardState, legal_moves: &[LegalMove]) -> Result<String, OracleUnavailable>;
}

/// Builds the system prompt and user message for one suggestion.
pub fn build_prompt(position: &BoardState, legal_moves: &[LegalMove]) -> (String, String) {
    let side = position.side_to_move();
    let system = format!(
        "You are playing chess as {side}. \
         Respond with exactly one move in Standard Algebraic Notation (SAN), \
         chosen from the legal moves you are given, and nothing else."
    );

    let moves = legal_moves
        .iter()
        .map(|m| m.notation().as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let user = format!(
        "The current board position in FEN notation is: {fen}\n\n\
         Legal moves available: {moves}\n\n\
         Choose the best move for {side}. Respond with ONLY the move, for example \
         \"e6\" to move a pawn from e7 to e6 or \"Nf6\" to move a knight from g8 to f6.",
        fen = position.fen(),
    );

    (system, user)
}

/// Reduces a raw completion to a short move token candidate.
///
/// Keeps the first non-empty line, capped at `max_chars` characters.
pub fn sanitize_answer(raw: &str, max_chars: usize) -> Result<String, OracleUnavailable> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let capped: String = line.chars().take(max_chars).collect();
    let answer = capped.trim();
    if answer.is_empty() {
        return Err(OracleUnavailable::new("empty answer"));
    }
    Ok(answer.to_string())
}

/// Oracle backed by a chat-completion LLM.
#[derive(Debug, Clone)]
pub struct LlmOracle {
    client: LlmClient,
    max_answer_chars: usize,
}

impl LlmOracle {
    /// Wraps an LLM client.
    #[instrument(skip(client))]
    pub fn new(client: LlmClient, max_answer_chars: usize) -> Self {
        Self {
            client,
            max_answer_chars,
        }
    }
}

#[async_trait]
impl MoveOracle for LlmOracle {
    #[instrument(skip_all, fields(fen = %position.fen(), legal = legal_moves.len()))]
    async fn suggest(&self, position: &BoardState, legal_moves: &[LegalMove]) -> Result<String, OracleUnavailable> {
        let (system, user) = build_prompt(position, legal_moves);
        let raw = self.client.generate(&system, &user).await.map_err(|e| {
            warn!(error = %e, "Oracle request failed");
            OracleUnavailable::new(e.message)
        })?;
        let answer = sanitize_answer(&raw, self.max_answer_chars)?;
        debug!(answer = %answer, "Oracle answered");
        Ok(answer)
    }
}

/// Oracle used when no model is configured; never answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineOracle;

#[async_trait]
impl MoveOracle for OfflineOracle {
    async fn suggest(&self, _position: &BoardState, _legal_moves: &[LegalMove]) -> Result<String, OracleUnavailable> {
        Err(OracleUnavailable::new("no oracle configured"))
    }
}

#[async_trait]
impl<O: MoveOracle + ?Sized> MoveOracle for Box<O> {
    async fn suggest(&self, position: &BoardState, legal_moves: &[LegalMove]) -> Result<String, OracleUnavailable> {
        (**self).suggest(position, legal_moves).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RulesEngine;

    #[test]
    fn test_prompt_names_side_fen_and_every_move() {
        let rules = RulesEngine::new();
        let start = BoardState::start();
        let e4 = rules.parse_move(&start, "e4").unwrap();
        let position = rules.apply(&start, &e4).unwrap();
        let legal = rules.legal_moves(&position);

        let (system, user) = build_prompt(&position, &legal);
        assert!(system.contains("black"));
        assert!(user.contains(position.fen()));
        for m in &legal {
            assert!(user.contains(m.notation().as_str()), "missing {}", m.notation());
        }
    }

    #[test]
    fn test_sanitize_trims_and_takes_first_line() {
        assert_eq!(sanitize_answer("  Nf6 \n because it develops", 32).unwrap(), "Nf6");
        assert_eq!(sanitize_answer("\n\n e5\n", 32).unwrap(), "e5");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let answer = sanitize_answer(&"x".repeat(500), 8).unwrap();
        assert_eq!(answer.len(), 8);
    }

    #[test]
    fn test_sanitize_empty_is_unavailable() {
        assert!(sanitize_answer("", 32).is_err());
        assert!(sanitize_answer("   \n\t\n", 32).is_err());
    }

    #[tokio::test]
    async fn test_offline_oracle_is_unavailable() {
        let start = BoardState::start();
        let legal = RulesEngine::new().legal_moves(&start);
        assert!(OfflineOracle.suggest(&start, &legal).await.is_err());
    }
}
