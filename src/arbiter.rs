//! Move arbitration: maps an untrusted suggestion onto a legal move.
//!
//! Resolution is tiered. An exact notation match wins, then a lenient parse
//! through the rules engine, then a uniformly random legal move. The chosen
//! move is always a member of the legal set handed in.

use crate::rules::{BoardState, LegalMove, RulesEngine};
use derive_getters::Getters;
use derive_more::{Display, Error};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

/// Which tier of the policy produced the move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResolutionTier {
    /// Suggestion equals a legal move's SAN or coordinate notation.
    Exact,
    /// Suggestion parsed leniently into a legal move.
    Parsed,
    /// Random legal move; suggestion missing or unusable.
    Fallback,
}

/// Outcome of one arbitration round.
#[derive(Debug, Clone, Getters)]
pub struct Resolution {
    /// Selected legal move.
    chosen: LegalMove,
    /// Tier that selected it.
    tier: ResolutionTier,
}

impl Resolution {
    /// Splits into the move and its tier.
    pub fn into_parts(self) -> (LegalMove, ResolutionTier) {
        (self.chosen, self.tier)
    }
}

/// Resolves oracle answers against a legal-move set. Never mutates state.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveArbiter {
    rules: RulesEngine,
}

impl MoveArbiter {
    /// Creates an arbiter using `rules` for the lenient tier.
    pub fn new(rules: RulesEngine) -> Self {
        Self { rules }
    }

    /// Resolves `suggestion` using the thread-local RNG for fallback.
    ///
    /// `None` means the oracle gave no answer.
    pub fn resolve(
        &self,
        position: &BoardState,
        legal_moves: &[LegalMove],
        suggestion: Option<&str>,
    ) -> Result<Resolution, ArbiterError> {
        self.resolve_with_rng(position, legal_moves, suggestion, &mut rand::thread_rng())
    }

    /// Resolves `suggestion`, drawing fallback moves from `rng`.
    #[instrument(skip(self, position, legal_moves, rng), fields(fen = %position.fen(), legal = legal_moves.len()))]
    pub fn resolve_with_rng<R: Rng + ?Sized>(
        &self,
        position: &BoardState,
        legal_moves: &[LegalMove],
        suggestion: Option<&str>,
        rng: &mut R,
    ) -> Result<Resolution, ArbiterError> {
        if legal_moves.is_empty() {
            warn!("Arbitration requested with no legal moves");
            return Err(ArbiterError::new(format!("No legal moves in {}", position.fen())));
        }

        if let Some(text) = suggestion.map(str::trim).filter(|t| !t.is_empty()) {
            if let Some(chosen) = legal_moves.iter().find(|m| m.matches_exactly(text)) {
                info!(notation = %chosen.notation(), "Resolved by exact match");
                return Ok(Resolution {
                    chosen: chosen.clone(),
                    tier: ResolutionTier::Exact,
                });
            }

            match self.rules.parse_move(position, text) {
                Ok(parsed) => {
                    if let Some(chosen) = legal_moves.iter().find(|m| m.same_move(&parsed)) {
                        info!(notation = %chosen.notation(), "Resolved by lenient parse");
                        return Ok(Resolution {
                            chosen: chosen.clone(),
                            tier: ResolutionTier::Parsed,
                        });
                    }
                    debug!(parsed = %parsed.notation(), "Parsed move is outside the offered set");
                }
                Err(e) => debug!(error = %e.message(), "Suggestion did not parse"),
            }
        }

        let chosen = legal_moves
            .choose(rng)
            .ok_or_else(|| ArbiterError::new("Fallback selection failed".to_string()))?;
        info!(notation = %chosen.notation(), suggestion = ?suggestion, "Resolved by random fallback");
        Ok(Resolution {
            chosen: chosen.clone(),
            tier: ResolutionTier::Fallback,
        })
    }
}

/// Arbitration error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Arbiter error: {} at {}:{}", message, file, line)]
pub struct ArbiterError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ArbiterError {
    /// Creates a new arbiter error.
    #[track_caller]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
