//! Session service: start a game, play one human/oracle turn.

use crate::arbiter::{MoveArbiter, ResolutionTier};
use crate::oracle::{MoveOracle, OracleUnavailable};
use crate::rules::{BoardState, LegalMove, RulesEngine, RulesErrorKind};
use crate::store::{MoveRecord, PositionStore, Session, SessionId, StoreError, StoreErrorKind};
use derive_getters::Getters;
use derive_more::{Display, Error};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Threefold repetition ends the game.
const REPETITION_LIMIT: usize = 3;

/// Default bound on one oracle call.
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(15);

/// A freshly started game.
#[derive(Debug, Clone, Getters)]
pub struct NewGame {
    /// Identifier to send with every move.
    session_id: SessionId,
    /// Starting position.
    position: BoardState,
}

/// A human move as reported by the client.
#[derive(Debug, Clone, Default)]
pub struct SubmitMove {
    /// Session the move belongs to.
    pub game_id: Option<String>,
    /// Human move notation.
    pub human_move: Option<String>,
    /// Position after the human move, as the client computed it.
    pub fen: Option<String>,
}

/// Result of one turn.
#[derive(Debug, Clone, Getters)]
pub struct TurnOutcome {
    /// The oracle side's reply, absent when the game ended on the human move.
    ai_move: Option<String>,
    /// Position after the turn.
    position: BoardState,
    /// True when no further move can be played.
    game_over: bool,
    /// Arbitration tier of the reply.
    tier: Option<ResolutionTier>,
}

/// Orchestrates store, rules, oracle and arbiter for each turn.
pub struct SessionService<S, O> {
    store: S,
    oracle: O,
    rules: RulesEngine,
    arbiter: MoveArbiter,
    oracle_timeout: Duration,
}

impl<S: PositionStore, O: MoveOracle> SessionService<S, O> {
    /// Creates the service with the default oracle timeout.
    #[instrument(skip_all)]
    pub fn new(store: S, oracle: O) -> Self {
        info!("Creating session service");
        let rules = RulesEngine::new();
        Self {
            store,
            oracle,
            rules,
            arbiter: MoveArbiter::new(rules),
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
        }
    }

    /// Overrides how long one oracle call may take.
    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Starts a game at the standard position.
    #[instrument(skip(self))]
    pub async fn start_game(&self) -> Result<NewGame, GameError> {
        let session = self.store.create().await?;
        info!(session_id = %session.id(), "Game started");
        Ok(NewGame {
            session_id: session.id().clone(),
            position: session.position().clone(),
        })
    }

    /// Records the human move, then plays the oracle side's reply.
    #[instrument(skip(self, request), fields(game_id = ?request.game_id, human_move = ?request.human_move))]
    pub async fn submit_move(&self, request: SubmitMove) -> Result<TurnOutcome, GameError> {
        let game_id = required(request.game_id, "gameId")?;
        let human_move = required(request.human_move, "move")?;
        let fen = required(request.fen, "fen")?;

        let reported = BoardState::from_fen(&fen).map_err(|e| {
            warn!(error = %e, "Client reported an invalid position");
            GameError::new(GameErrorKind::InvalidRequest, format!("Invalid fen: {}", e.message()))
        })?;

        let id = SessionId::from_client(game_id);
        let _turn = self.store.lock(&id).await;

        let prior = match self.store.get(&id).await {
            Ok(session) => Some(session),
            Err(e) if *e.kind() == StoreErrorKind::NotFound => {
                info!(session_id = %id, "Unknown session, resuming from client position");
                None
            }
            Err(e) => return Err(e.into()),
        };

        let notation = match &prior {
            Some(session) => self.check_human_move(session.position(), &human_move, &reported)?,
            None => human_move.trim().to_string(),
        };
        let human_side = reported.side_to_move().opponent();
        let human_record = MoveRecord::new(human_side, notation, reported.clone());

        // The turn is staged locally and committed in one write at the end.
        let mut staged = match prior {
            Some(mut session) => {
                session.record(human_record.clone());
                session
            }
            None => Session::resumed(id.clone(), human_record.clone()),
        };

        if self.is_over(&reported, staged.repetition_count(&reported)) {
            self.store.record_turn(&id, vec![human_record]).await?;
            info!(session_id = %id, "Game over after human move");
            return Ok(TurnOutcome {
                ai_move: None,
                position: reported,
                game_over: true,
                tier: None,
            });
        }

        let legal = self.rules.legal_moves(&reported);
        let suggestion = self.consult_oracle(&reported, &legal).await;
        let (chosen, tier) = self
            .arbiter
            .resolve(&reported, &legal, suggestion.as_deref().ok())
            .map_err(|e| GameError::new(GameErrorKind::EngineFailure, e.message))?
            .into_parts();

        let next = self.rules.apply(&reported, &chosen).map_err(|e| {
            error!(error = %e, "Arbitrated move rejected by rules engine");
            GameError::new(GameErrorKind::EngineFailure, e.message().clone())
        })?;
        let ai_record = MoveRecord::new(reported.side_to_move(), chosen.notation().clone(), next.clone());
        staged.record(ai_record.clone());
        let repetitions = staged.repetition_count(&next);
        self.store.record_turn(&id, vec![human_record, ai_record]).await?;

        let game_over = self.is_over(&next, repetitions);
        info!(
            session_id = %id,
            ai_move = %chosen.notation(),
            tier = %tier,
            game_over,
            "Turn complete"
        );

        Ok(TurnOutcome {
            ai_move: Some(chosen.notation().clone()),
            position: next,
            game_over,
            tier: Some(tier),
        })
    }

    /// Validates the human move against the last-known position.
    ///
    /// Returns the canonical SAN. The client's position is still what gets
    /// recorded; a mismatch is only logged.
    fn check_human_move(
        &self,
        known: &BoardState,
        human_move: &str,
        reported: &BoardState,
    ) -> Result<String, GameError> {
        let mv = self.rules.parse_move(known, human_move).map_err(|e| {
            warn!(fen = %known, human_move, "Human move is not legal in the known position");
            let kind = match e.kind() {
                RulesErrorKind::InvalidPosition => GameErrorKind::EngineFailure,
                RulesErrorKind::IllegalMove | RulesErrorKind::Unparseable => GameErrorKind::IllegalMove,
            };
            GameError::new(kind, format!("Illegal move '{}': {}", human_move.trim(), e.message()))
        })?;
        let derived = self.rules.apply(known, &mv).map_err(|e| {
            GameError::new(GameErrorKind::IllegalMove, format!("Illegal move '{}': {}", human_move.trim(), e.message()))
        })?;
        if !derived.same_placement(reported) {
            warn!(
                derived = %derived,
                reported = %reported,
                "Client position differs from server-derived position"
            );
        }
        Ok(mv.notation().clone())
    }

    /// Asks the oracle within the timeout; never fails the turn.
    async fn consult_oracle(
        &self,
        position: &BoardState,
        legal: &[LegalMove],
    ) -> Result<String, OracleUnavailable> {
        match tokio::time::timeout(self.oracle_timeout, self.oracle.suggest(position, legal)).await {
            Ok(Ok(answer)) => {
                debug!(answer = %answer, "Oracle suggestion received");
                Ok(answer)
            }
            Ok(Err(unavailable)) => {
                warn!(reason = %unavailable.reason, "Oracle unavailable");
                Err(unavailable)
            }
            Err(_) => {
                warn!(timeout_ms = self.oracle_timeout.as_millis() as u64, "Oracle timed out");
                Err(OracleUnavailable::new("timed out"))
            }
        }
    }

    fn is_over(&self, position: &BoardState, repetitions: usize) -> bool {
        let status = self.rules.status(position);
        if status.is_terminal() {
            debug!(status = %status, "Terminal position");
            return true;
        }
        if repetitions >= REPETITION_LIMIT {
            debug!(repetitions, "Threefold repetition");
            return true;
        }
        false
    }
}

#[track_caller]
fn required(field: Option<String>, name: &str) -> Result<String, GameError> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(GameError::new(
            GameErrorKind::InvalidRequest,
            "Missing required fields".to_string(),
        )
        .with_field(name)),
    }
}

/// Externally meaningful failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum GameErrorKind {
    /// Missing or malformed request fields.
    #[display("invalid request")]
    InvalidRequest,
    /// Human move is not legal in the known position.
    #[display("illegal move")]
    IllegalMove,
    /// Unexpected internal failure; no state was changed by the failing step.
    #[display("engine failure")]
    EngineFailure,
}

/// Session service error with location tracking.
#[derive(Debug, Clone, Display, Error, Getters)]
#[display("Game error ({}): {} at {}:{}", kind, message, file, line)]
pub struct GameError {
    /// Error category.
    kind: GameErrorKind,
    /// Error message.
    message: String,
    /// Request field at fault, if any.
    field: Option<String>,
    /// Line number where error occurred.
    line: u32,
    /// Source file where error occurred.
    file: &'static str,
}

impl GameError {
    /// Creates a new game error.
    #[track_caller]
    pub fn new(kind: GameErrorKind, message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            message,
            field: None,
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// Names the request field at fault.
    pub fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }
}

impl From<StoreError> for GameError {
    #[track_caller]
    fn from(err: StoreError) -> Self {
        error!(error = %err, "Position store failure");
        Self::new(GameErrorKind::EngineFailure, err.message().clone())
    }
}
