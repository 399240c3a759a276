//! Rules engine adapter over `shakmaty`.
//!
//! Every position in the crate is produced here: parsed from FEN, the
//! standard start, or the result of applying a legal move. Nothing else
//! constructs a [`BoardState`].

use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position, Role, Square};
use std::fmt;
use tracing::{debug, instrument, warn};

/// Half-move clock value at which the fifty-move rule ends the game.
const FIFTY_MOVE_HALFMOVES: u32 = 100;

/// Side to move.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Side {
    /// White pieces.
    White,
    /// Black pieces.
    Black,
}

impl Side {
    /// Returns the other side.
    pub fn opponent(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

/// A legal, internally consistent chess position.
///
/// Serializes as its FEN string.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BoardState {
    position: Chess,
    fen: String,
}

impl BoardState {
    /// The standard starting position.
    pub fn start() -> Self {
        Self::from_position(Chess::default())
    }

    /// Parses and validates a FEN string.
    #[instrument]
    pub fn from_fen(fen: &str) -> Result<Self, RulesError> {
        let parsed: Fen = fen.trim().parse().map_err(|e| {
            RulesError::new(RulesErrorKind::InvalidPosition, format!("Unreadable FEN '{}': {}", fen, e))
        })?;
        let position: Chess = parsed.into_position(CastlingMode::Standard).map_err(|e| {
            RulesError::new(RulesErrorKind::InvalidPosition, format!("Impossible position '{}': {}", fen, e))
        })?;
        Ok(Self::from_position(position))
    }

    fn from_position(position: Chess) -> Self {
        let fen = Fen::from_position(position.clone(), EnPassantMode::Legal).to_string();
        Self { position, fen }
    }

    /// FEN of this position.
    pub fn fen(&self) -> &str {
        &self.fen
    }

    /// Side to move.
    pub fn side_to_move(&self) -> Side {
        self.position.turn().into()
    }

    /// Full-move number (starts at 1, increments after Black moves).
    pub fn fullmoves(&self) -> u32 {
        self.position.fullmoves().get()
    }

    /// Placement, side, castling and en-passant fields; equal keys mean the
    /// same position for repetition purposes.
    pub fn repetition_key(&self) -> &str {
        let mut end = self.fen.len();
        let mut fields = 0;
        for (idx, ch) in self.fen.char_indices() {
            if ch == ' ' {
                fields += 1;
                if fields == 4 {
                    end = idx;
                    break;
                }
            }
        }
        &self.fen[..end]
    }

    /// True when both positions have the same pieces and side to move.
    pub fn same_placement(&self, other: &BoardState) -> bool {
        self.position.board() == other.position.board() && self.position.turn() == other.position.turn()
    }
}

impl fmt::Debug for BoardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BoardState").field(&self.fen).finish()
    }
}

impl fmt::Display for BoardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fen)
    }
}

impl PartialEq for BoardState {
    fn eq(&self, other: &Self) -> bool {
        self.fen == other.fen
    }
}

impl Eq for BoardState {}

impl TryFrom<String> for BoardState {
    type Error = RulesError;

    fn try_from(fen: String) -> Result<Self, Self::Error> {
        BoardState::from_fen(&fen)
    }
}

impl From<BoardState> for String {
    fn from(state: BoardState) -> Self {
        state.fen
    }
}

/// One legal move from a specific position.
#[derive(Debug, Clone, Getters)]
pub struct LegalMove {
    /// Standard algebraic notation, with `+`/`#` suffix.
    notation: String,
    /// Coordinate notation (`e2e4`, `e7e8q`, castling as `e1g1`).
    alternate_notation: String,
    /// Square the piece leaves.
    source: Square,
    /// Square the piece lands on.
    target: Square,
    /// Promotion piece, if any.
    promotion: Option<Role>,
    #[getter(skip)]
    inner: Move,
}

impl LegalMove {
    /// Describes `mv` as played from `position`. `mv` must be legal there.
    fn describe(position: &Chess, mv: Move) -> Option<Self> {
        let uci = mv.to_uci(CastlingMode::Standard);
        let (source, target, promotion) = match uci {
            UciMove::Normal { from, to, promotion } => (from, to, promotion),
            _ => return None,
        };

        let san = San::from_move(position, &mv);
        let after = position.clone().play(&mv).ok()?;
        let suffix = if after.is_checkmate() {
            "#"
        } else if after.is_check() {
            "+"
        } else {
            ""
        };

        Some(Self {
            notation: format!("{}{}", san, suffix),
            alternate_notation: uci.to_string(),
            source,
            target,
            promotion,
            inner: mv,
        })
    }

    /// True when both descriptors name the same move.
    pub fn same_move(&self, other: &LegalMove) -> bool {
        self.source == other.source && self.target == other.target && self.promotion == other.promotion
    }

    /// True when `text` is exactly this move's SAN or coordinate notation.
    pub fn matches_exactly(&self, text: &str) -> bool {
        self.notation == text || self.alternate_notation == text
    }
}

impl PartialEq for LegalMove {
    fn eq(&self, other: &Self) -> bool {
        self.same_move(other)
    }
}

impl Eq for LegalMove {}

impl fmt::Display for LegalMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.notation)
    }
}

/// Whether a position is still being played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GameStatus {
    /// Moves remain and no draw rule applies.
    Ongoing,
    /// Side to move is mated.
    Checkmate,
    /// Side to move has no legal move and is not in check.
    Stalemate,
    /// Insufficient material or the fifty-move rule.
    Draw,
}

impl GameStatus {
    /// True for every status except [`GameStatus::Ongoing`].
    pub fn is_terminal(self) -> bool {
        !matches!(self, GameStatus::Ongoing)
    }
}

/// Facade over the chess rules; the single source of truth for legality.
#[derive(Debug, Clone, Copy, Default)]
pub struct RulesEngine;

impl RulesEngine {
    /// Creates the rules adapter.
    pub fn new() -> Self {
        Self
    }

    /// Every legal move from `state`. Empty iff checkmate or stalemate.
    #[instrument(skip(self, state), fields(fen = %state.fen()))]
    pub fn legal_moves(&self, state: &BoardState) -> Vec<LegalMove> {
        let moves: Vec<LegalMove> = state
            .position
            .legal_moves()
            .into_iter()
            .filter_map(|mv| LegalMove::describe(&state.position, mv))
            .collect();
        debug!(count = moves.len(), "Enumerated legal moves");
        moves
    }

    /// Plays `mv` on `state`, producing the next position.
    #[instrument(skip(self, state, mv), fields(fen = %state.fen(), notation = %mv.notation()))]
    pub fn apply(&self, state: &BoardState, mv: &LegalMove) -> Result<BoardState, RulesError> {
        if !state.position.is_legal(&mv.inner) {
            warn!("Move is not legal in this position");
            return Err(RulesError::new(
                RulesErrorKind::IllegalMove,
                format!("{} is not legal in {}", mv.notation(), state.fen()),
            ));
        }
        let next = state.position.clone().play(&mv.inner).map_err(|e| {
            RulesError::new(RulesErrorKind::IllegalMove, format!("{} rejected: {}", mv.notation(), e))
        })?;
        Ok(BoardState::from_position(next))
    }

    /// Reports whether the game at `state` is over, and how.
    #[instrument(skip(self, state), fields(fen = %state.fen()))]
    pub fn status(&self, state: &BoardState) -> GameStatus {
        let position = &state.position;
        if position.is_checkmate() {
            GameStatus::Checkmate
        } else if position.is_stalemate() {
            GameStatus::Stalemate
        } else if position.is_insufficient_material() || position.halfmoves() >= FIFTY_MOVE_HALFMOVES {
            GameStatus::Draw
        } else {
            GameStatus::Ongoing
        }
    }

    /// Leniently reads free text as a move legal in `state`.
    ///
    /// Accepts SAN with or without check suffix, coordinate notation, long
    /// algebraic (`e7-e5`, `Ng8-f6`, `e7xe5`), zero castling (`0-0`), a
    /// leading move number, surrounding quotes and trailing annotation
    /// glyphs.
    #[instrument(skip(self, state), fields(fen = %state.fen()))]
    pub fn parse_move(&self, state: &BoardState, text: &str) -> Result<LegalMove, RulesError> {
        let token = normalize_move_text(text);
        if token.is_empty() {
            return Err(RulesError::new(RulesErrorKind::Unparseable, "Empty move text".to_string()));
        }

        let from_san = token
            .parse::<SanPlus>()
            .ok()
            .and_then(|san| san.san.to_move(&state.position).ok());
        let mv = match from_san {
            Some(mv) => mv,
            None => coordinate_form(&token)
                .and_then(|uci| uci.parse::<UciMove>().ok())
                .and_then(|uci| uci.to_move(&state.position).ok())
                .ok_or_else(|| {
                    debug!(token = %token, "Text is not a legal move");
                    RulesError::new(
                        RulesErrorKind::Unparseable,
                        format!("'{}' is not a legal move in {}", text.trim(), state.fen()),
                    )
                })?,
        };

        LegalMove::describe(&state.position, mv).ok_or_else(|| {
            RulesError::new(
                RulesErrorKind::IllegalMove,
                format!("'{}' cannot be described as a legal move", text.trim()),
            )
        })
    }
}

/// Strips decoration an oracle or client tends to put around a move token.
fn normalize_move_text(text: &str) -> String {
    let trimmed = text
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*'))
        .trim();

    let without_number = match trimmed.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) if idx > 0 && trimmed[idx..].starts_with('.') => {
            trimmed[idx..].trim_start_matches('.').trim_start()
        }
        _ => trimmed,
    };

    let token = without_number.trim_end_matches(&['.', ',', ';', '!', '?'][..]).trim();

    match token {
        "0-0" => "O-O".to_string(),
        "0-0+" => "O-O+".to_string(),
        "0-0#" => "O-O#".to_string(),
        "0-0-0" => "O-O-O".to_string(),
        "0-0-0+" => "O-O-O+".to_string(),
        "0-0-0#" => "O-O-O#".to_string(),
        other => other.to_string(),
    }
}

/// Rewrites coordinate or long algebraic text as a lowercase UCI token.
///
/// `G1F3`, `g1-f3`, `Ng1-f3`, `e4xd5` and `a7-a8=Q` all qualify. A leading
/// piece letter is dropped, not checked; legality is decided by the caller.
fn coordinate_form(token: &str) -> Option<String> {
    let body = token.trim_end_matches(&['+', '#'][..]);
    squares_to_uci(body).or_else(|| {
        body.strip_prefix(|c: char| matches!(c, 'K' | 'Q' | 'R' | 'B' | 'N' | 'P'))
            .and_then(squares_to_uci)
    })
}

fn squares_to_uci(body: &str) -> Option<String> {
    let body = body.to_ascii_lowercase();
    let (from, rest) = body.split_at_checked(2)?;
    let rest = rest.strip_prefix(|c: char| matches!(c, '-' | 'x' | ':')).unwrap_or(rest);
    let (to, promotion) = rest.split_at_checked(2)?;
    let promotion = promotion.strip_prefix('=').unwrap_or(promotion);

    let is_square = |sq: &str| {
        let mut chars = sq.chars();
        matches!(
            (chars.next(), chars.next()),
            (Some('a'..='h'), Some('1'..='8'))
        )
    };
    let promotion_ok = promotion.is_empty() || matches!(promotion, "q" | "r" | "b" | "n");
    (is_square(from) && is_square(to) && promotion_ok).then(|| format!("{}{}{}", from, to, promotion))
}

/// Why the rules adapter refused an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RulesErrorKind {
    /// FEN could not be read or describes an impossible position.
    #[display("invalid position")]
    InvalidPosition,
    /// Move is not in the legal set for the position.
    #[display("illegal move")]
    IllegalMove,
    /// Text does not name any move.
    #[display("unparseable move")]
    Unparseable,
}

/// Rules adapter error with location tracking.
#[derive(Debug, Clone, Display, Error, Getters)]
#[display("Rules error ({}): {} at {}:{}", kind, message, file, line)]
pub struct RulesError {
    /// Error category.
    kind: RulesErrorKind,
    /// Error message.
    message: String,
    /// Line number where error occurred.
    line: u32,
    /// Source file where error occurred.
    file: &'static str,
}

impl RulesError {
    /// Creates a new rules error.
    #[track_caller]
    pub fn new(kind: RulesErrorKind, message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
