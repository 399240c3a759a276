//! Session storage with a per-session turn lock.

use crate::rules::{BoardState, Side};
use async_trait::async_trait;
use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_new::new;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, instrument};

/// Opaque, collision-resistant session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wraps an identifier supplied by a client.
    pub fn from_client(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The identifier as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One played move, in game order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, new)]
pub struct MoveRecord {
    /// Side that made the move.
    side: Side,
    /// Move as notated (SAN when known).
    notation: String,
    /// Position after the move.
    resulting_position: BoardState,
}

/// One game: its current position and move log.
#[derive(Debug, Clone, Serialize, Deserialize, Getters)]
pub struct Session {
    /// Session identifier.
    id: SessionId,
    /// Position the session started from; `None` when the session was
    /// resumed mid-game from a client-reported position.
    initial_position: Option<BoardState>,
    /// Current authoritative position.
    position: BoardState,
    /// Append-only move log.
    move_log: Vec<MoveRecord>,
}

impl Session {
    /// Creates a session at `position` with an empty log.
    pub fn new(id: SessionId, position: BoardState) -> Self {
        Self {
            id,
            initial_position: Some(position.clone()),
            position,
            move_log: Vec::new(),
        }
    }

    /// Creates a session whose history before `record` is unknown.
    pub fn resumed(id: SessionId, record: MoveRecord) -> Self {
        Self {
            id,
            initial_position: None,
            position: record.resulting_position().clone(),
            move_log: vec![record],
        }
    }

    /// Appends a move and makes its resulting position current.
    pub fn record(&mut self, record: MoveRecord) {
        self.position = record.resulting_position().clone();
        self.move_log.push(record);
    }

    /// How many times `position` has occurred in this game, counting the
    /// initial position and every logged move.
    pub fn repetition_count(&self, position: &BoardState) -> usize {
        let key = position.repetition_key();
        self.initial_position
            .iter()
            .chain(self.move_log.iter().map(|r| r.resulting_position()))
            .filter(|p| p.repetition_key() == key)
            .count()
    }
}

/// Exclusive holder of a session's turn lock.
pub type TurnGuard = OwnedMutexGuard<()>;

/// Storage contract for game sessions.
///
/// Every operation re-fetches by id; callers never keep a session across
/// calls. Holders of [`PositionStore::lock`] for one id are serialized;
/// different ids never contend.
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Creates a session at the standard starting position.
    async fn create(&self) -> Result<Session, StoreError>;

    /// Fetches a session, failing with [`StoreErrorKind::NotFound`].
    async fn get(&self, id: &SessionId) -> Result<Session, StoreError>;

    /// Appends `record` and sets `position` as current. Unknown ids are
    /// created from `position` instead of failing.
    async fn update(
        &self,
        id: &SessionId,
        position: BoardState,
        record: MoveRecord,
    ) -> Result<(), StoreError>;

    /// Appends every record of one turn in a single write; the last
    /// record's position becomes current. Unknown ids are created as with
    /// [`PositionStore::update`]. Either all records land or none do.
    async fn record_turn(&self, id: &SessionId, records: Vec<MoveRecord>) -> Result<(), StoreError>;

    /// Waits for and takes the turn lock of `id`.
    async fn lock(&self, id: &SessionId) -> TurnGuard;
}

/// Process-lifetime store; sessions are never evicted.
#[derive(Debug, Default)]
pub struct InMemoryPositionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
    turn_locks: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl InMemoryPositionStore {
    /// Creates an empty store.
    #[instrument]
    pub fn new() -> Self {
        info!("Creating in-memory position store");
        Self::default()
    }

    /// Number of sessions held.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// True when no session exists.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl PositionStore for InMemoryPositionStore {
    #[instrument(skip(self))]
    async fn create(&self) -> Result<Session, StoreError> {
        let mut sessions = self.sessions.write().await;
        let mut id = SessionId::generate();
        while sessions.contains_key(&id) {
            id = SessionId::generate();
        }
        let session = Session::new(id.clone(), BoardState::start());
        sessions.insert(id.clone(), session.clone());
        info!(session_id = %id, "Created session");
        Ok(session)
    }

    #[instrument(skip_all, fields(session_id = %id))]
    async fn get(&self, id: &SessionId) -> Result<Session, StoreError> {
        self.sessions.read().await.get(id).cloned().ok_or_else(|| {
            debug!("Session not found");
            StoreError::new(StoreErrorKind::NotFound, format!("No session {}", id))
        })
    }

    #[instrument(skip_all, fields(session_id = %id, notation = %record.notation()))]
    async fn update(
        &self,
        id: &SessionId,
        position: BoardState,
        record: MoveRecord,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(session) => {
                session.record(record);
                session.position = position;
                debug!(moves = session.move_log.len(), fen = %session.position, "Session updated");
            }
            None => {
                info!("Creating session on update");
                let mut session = Session::resumed(id.clone(), record);
                session.position = position;
                sessions.insert(id.clone(), session);
            }
        }
        Ok(())
    }

    #[instrument(skip_all, fields(session_id = %id, records = records.len()))]
    async fn record_turn(&self, id: &SessionId, records: Vec<MoveRecord>) -> Result<(), StoreError> {
        let mut records = records.into_iter();
        let Some(first) = records.next() else {
            return Err(StoreError::new(StoreErrorKind::EmptyTurn, format!("No moves to record for {}", id)));
        };

        let mut sessions = self.sessions.write().await;
        let session = match sessions.entry(id.clone()) {
            Entry::Occupied(entry) => {
                let session = entry.into_mut();
                session.record(first);
                session
            }
            Entry::Vacant(entry) => {
                info!("Creating session on turn commit");
                entry.insert(Session::resumed(id.clone(), first))
            }
        };
        records.for_each(|record| session.record(record));
        debug!(moves = session.move_log.len(), fen = %session.position, "Turn recorded");
        Ok(())
    }

    #[instrument(skip_all, fields(session_id = %id))]
    async fn lock(&self, id: &SessionId) -> TurnGuard {
        let lock = {
            let mut locks = self.turn_locks.lock().await;
            locks.entry(id.clone()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        debug!("Turn lock acquired");
        guard
    }
}

/// Category of a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StoreErrorKind {
    /// No session under the given id.
    #[display("not found")]
    NotFound,
    /// A turn was committed without any move.
    #[display("empty turn")]
    EmptyTurn,
}

/// Position store error with location tracking.
#[derive(Debug, Clone, Display, Error, Getters)]
#[display("Store error ({}): {} at {}:{}", kind, message, file, line)]
pub struct StoreError {
    /// Error category.
    kind: StoreErrorKind,
    /// Error message.
    message: String,
    /// Line number where error occurred.
    line: u32,
    /// Source file where error occurred.
    file: &'static str,
}

impl StoreError {
    /// Creates a new store error.
    #[track_caller]
    pub fn new(kind: StoreErrorKind, message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
