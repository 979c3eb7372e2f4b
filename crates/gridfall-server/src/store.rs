//! Best-effort persistence of finished games.
//!
//! The broadcaster hands a [`FinishedGame`] record to a [`GameStore`]
//! on a detached task. A failed write is logged and never crashes the
//! broadcaster or invalidates the already-delivered result.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use gridfall_engine::Color;
use gridfall_protocol::{GameId, LobbyId, PlayerId};

/// Everything worth keeping about a completed lobby.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedGame {
    /// The lobby that hosted the game.
    pub lobby_id: LobbyId,
    /// The game's own id.
    pub game_id: GameId,
    /// Both players, in admission order (red first).
    pub players: [PlayerId; 2],
    /// When the lobby was opened by matchmaking.
    pub created_at: DateTime<Utc>,
    /// When the lobby went active.
    pub started_at: DateTime<Utc>,
    /// When the terminal event was processed.
    pub ended_at: DateTime<Utc>,
    /// Winning color, `None` on a draw.
    pub winner: Option<Color>,
    /// Final board, one text line per row.
    pub final_state: String,
}

/// Durable-store failures. Logged by the caller, never propagated to
/// players.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store rejected or could not complete the write.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Fire-and-forget sink for completed games.
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Persist one completed game record.
    async fn persist_finished(&self, game: FinishedGame) -> Result<(), StoreError>;
}

/// In-memory store: default wiring for the binary and the assertion
/// point for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    games: Mutex<Vec<FinishedGame>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record persisted so far.
    pub fn finished(&self) -> Vec<FinishedGame> {
        self.games.lock().expect("store lock poisoned").clone()
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn persist_finished(&self, game: FinishedGame) -> Result<(), StoreError> {
        self.games.lock().expect("store lock poisoned").push(game);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_accumulates_records() {
        let store = MemoryStore::new();
        let record = FinishedGame {
            lobby_id: LobbyId::generate(),
            game_id: GameId::generate(),
            players: [PlayerId::generate(), PlayerId::generate()],
            created_at: Utc::now(),
            started_at: Utc::now(),
            ended_at: Utc::now(),
            winner: Some(Color::Red),
            final_state: String::new(),
        };
        store.persist_finished(record.clone()).await.unwrap();
        assert_eq!(store.finished(), vec![record]);
    }
}
