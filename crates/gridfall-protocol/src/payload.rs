//! Payload types, one per recognized envelope kind.
//!
//! Outbound kinds: `waitingForGame`, `foundGame`, `chatMessage`,
//! `playedMove`, `gameOver`, `error`. Inbound kinds: `chatMessage`,
//! `playMove`. Anything else inbound earns an `error` event with
//! [`crate::envelope::CODE_UNSUPPORTED_DATA`].

use gridfall_engine::{Board, Color};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::LobbyId;

/// Outbound: the session is queued for matchmaking.
pub const TYPE_WAITING_FOR_GAME: &str = "waitingForGame";
/// Outbound: a lobby was assigned; carries the joining snapshot.
pub const TYPE_FOUND_GAME: &str = "foundGame";
/// Both directions: a chat line.
pub const TYPE_CHAT: &str = "chatMessage";
/// Inbound: drop a piece into a column.
pub const TYPE_PLAY_MOVE: &str = "playMove";
/// Outbound: an accepted move, fanned out to both players.
pub const TYPE_PLAYED_MOVE: &str = "playedMove";
/// Outbound: terminal event; `winner` is null on a draw.
pub const TYPE_GAME_OVER: &str = "gameOver";
/// Outbound: protocol or rule violation, connection stays open.
pub const TYPE_ERROR: &str = "error";

/// `waitingForGame` payload (empty).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingForGame {}

/// `foundGame` payload: everything a client needs to render the game
/// it just joined (or rejoined).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundGame {
    /// The assigned lobby.
    pub lobby_id: LobbyId,
    /// Current board.
    pub state: Board,
    /// Color of the most recent move, `None` before the first.
    pub last_played: Option<Color>,
    /// Chat history so far, in broadcast order.
    pub messages: Vec<ChatMessage>,
    /// The color assigned to this player.
    pub color: Color,
}

/// `chatMessage` payload as fanned out to both players.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Sender identity (player id string).
    pub from: String,
    /// Message text.
    pub text: String,
}

/// Inbound `chatMessage` payload: the sender is implied by the session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatText {
    /// Message text.
    pub text: String,
}

/// Inbound `playMove` payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayMove {
    /// Target column, 0-based.
    pub column: u8,
}

/// `playedMove` payload: an accepted move with its landing row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayedMove {
    /// Color that played.
    pub color: Color,
    /// Landing row under gravity.
    pub row: u8,
    /// Column played.
    pub column: u8,
}

/// `gameOver` payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOver {
    /// Winning color, or `None` on a draw.
    pub winner: Option<Color>,
}

/// `error` payload: the violation plus the offending message, so the
/// client can correlate without guessing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Status code (`1007` invalid payload, `1003` unsupported data).
    pub code: u16,
    /// Human-readable diagnostic.
    pub err: String,
    /// The message that triggered the error, verbatim where possible.
    #[serde(rename = "problematicMsg")]
    pub problematic_msg: Value,
}
