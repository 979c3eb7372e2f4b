//! The lobby actor: one task per active lobby owning game state, chat
//! history, and the outbound event order.
//!
//! All mutation funnels through the actor's command queue, so both
//! players observe chat and move events in one identical total order —
//! the core correctness property of the design. Nothing else ever
//! writes this lobby's events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gridfall_engine::{Applied, Board, Color, Game, GameError, Move};
use gridfall_protocol::payload::{
    ChatMessage, GameOver, PlayedMove, TYPE_CHAT, TYPE_GAME_OVER, TYPE_PLAYED_MOVE,
};
use gridfall_protocol::{GameId, LobbyId, PlayerId};

use crate::registry::Registry;
use crate::session::Outbound;
use crate::store::{FinishedGame, GameStore};

/// Command queue depth per lobby.
const COMMAND_QUEUE_CAPACITY: usize = 32;

/// What a player needs to render the lobby it just joined.
#[derive(Clone, Debug)]
pub struct LobbySnapshot {
    /// Current board.
    pub state: Board,
    /// Color of the most recent move, if any.
    pub last_played: Option<Color>,
    /// Chat history in broadcast order.
    pub messages: Vec<ChatMessage>,
    /// The asking player's assigned color.
    pub color: Color,
}

/// Requests funnelled into the lobby actor.
enum LobbyCommand {
    Chat {
        from: PlayerId,
        text: String,
    },
    Move {
        player: PlayerId,
        column: u8,
        reply: oneshot::Sender<Result<Applied, GameError>>,
    },
    Snapshot {
        player: PlayerId,
        reply: oneshot::Sender<Option<LobbySnapshot>>,
    },
}

/// Cheap handle to a running lobby actor.
#[derive(Clone)]
pub struct LobbyHandle {
    id: LobbyId,
    players: Arc<[(PlayerId, Color); 2]>,
    tx: mpsc::Sender<LobbyCommand>,
}

impl LobbyHandle {
    /// The lobby id.
    pub fn id(&self) -> LobbyId {
        self.id
    }

    /// Whether `player` has a seat here.
    pub fn contains(&self, player: PlayerId) -> bool {
        self.players.iter().any(|(p, _)| *p == player)
    }

    /// The color assigned to `player`, if seated.
    pub fn color_of(&self, player: PlayerId) -> Option<Color> {
        self.players
            .iter()
            .find(|(p, _)| *p == player)
            .map(|(_, color)| *color)
    }

    /// Submit a chat line. Returns `false` if the lobby is gone.
    pub async fn submit_chat(&self, from: PlayerId, text: String) -> bool {
        self.tx
            .send(LobbyCommand::Chat { from, text })
            .await
            .is_ok()
    }

    /// Submit a move and wait for the engine's verdict.
    ///
    /// `None` means the lobby is gone. Accepted moves are fanned out
    /// by the actor; rule errors are returned here so the coordinator
    /// can answer the submitting player alone.
    pub async fn submit_move(
        &self,
        player: PlayerId,
        column: u8,
    ) -> Option<Result<Applied, GameError>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(LobbyCommand::Move {
                player,
                column,
                reply: reply_tx,
            })
            .await
            .ok()?;
        reply_rx.await.ok()
    }

    /// Fetch the joining snapshot for `player`.
    pub async fn snapshot(&self, player: PlayerId) -> Option<LobbySnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(LobbyCommand::Snapshot {
                player,
                reply: reply_tx,
            })
            .await
            .ok()?;
        reply_rx.await.ok().flatten()
    }
}

/// Active-lobby index. Written by the matchmaking coordinator and the
/// finishing actor, read by everyone routing intents.
#[derive(Default)]
pub struct LobbyIndex {
    lobbies: RwLock<HashMap<LobbyId, LobbyHandle>>,
}

impl LobbyIndex {
    /// Register an active lobby.
    pub async fn insert(&self, handle: LobbyHandle) {
        let mut lobbies = self.lobbies.write().await;
        let _ = lobbies.insert(handle.id(), handle);
        gauge!("lobbies_active").set(lobbies.len() as f64);
    }

    /// Drop a finished lobby.
    pub async fn remove(&self, id: LobbyId) {
        let mut lobbies = self.lobbies.write().await;
        let _ = lobbies.remove(&id);
        gauge!("lobbies_active").set(lobbies.len() as f64);
    }

    /// Handle for an active lobby.
    pub async fn get(&self, id: LobbyId) -> Option<LobbyHandle> {
        self.lobbies.read().await.get(&id).cloned()
    }

    /// The active lobby holding `player`, if any. Serves the
    /// reconnection redirect in matchmaking.
    pub async fn find_player(&self, player: PlayerId) -> Option<LobbyHandle> {
        self.lobbies
            .read()
            .await
            .values()
            .find(|handle| handle.contains(player))
            .cloned()
    }

    /// Number of active lobbies.
    pub async fn count(&self) -> usize {
        self.lobbies.read().await.len()
    }
}

/// Shared collaborators a lobby actor needs.
#[derive(Clone)]
pub struct LobbyDeps {
    /// Connection registry for fan-out lookups.
    pub registry: Arc<Registry>,
    /// Index the actor removes itself from on game over.
    pub index: Arc<LobbyIndex>,
    /// Finished-game sink.
    pub store: Arc<dyn GameStore>,
    /// Inter-write pacing between the two fan-out deliveries.
    pub pacing: Duration,
    /// Server-wide shutdown signal.
    pub shutdown: CancellationToken,
}

/// Start the actor for a freshly filled lobby and return its handle.
///
/// The caller (matchmaking coordinator) still owns insertion into the
/// index and the player notifications.
pub fn spawn(
    id: LobbyId,
    game_id: GameId,
    players: [(PlayerId, Color); 2],
    created_at: DateTime<Utc>,
    deps: LobbyDeps,
) -> LobbyHandle {
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let players = Arc::new(players);
    let actor = LobbyActor {
        id,
        game_id,
        players: Arc::clone(&players),
        game: Game::new(),
        chat: Vec::new(),
        created_at,
        started_at: Utc::now(),
        deps,
        rx,
    };
    let _ = tokio::spawn(actor.run());
    LobbyHandle { id, players, tx }
}

struct LobbyActor {
    id: LobbyId,
    game_id: GameId,
    /// Both seats in admission order; fan-out iterates this order.
    players: Arc<[(PlayerId, Color); 2]>,
    game: Game,
    chat: Vec<ChatMessage>,
    created_at: DateTime<Utc>,
    started_at: DateTime<Utc>,
    deps: LobbyDeps,
    rx: mpsc::Receiver<LobbyCommand>,
}

impl LobbyActor {
    async fn run(mut self) {
        info!(lobby = %self.id, "lobby active");
        loop {
            tokio::select! {
                () = self.deps.shutdown.cancelled() => {
                    debug!(lobby = %self.id, "lobby stopped by shutdown");
                    return;
                }
                command = self.rx.recv() => {
                    let Some(command) = command else { return };
                    match command {
                        LobbyCommand::Chat { from, text } => self.handle_chat(from, text).await,
                        LobbyCommand::Move { player, column, reply } => {
                            if self.handle_move(player, column, reply).await {
                                return;
                            }
                        }
                        LobbyCommand::Snapshot { player, reply } => {
                            let _ = reply.send(self.snapshot_for(player));
                        }
                    }
                }
            }
        }
    }

    async fn handle_chat(&mut self, from: PlayerId, text: String) {
        if self.color_of(from).is_none() {
            warn!(lobby = %self.id, player = %from, "chat from player without a seat");
            return;
        }
        let message = ChatMessage {
            from: from.to_string(),
            text,
        };
        self.chat.push(message.clone());
        self.broadcast(Outbound::new(TYPE_CHAT, &message)).await;
    }

    /// Returns `true` when the game reached its terminal event and the
    /// actor must exit.
    async fn handle_move(
        &mut self,
        player: PlayerId,
        column: u8,
        reply: oneshot::Sender<Result<Applied, GameError>>,
    ) -> bool {
        let Some(color) = self.color_of(player) else {
            warn!(lobby = %self.id, %player, "move from player without a seat");
            return false;
        };
        match self.game.apply(Move { column, color }) {
            Err(e) => {
                let _ = reply.send(Err(e));
                false
            }
            Ok(applied) => {
                let _ = reply.send(Ok(applied));
                let played = PlayedMove {
                    color,
                    row: applied.row,
                    column,
                };
                self.broadcast(Outbound::new(TYPE_PLAYED_MOVE, &played)).await;
                if applied.winning {
                    self.finalize(Some(color)).await;
                    true
                } else if self.game.is_full() {
                    // The engine never declares draws; the board
                    // filling with no win is ours to call.
                    self.finalize(None).await;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn color_of(&self, player: PlayerId) -> Option<Color> {
        self.players
            .iter()
            .find(|(p, _)| *p == player)
            .map(|(_, color)| *color)
    }

    fn snapshot_for(&self, player: PlayerId) -> Option<LobbySnapshot> {
        Some(LobbySnapshot {
            state: self.game.board().clone(),
            last_played: self.game.last_color(),
            messages: self.chat.clone(),
            color: self.color_of(player)?,
        })
    }

    /// Fan an event out to both seats in fixed admission order, with a
    /// pacing delay between the two writes. Vanished or closed
    /// sessions are skipped, never retried.
    async fn broadcast(&self, event: Outbound) {
        for (i, (player, _)) in self.players.iter().enumerate() {
            if i > 0 && !self.deps.pacing.is_zero() {
                tokio::time::sleep(self.deps.pacing).await;
            }
            let Some(session) = self.deps.registry.lookup(*player).await else {
                counter!("lobby_fanout_skips_total").increment(1);
                debug!(lobby = %self.id, %player, "skipping fan-out to missing session");
                continue;
            };
            if !session.deliver(event.clone()).await {
                counter!("lobby_fanout_skips_total").increment(1);
                debug!(lobby = %self.id, %player, "skipping fan-out to closed session");
            }
        }
    }

    /// Terminal sequence: `gameOver` fan-out, disconnect both
    /// sessions, leave the index, persist best-effort.
    async fn finalize(&mut self, winner: Option<Color>) {
        info!(lobby = %self.id, winner = ?winner, "game over");
        self.broadcast(Outbound::new(TYPE_GAME_OVER, &GameOver { winner }))
            .await;
        for (player, _) in self.players.iter() {
            if let Some(session) = self.deps.registry.lookup(*player).await {
                session.signal_disconnect();
            }
        }
        self.deps.index.remove(self.id).await;

        let record = FinishedGame {
            lobby_id: self.id,
            game_id: self.game_id,
            players: [self.players[0].0, self.players[1].0],
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: Utc::now(),
            winner,
            final_state: self.game.board().render(),
        };
        let store = Arc::clone(&self.deps.store);
        let lobby_id = self.id;
        // Best-effort: a failed write never reaches the players.
        let _ = tokio::spawn(async move {
            if let Err(e) = store.persist_finished(record).await {
                warn!(lobby = %lobby_id, error = %e, "failed to persist finished game");
            }
        });
    }
}
