//! Matchmaking: the admission queue and the coordinator that pairs
//! players into lobbies.
//!
//! A single coordinator task owns the one forming lobby, so admissions
//! are serialized and seat assignment needs no locking. First seat
//! gets the opening color, second seat the other; a full lobby is
//! activated and a fresh one opened.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gridfall_engine::Color;
use gridfall_protocol::{GameId, LobbyId, PlayerId};

use crate::lobby::{self, LobbyDeps, LobbyIndex};
use crate::registry::Registry;

/// Front door to matchmaking, cloned into every session coordinator.
#[derive(Clone)]
pub struct Matchmaker {
    admission_tx: mpsc::Sender<PlayerId>,
    registry: Arc<Registry>,
    index: Arc<LobbyIndex>,
}

impl Matchmaker {
    /// Start the coordinator task and return the shared front door.
    ///
    /// `capacity` bounds the admission queue; `deps` is handed to every
    /// lobby the coordinator activates.
    pub fn spawn(capacity: usize, deps: LobbyDeps) -> Self {
        let (admission_tx, admission_rx) = mpsc::channel(capacity.max(1));
        let registry = Arc::clone(&deps.registry);
        let index = Arc::clone(&deps.index);
        let coordinator = Coordinator {
            deps,
            rx: admission_rx,
        };
        let _ = tokio::spawn(coordinator.run());
        Self {
            admission_tx,
            registry,
            index,
        }
    }

    /// Admit `player` to matchmaking.
    ///
    /// A player who already holds a seat in an active lobby is not
    /// re-queued: their notification slot is refilled with the existing
    /// lobby id so a reconnecting session lands back in its game.
    /// Returns `false` only when the coordinator is gone.
    pub async fn enqueue(&self, player: PlayerId) -> bool {
        if let Some(active) = self.index.find_player(player).await {
            debug!(%player, lobby = %active.id(), "redirecting to active lobby");
            if let Some(session) = self.registry.lookup(player).await {
                let _ = session.notify(active.id());
            }
            return true;
        }
        self.admission_tx.send(player).await.is_ok()
    }
}

/// The one lobby currently collecting players.
struct FormingLobby {
    id: LobbyId,
    game_id: GameId,
    players: Vec<(PlayerId, Color)>,
    created_at: DateTime<Utc>,
}

impl FormingLobby {
    fn open() -> Self {
        Self {
            id: LobbyId::generate(),
            game_id: GameId::generate(),
            players: Vec::with_capacity(2),
            created_at: Utc::now(),
        }
    }

    fn contains(&self, player: PlayerId) -> bool {
        self.players.iter().any(|(p, _)| *p == player)
    }

    fn admit(&mut self, player: PlayerId) {
        let color = if self.players.is_empty() {
            Color::OPENING
        } else {
            Color::OPENING.other()
        };
        self.players.push((player, color));
    }

    fn is_full(&self) -> bool {
        self.players.len() == 2
    }
}

struct Coordinator {
    deps: LobbyDeps,
    rx: mpsc::Receiver<PlayerId>,
}

impl Coordinator {
    async fn run(mut self) {
        info!("matchmaking coordinator started");
        let mut forming = FormingLobby::open();
        loop {
            tokio::select! {
                () = self.deps.shutdown.cancelled() => {
                    info!("matchmaking coordinator stopped");
                    return;
                }
                admitted = self.rx.recv() => {
                    let Some(player) = admitted else { return };
                    // Admissions from sessions that died while queued
                    // are dropped, never seated.
                    if self.deps.registry.lookup(player).await.is_none() {
                        debug!(%player, "dropping admission for dead session");
                        continue;
                    }
                    if forming.contains(player) {
                        debug!(%player, lobby = %forming.id, "already seated in forming lobby");
                        continue;
                    }
                    forming.admit(player);
                    info!(%player, lobby = %forming.id, seat = forming.players.len(), "player admitted");
                    if forming.is_full() {
                        let full = std::mem::replace(&mut forming, FormingLobby::open());
                        self.activate(full).await;
                    }
                }
            }
        }
    }

    /// Turn a full forming lobby into a running actor: spawn it, index
    /// it, then fill both players' notification slots.
    async fn activate(&self, forming: FormingLobby) {
        let FormingLobby {
            id,
            game_id,
            players,
            created_at,
        } = forming;
        let players: [(PlayerId, Color); 2] = [players[0], players[1]];
        let handle = lobby::spawn(id, game_id, players, created_at, self.deps.clone());
        self.deps.index.insert(handle).await;
        for (player, _) in players {
            let Some(session) = self.deps.registry.lookup(player).await else {
                warn!(%player, lobby = %id, "admitted player vanished before activation");
                continue;
            };
            if !session.notify(id) {
                warn!(%player, lobby = %id, "notification slot already fulfilled");
            }
        }
        info!(lobby = %id, "lobby activated");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::registry::SessionHandle;
    use crate::store::MemoryStore;

    struct Fixture {
        registry: Arc<Registry>,
        index: Arc<LobbyIndex>,
        matchmaker: Matchmaker,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(Registry::new(16));
        let index = Arc::new(LobbyIndex::default());
        let deps = LobbyDeps {
            registry: Arc::clone(&registry),
            index: Arc::clone(&index),
            store: Arc::new(MemoryStore::new()),
            pacing: Duration::ZERO,
            shutdown: CancellationToken::new(),
        };
        let matchmaker = Matchmaker::spawn(16, deps);
        Fixture {
            registry,
            index,
            matchmaker,
        }
    }

    async fn assigned_lobby(handle: &mut SessionHandle) -> LobbyId {
        tokio::time::timeout(Duration::from_secs(1), handle.notify_rx.recv())
            .await
            .expect("timed out waiting for lobby assignment")
            .expect("notification slot closed")
    }

    #[tokio::test]
    async fn pairs_in_admission_order_with_opening_color_first() {
        let fx = fixture();
        let p1 = PlayerId::generate();
        let p2 = PlayerId::generate();
        let mut h1 = fx.registry.join(p1).await;
        let mut h2 = fx.registry.join(p2).await;

        assert!(fx.matchmaker.enqueue(p1).await);
        assert!(fx.matchmaker.enqueue(p2).await);

        let lobby_a = assigned_lobby(&mut h1).await;
        let lobby_b = assigned_lobby(&mut h2).await;
        assert_eq!(lobby_a, lobby_b);

        let lobby = fx.index.get(lobby_a).await.expect("lobby indexed");
        assert_eq!(lobby.color_of(p1), Some(Color::Red));
        assert_eq!(lobby.color_of(p2), Some(Color::Yellow));
    }

    #[tokio::test]
    async fn admissions_for_dead_sessions_are_dropped() {
        let fx = fixture();
        let ghost = PlayerId::generate();
        let p1 = PlayerId::generate();
        let p2 = PlayerId::generate();
        let mut h1 = fx.registry.join(p1).await;
        let mut h2 = fx.registry.join(p2).await;

        // The ghost never joined the registry; it must not take a seat.
        assert!(fx.matchmaker.enqueue(ghost).await);
        assert!(fx.matchmaker.enqueue(p1).await);
        assert!(fx.matchmaker.enqueue(p2).await);

        let lobby_id = assigned_lobby(&mut h1).await;
        assert_eq!(assigned_lobby(&mut h2).await, lobby_id);
        let lobby = fx.index.get(lobby_id).await.unwrap();
        assert_eq!(lobby.color_of(p1), Some(Color::Red));
        assert!(lobby.color_of(ghost).is_none());
    }

    #[tokio::test]
    async fn double_admission_takes_one_seat() {
        let fx = fixture();
        let p1 = PlayerId::generate();
        let p2 = PlayerId::generate();
        let mut h1 = fx.registry.join(p1).await;
        let mut h2 = fx.registry.join(p2).await;

        assert!(fx.matchmaker.enqueue(p1).await);
        assert!(fx.matchmaker.enqueue(p1).await);
        assert!(fx.matchmaker.enqueue(p2).await);

        let lobby_id = assigned_lobby(&mut h1).await;
        assert_eq!(assigned_lobby(&mut h2).await, lobby_id);
        let lobby = fx.index.get(lobby_id).await.unwrap();
        assert_eq!(lobby.color_of(p2), Some(Color::Yellow));
    }

    #[tokio::test]
    async fn third_player_waits_for_a_fourth() {
        let fx = fixture();
        let players: Vec<PlayerId> = (0..4).map(|_| PlayerId::generate()).collect();
        let mut handles = Vec::new();
        for &p in &players {
            handles.push(fx.registry.join(p).await);
        }

        for &p in &players[..3] {
            assert!(fx.matchmaker.enqueue(p).await);
        }
        let first = assigned_lobby(&mut handles[0]).await;
        assert_eq!(assigned_lobby(&mut handles[1]).await, first);
        // The third player is alone in the next forming lobby.
        assert!(
            tokio::time::timeout(Duration::from_millis(50), handles[2].notify_rx.recv())
                .await
                .is_err()
        );

        assert!(fx.matchmaker.enqueue(players[3]).await);
        let second = assigned_lobby(&mut handles[2]).await;
        assert_eq!(assigned_lobby(&mut handles[3]).await, second);
        assert_ne!(first, second);
        assert_eq!(fx.index.count().await, 2);
    }

    #[tokio::test]
    async fn reenqueue_redirects_to_the_active_lobby() {
        let fx = fixture();
        let p1 = PlayerId::generate();
        let p2 = PlayerId::generate();
        let mut h1 = fx.registry.join(p1).await;
        let mut h2 = fx.registry.join(p2).await;

        assert!(fx.matchmaker.enqueue(p1).await);
        assert!(fx.matchmaker.enqueue(p2).await);
        let lobby_id = assigned_lobby(&mut h1).await;
        let _ = assigned_lobby(&mut h2).await;

        // A reconnecting session enqueues again and is pointed straight
        // back at its game instead of taking a new seat.
        let mut h1b = fx.registry.join(p1).await;
        assert!(fx.matchmaker.enqueue(p1).await);
        assert_eq!(assigned_lobby(&mut h1b).await, lobby_id);
        assert_eq!(fx.index.count().await, 1);
    }
}
