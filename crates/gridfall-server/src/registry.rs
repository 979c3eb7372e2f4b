//! Connection registry: player identity → live session.
//!
//! The registry is the sole owner of session entries. A lobby never
//! holds a session, only the player id it looks up here at fan-out
//! time, so teardown responsibility stays in one place.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::gauge;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use gridfall_protocol::{LobbyId, PlayerId};

use crate::session::Outbound;

/// One live connection: identity, notification slot, outbound queue,
/// and disconnect signal.
///
/// The registry and (indirectly) lobby actors hold the sending halves;
/// the connection's own tasks hold the receivers, so dropping them on
/// teardown closes the queues and any writer observes a closed channel
/// instead of blocking forever.
pub struct Session {
    player: PlayerId,
    /// Capacity-1 slot for the assigned lobby id. Fulfilled at most
    /// once per assignment; an already-full slot means the player was
    /// already notified.
    notify_tx: mpsc::Sender<LobbyId>,
    /// Bounded outbound queue. A slow consumer exerts backpressure on
    /// fan-out to this player only.
    outbound_tx: mpsc::Sender<Outbound>,
    disconnect: CancellationToken,
}

impl Session {
    /// The player identity attached to this connection.
    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// Put a lobby assignment into the notification slot.
    ///
    /// Returns `false` when the slot is already fulfilled or the
    /// session is being torn down — both mean there is nothing to do.
    pub fn notify(&self, lobby_id: LobbyId) -> bool {
        self.notify_tx.try_send(lobby_id).is_ok()
    }

    /// Queue an outbound event, waiting if the player is slow.
    ///
    /// Returns `false` when the session's queues are gone.
    pub async fn deliver(&self, event: Outbound) -> bool {
        self.outbound_tx.send(event).await.is_ok()
    }

    /// Raise the disconnect signal, waking the session's pumps.
    pub fn signal_disconnect(&self) {
        self.disconnect.cancel();
    }

    /// The disconnect signal, for `select!` arms.
    pub fn disconnect_token(&self) -> CancellationToken {
        self.disconnect.clone()
    }
}

/// A freshly joined session: the shared entry plus the receiving
/// halves, which belong to the connection's tasks alone.
pub struct SessionHandle {
    /// The registry entry, shared with fan-out paths.
    pub session: Arc<Session>,
    /// Receiver for the lobby-assignment slot.
    pub notify_rx: mpsc::Receiver<LobbyId>,
    /// Receiver the write pump drains.
    pub outbound_rx: mpsc::Receiver<Outbound>,
}

/// Identity → session index. Reads (fan-out lookups) vastly outnumber
/// join/leave, hence the read-write lock.
pub struct Registry {
    connections: RwLock<HashMap<PlayerId, Arc<Session>>>,
    outbound_capacity: usize,
}

impl Registry {
    /// A registry whose sessions get outbound queues of the given
    /// capacity.
    pub fn new(outbound_capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            outbound_capacity: outbound_capacity.max(1),
        }
    }

    /// Register a session for `player`, replacing any stale entry
    /// (last writer wins). The stale session is signalled to
    /// disconnect.
    pub async fn join(&self, player: PlayerId) -> SessionHandle {
        let (notify_tx, notify_rx) = mpsc::channel(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(self.outbound_capacity);
        let session = Arc::new(Session {
            player,
            notify_tx,
            outbound_tx,
            disconnect: CancellationToken::new(),
        });
        let mut connections = self.connections.write().await;
        if let Some(stale) = connections.insert(player, Arc::clone(&session)) {
            warn!(%player, "replacing stale session");
            stale.signal_disconnect();
        }
        gauge!("connections_active").set(connections.len() as f64);
        SessionHandle {
            session,
            notify_rx,
            outbound_rx,
        }
    }

    /// Remove the session for `player` and signal it to disconnect.
    pub async fn leave(&self, player: PlayerId) {
        let mut connections = self.connections.write().await;
        if let Some(session) = connections.remove(&player) {
            session.signal_disconnect();
            debug!(%player, "session left");
        }
        gauge!("connections_active").set(connections.len() as f64);
    }

    /// Remove `player`'s entry only if it is still `session`.
    ///
    /// Session teardown uses this instead of [`leave`](Self::leave) so
    /// a coordinator winding down after a last-writer-wins replacement
    /// does not evict its successor.
    pub async fn release(&self, player: PlayerId, session: &Arc<Session>) {
        let mut connections = self.connections.write().await;
        if connections
            .get(&player)
            .is_some_and(|current| Arc::ptr_eq(current, session))
        {
            let _ = connections.remove(&player);
        }
        gauge!("connections_active").set(connections.len() as f64);
    }

    /// The live session for `player`, if any.
    pub async fn lookup(&self, player: PlayerId) -> Option<Arc<Session>> {
        self.connections.read().await.get(&player).cloned()
    }

    /// Number of live sessions.
    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_then_lookup_then_leave() {
        let registry = Registry::new(8);
        let player = PlayerId::generate();
        let handle = registry.join(player).await;
        assert_eq!(registry.count().await, 1);
        let session = registry.lookup(player).await.unwrap();
        assert_eq!(session.player(), player);
        assert!(Arc::ptr_eq(&session, &handle.session));

        registry.leave(player).await;
        assert!(registry.lookup(player).await.is_none());
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn join_replaces_stale_entry_and_disconnects_it() {
        let registry = Registry::new(8);
        let player = PlayerId::generate();
        let stale = registry.join(player).await;
        let fresh = registry.join(player).await;

        assert_eq!(registry.count().await, 1);
        assert!(stale.session.disconnect_token().is_cancelled());
        assert!(!fresh.session.disconnect_token().is_cancelled());
        let current = registry.lookup(player).await.unwrap();
        assert!(Arc::ptr_eq(&current, &fresh.session));
    }

    #[tokio::test]
    async fn release_ignores_replaced_sessions() {
        let registry = Registry::new(8);
        let player = PlayerId::generate();
        let old = registry.join(player).await;
        let new = registry.join(player).await;

        // The old coordinator winding down must not evict the new entry.
        registry.release(player, &old.session).await;
        assert_eq!(registry.count().await, 1);
        registry.release(player, &new.session).await;
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn leave_signals_disconnect_and_closes_queues() {
        let registry = Registry::new(8);
        let player = PlayerId::generate();
        let mut handle = registry.join(player).await;
        let session = registry.lookup(player).await.unwrap();

        registry.leave(player).await;
        assert!(session.disconnect_token().is_cancelled());

        // Receivers dropped by the (simulated) connection teardown make
        // later deliveries observe a closed queue instead of blocking.
        handle.outbound_rx.close();
        assert!(
            !session
                .deliver(Outbound::new("waitingForGame", &serde_json::json!({})))
                .await
        );
    }

    #[tokio::test]
    async fn notification_slot_is_fulfilled_at_most_once() {
        let registry = Registry::new(8);
        let player = PlayerId::generate();
        let mut handle = registry.join(player).await;
        let lobby_a = LobbyId::generate();
        let lobby_b = LobbyId::generate();

        assert!(handle.session.notify(lobby_a));
        // Second fulfilment is refused while the first sits unread.
        assert!(!handle.session.notify(lobby_b));
        assert_eq!(handle.notify_rx.recv().await, Some(lobby_a));
        // Consumed: the slot is free for a later reassignment.
        assert!(handle.session.notify(lobby_b));
    }

    #[tokio::test]
    async fn deliver_applies_backpressure_until_drained() {
        let registry = Registry::new(1);
        let player = PlayerId::generate();
        let mut handle = registry.join(player).await;
        let session = Arc::clone(&handle.session);

        assert!(session.deliver(Outbound::new("a", &())).await);
        // Queue full: the next deliver parks until the consumer reads.
        let pending = tokio::spawn(async move { session.deliver(Outbound::new("b", &())).await });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        assert_eq!(handle.outbound_rx.recv().await.unwrap().kind, "a");
        assert!(pending.await.unwrap());
        assert_eq!(handle.outbound_rx.recv().await.unwrap().kind, "b");
    }
}
