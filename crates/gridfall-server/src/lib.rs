//! Realtime Connect-Four server: connection registry, matchmaking,
//! per-lobby broadcasting, and WebSocket session pumps.
//!
//! One task tree per concern: sessions run their own read/write pumps
//! and a coordinator, one matchmaking coordinator pairs players, and
//! each active lobby is an actor owning its game. Components only talk
//! through bounded channels and the shared registry/index, so there is
//! no lock ordering to get wrong.

#![deny(unsafe_code)]

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub mod config;
pub mod lobby;
pub mod matchmaker;
pub mod net;
pub mod registry;
pub mod session;
pub mod store;
pub mod testutil;

use config::Settings;
use lobby::{LobbyDeps, LobbyIndex};
use matchmaker::Matchmaker;
use registry::Registry;
use session::SessionContext;
use store::GameStore;

/// The wired-up server: shared state plus the running matchmaking
/// coordinator.
pub struct App {
    settings: Settings,
    registry: Arc<Registry>,
    lobbies: Arc<LobbyIndex>,
    matchmaker: Matchmaker,
    shutdown: CancellationToken,
}

impl App {
    /// Wire the shared state and start the matchmaking coordinator.
    ///
    /// Must run inside a tokio runtime.
    pub fn new(settings: Settings, store: Arc<dyn GameStore>) -> Self {
        let registry = Arc::new(Registry::new(settings.session.outbound_capacity));
        let lobbies = Arc::new(LobbyIndex::default());
        let shutdown = CancellationToken::new();
        let matchmaker = Matchmaker::spawn(
            settings.matchmaking.admission_capacity,
            LobbyDeps {
                registry: Arc::clone(&registry),
                index: Arc::clone(&lobbies),
                store,
                pacing: settings.pacing(),
                shutdown: shutdown.clone(),
            },
        );
        Self {
            settings,
            registry,
            lobbies,
            matchmaker,
            shutdown,
        }
    }

    /// The context a session coordinator runs with.
    pub fn session_context(&self) -> SessionContext {
        SessionContext {
            registry: Arc::clone(&self.registry),
            lobbies: Arc::clone(&self.lobbies),
            matchmaker: self.matchmaker.clone(),
            write_timeout: self.settings.write_timeout(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The active lobby index.
    pub fn lobbies(&self) -> &Arc<LobbyIndex> {
        &self.lobbies
    }

    /// The loaded settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Signal that stops every coordinator, lobby, and pump.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
