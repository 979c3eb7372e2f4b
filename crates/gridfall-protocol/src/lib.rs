//! # gridfall-protocol
//!
//! Shared vocabulary for the Gridfall service:
//!
//! - **Branded IDs**: [`ids::PlayerId`], [`ids::LobbyId`], [`ids::GameId`]
//!   as UUID v7 newtypes
//! - **Envelope**: the versioned `{version, type, payload}` wire unit
//!   crossing the WebSocket in both directions, with strict decode
//!   validation ([`envelope::Envelope`])
//! - **Payloads**: one struct per recognized envelope kind
//!   ([`payload`]), serialized camelCase for wire compatibility
//!
//! A malformed inbound envelope is a recoverable [`envelope::ProtocolError`],
//! never a transport failure: the server answers with an `error` event
//! and keeps the connection open.

#![deny(unsafe_code)]

pub mod envelope;
pub mod ids;
pub mod payload;

pub use envelope::{Envelope, ProtocolError, VERSION};
pub use ids::{GameId, LobbyId, PlayerId};
