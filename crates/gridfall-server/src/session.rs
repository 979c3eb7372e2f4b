//! Per-connection I/O pumps and the session coordinator.
//!
//! Every connection runs three tasks: a **read pump** decoding inbound
//! envelopes, a **write pump** draining the outbound queue under a
//! fixed per-write deadline, and the **coordinator** ([`drive`]) that
//! joins the registry, waits for a lobby assignment, and dispatches
//! intents. The pumps never block each other: matchmaking
//! notifications, move processing, and transport writes all proceed
//! independently through their queues.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gridfall_protocol::envelope::CODE_UNSUPPORTED_DATA;
use gridfall_protocol::payload::{
    ChatText, ErrorPayload, FoundGame, PlayMove, TYPE_CHAT, TYPE_ERROR, TYPE_FOUND_GAME,
    TYPE_PLAY_MOVE, TYPE_WAITING_FOR_GAME, WaitingForGame,
};
use gridfall_protocol::{Envelope, PlayerId, ProtocolError, VERSION};

use crate::lobby::{LobbyHandle, LobbyIndex};
use crate::matchmaker::Matchmaker;
use crate::registry::{Registry, Session, SessionHandle};

/// Transport failures. Fatal to the session: the pump exits and the
/// coordinator tears the session down.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The peer closed the connection.
    #[error("connection closed")]
    Closed,
    /// A single write exceeded the fixed deadline.
    #[error("write timed out")]
    Timeout,
    /// Underlying I/O failure.
    #[error("transport failure: {0}")]
    Io(String),
}

/// Receiving half of a session transport.
#[async_trait]
pub trait FrameStream: Send {
    /// The next text frame, or [`TransportError::Closed`] at end of
    /// stream.
    async fn next_frame(&mut self) -> Result<String, TransportError>;
}

/// Sending half of a session transport.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one text frame.
    async fn send_frame(&mut self, text: String) -> Result<(), TransportError>;
}

/// One event queued for the write pump, which wraps it into a v1
/// envelope at write time.
#[derive(Clone, Debug, PartialEq)]
pub struct Outbound {
    /// Envelope type tag.
    pub kind: String,
    /// Serialized payload.
    pub payload: Value,
}

impl Outbound {
    /// Queue entry for `kind` with the given payload.
    pub fn new<T: Serialize>(kind: &str, payload: &T) -> Self {
        Self {
            kind: kind.to_string(),
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
        }
    }
}

/// Outcome of one read-pump iteration.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A well-formed envelope.
    Frame(Envelope),
    /// A malformed envelope; the raw frame is kept for the `error`
    /// event. The pump keeps reading.
    Protocol {
        /// What was wrong with it.
        error: ProtocolError,
        /// The offending frame, verbatim.
        raw: String,
    },
    /// The transport failed; the pump has exited.
    Transport(TransportError),
}

/// Continuously decode inbound frames into [`ReadOutcome`]s.
///
/// A malformed envelope is reported and reading continues; a transport
/// error is reported and the pump exits.
pub async fn read_pump<R: FrameStream>(
    mut reader: R,
    results: mpsc::Sender<ReadOutcome>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            frame = reader.next_frame() => match frame {
                Ok(text) => {
                    let outcome = match Envelope::decode(&text) {
                        Ok(envelope) => ReadOutcome::Frame(envelope),
                        Err(error) => {
                            counter!("session_protocol_errors_total").increment(1);
                            ReadOutcome::Protocol { error, raw: text }
                        }
                    };
                    if results.send(outcome).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let _ = results.send(ReadOutcome::Transport(e)).await;
                    return;
                }
            }
        }
    }
}

/// Continuously drain the outbound queue, wrapping each request into a
/// v1 envelope and writing it under `write_timeout`. Exits on the
/// first failed write or when the queue closes.
///
/// Cancellation does not drop frames that were queued before it: a
/// lobby's terminal sequence queues `gameOver` and then raises the
/// disconnect signal, so the pump flushes the queue before exiting.
pub async fn write_pump<W: FrameSink>(
    mut writer: W,
    mut requests: mpsc::Receiver<Outbound>,
    results: mpsc::Sender<Result<(), TransportError>>,
    write_timeout: std::time::Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                // Stop accepting new requests, write out what is
                // already queued, then exit.
                requests.close();
                while let Some(request) = requests.recv().await {
                    if write_one(&mut writer, request, write_timeout).await.is_err() {
                        return;
                    }
                }
                return;
            }
            request = requests.recv() => {
                let Some(request) = request else { return };
                let outcome = write_one(&mut writer, request, write_timeout).await;
                let failed = outcome.is_err();
                if results.send(outcome).await.is_err() || failed {
                    return;
                }
            }
        }
    }
}

async fn write_one<W: FrameSink>(
    writer: &mut W,
    request: Outbound,
    write_timeout: std::time::Duration,
) -> Result<(), TransportError> {
    let envelope = Envelope {
        version: VERSION.to_string(),
        kind: request.kind,
        payload: request.payload,
    };
    match tokio::time::timeout(write_timeout, writer.send_frame(envelope.encode())).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout),
    }
}

/// Everything a live connection needs from the rest of the server.
#[derive(Clone)]
pub struct SessionContext {
    /// Connection registry.
    pub registry: Arc<Registry>,
    /// Active lobby index.
    pub lobbies: Arc<LobbyIndex>,
    /// Matchmaking front door.
    pub matchmaker: Matchmaker,
    /// Fixed deadline for one transport write.
    pub write_timeout: std::time::Duration,
    /// Server-wide shutdown signal.
    pub shutdown: CancellationToken,
}

/// Run one session from connect to teardown.
///
/// Joins the registry (replacing any stale entry for the identity),
/// spawns the pumps, enqueues for matchmaking, forwards the lobby
/// snapshot once assigned, then dispatches inbound intents until the
/// transport fails, the lobby signals disconnect, or the server shuts
/// down. Always leaves the registry on the way out.
pub async fn drive<R, W>(ctx: SessionContext, player: PlayerId, reader: R, writer: W)
where
    R: FrameStream + 'static,
    W: FrameSink + 'static,
{
    info!(%player, "session connected");
    let SessionHandle {
        session,
        mut notify_rx,
        outbound_rx,
    } = ctx.registry.join(player).await;
    let disconnect = session.disconnect_token();

    let (read_tx, mut read_rx) = mpsc::channel(1);
    let read_task = tokio::spawn(read_pump(reader, read_tx, disconnect.clone()));
    let (write_result_tx, mut write_rx) = mpsc::channel(1);
    let write_task = tokio::spawn(write_pump(
        writer,
        outbound_rx,
        write_result_tx,
        ctx.write_timeout,
        disconnect.clone(),
    ));

    let _ = session
        .deliver(Outbound::new(TYPE_WAITING_FOR_GAME, &WaitingForGame {}))
        .await;
    if !ctx.matchmaker.enqueue(player).await {
        warn!(%player, "admission queue unavailable");
    }

    // Phase 1: wait for the lobby assignment while keeping the pumps
    // serviced.
    let lobby = 'find: {
        loop {
            tokio::select! {
                () = ctx.shutdown.cancelled() => break 'find None,
                () = disconnect.cancelled() => break 'find None,
                assigned = notify_rx.recv() => {
                    let Some(lobby_id) = assigned else { break 'find None };
                    let Some(lobby) = ctx.lobbies.get(lobby_id).await else {
                        warn!(%player, %lobby_id, "assigned lobby vanished before join");
                        break 'find None;
                    };
                    let Some(snapshot) = lobby.snapshot(player).await else {
                        warn!(%player, %lobby_id, "lobby has no slot for player");
                        break 'find None;
                    };
                    let found = FoundGame {
                        lobby_id,
                        state: snapshot.state,
                        last_played: snapshot.last_played,
                        messages: snapshot.messages,
                        color: snapshot.color,
                    };
                    let _ = session.deliver(Outbound::new(TYPE_FOUND_GAME, &found)).await;
                    info!(%player, %lobby_id, color = %snapshot.color, "joined lobby");
                    break 'find Some(lobby);
                }
                outcome = read_rx.recv() => match outcome {
                    None | Some(ReadOutcome::Transport(_)) => break 'find None,
                    Some(ReadOutcome::Frame(envelope)) => {
                        // Not in a lobby yet; log and drop.
                        debug!(%player, kind = %envelope.kind, "inbound frame before lobby assignment");
                    }
                    Some(ReadOutcome::Protocol { error, raw }) => {
                        send_error(&session, error.code(), error.to_string(), Value::String(raw)).await;
                    }
                },
                result = write_rx.recv() => {
                    if !matches!(result, Some(Ok(()))) { break 'find None; }
                }
            }
        }
    };

    // Phase 2: in-lobby dispatch loop.
    if let Some(lobby) = lobby {
        loop {
            tokio::select! {
                () = ctx.shutdown.cancelled() => break,
                () = disconnect.cancelled() => break,
                outcome = read_rx.recv() => match outcome {
                    None => break,
                    Some(ReadOutcome::Frame(envelope)) => {
                        dispatch(&session, &lobby, player, envelope).await;
                    }
                    Some(ReadOutcome::Protocol { error, raw }) => {
                        send_error(&session, error.code(), error.to_string(), Value::String(raw)).await;
                    }
                    Some(ReadOutcome::Transport(e)) => {
                        debug!(%player, error = %e, "transport failed");
                        break;
                    }
                },
                result = write_rx.recv() => {
                    if !matches!(result, Some(Ok(()))) { break; }
                }
            }
        }
    }

    session.signal_disconnect();
    ctx.registry.release(player, &session).await;
    let _ = tokio::join!(read_task, write_task);
    info!(%player, "session closed");
}

/// Route one well-formed inbound envelope.
async fn dispatch(session: &Arc<Session>, lobby: &LobbyHandle, player: PlayerId, env: Envelope) {
    match env.kind.as_str() {
        TYPE_CHAT => match env.parse_payload::<ChatText>() {
            Ok(chat) => {
                if !lobby.submit_chat(player, chat.text).await {
                    debug!(%player, lobby = %lobby.id(), "chat submitted to closed lobby");
                }
            }
            Err(e) => send_error(session, e.code(), e.to_string(), raw_of(&env)).await,
        },
        TYPE_PLAY_MOVE => match env.parse_payload::<PlayMove>() {
            Ok(mv) => match lobby.submit_move(player, mv.column).await {
                Some(Ok(_)) => {} // fan-out is the lobby actor's job
                Some(Err(rule)) => {
                    send_error(session, CODE_UNSUPPORTED_DATA, rule.to_string(), raw_of(&env))
                        .await;
                }
                None => debug!(%player, lobby = %lobby.id(), "move submitted to closed lobby"),
            },
            Err(e) => send_error(session, e.code(), e.to_string(), raw_of(&env)).await,
        },
        other => {
            send_error(
                session,
                CODE_UNSUPPORTED_DATA,
                format!("unknown message type '{other}'"),
                raw_of(&env),
            )
            .await;
        }
    }
}

async fn send_error(session: &Session, code: u16, err: String, problematic: Value) {
    let payload = ErrorPayload {
        code,
        err,
        problematic_msg: problematic,
    };
    let _ = session.deliver(Outbound::new(TYPE_ERROR, &payload)).await;
}

fn raw_of(env: &Envelope) -> Value {
    serde_json::to_value(env).unwrap_or(Value::Null)
}
