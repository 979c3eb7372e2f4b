//! HTTP surface: the WebSocket upgrade endpoint and its transport
//! adapters.

use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tracing::debug;

use gridfall_protocol::PlayerId;

use crate::App;
use crate::session::{self, FrameSink, FrameStream, TransportError};

/// The server's routes.
pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/play/{player_id}", any(play))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(app)
}

async fn play(
    Path(player_id): Path<String>,
    State(app): State<Arc<App>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Ok(player) = player_id.parse::<PlayerId>() else {
        debug!(%player_id, "rejecting connection with malformed player id");
        return (StatusCode::BAD_REQUEST, "invalid player id").into_response();
    };
    ws.on_upgrade(move |socket| handle_socket(app, player, socket))
}

async fn handle_socket(app: Arc<App>, player: PlayerId, socket: WebSocket) {
    let (sink, stream) = socket.split();
    session::drive(
        app.session_context(),
        player,
        WsStream { stream },
        WsSink { sink },
    )
    .await;
}

/// [`FrameStream`] over the receiving half of an upgraded socket.
/// Non-text frames are skipped; a close frame or stream end reads as
/// the peer hanging up.
struct WsStream {
    stream: SplitStream<WebSocket>,
}

#[async_trait::async_trait]
impl FrameStream for WsStream {
    async fn next_frame(&mut self) -> Result<String, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::Io(e.to_string())),
            }
        }
    }
}

/// [`FrameSink`] over the sending half of an upgraded socket.
struct WsSink {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait::async_trait]
impl FrameSink for WsSink {
    async fn send_frame(&mut self, text: String) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}
