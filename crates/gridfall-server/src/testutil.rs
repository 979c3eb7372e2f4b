//! In-memory channel transports, used by the unit tests and the
//! integration suite in place of a real socket.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::session::{FrameSink, FrameStream, TransportError};

/// A [`FrameStream`] fed from an mpsc channel. Closing the sending
/// half reads as the peer hanging up.
pub struct ChannelStream {
    rx: mpsc::Receiver<String>,
}

impl ChannelStream {
    /// Wrap a receiver of text frames.
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl FrameStream for ChannelStream {
    async fn next_frame(&mut self) -> Result<String, TransportError> {
        self.rx.recv().await.ok_or(TransportError::Closed)
    }
}

/// A [`FrameSink`] writing into an mpsc channel. A dropped receiver
/// reads as the peer hanging up.
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl ChannelSink {
    /// Wrap a sender of text frames.
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send_frame(&mut self, text: String) -> Result<(), TransportError> {
        self.tx.send(text).await.map_err(|_| TransportError::Closed)
    }
}

/// One end of a fake connection: what the test holds to speak to a
/// session driven over channel transports.
pub struct TestPeer {
    /// Feeds frames into the session's read pump.
    pub inbound_tx: mpsc::Sender<String>,
    /// Drains frames the session's write pump produced.
    pub outbound_rx: mpsc::Receiver<String>,
}

/// Build a paired channel transport: the stream/sink to hand to the
/// session, plus the [`TestPeer`] for the test side.
pub fn channel_transport(capacity: usize) -> (ChannelStream, ChannelSink, TestPeer) {
    let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
    let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
    (
        ChannelStream::new(inbound_rx),
        ChannelSink::new(outbound_tx),
        TestPeer {
            inbound_tx,
            outbound_rx,
        },
    )
}
