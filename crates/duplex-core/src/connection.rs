//! Per-connection read/dispatch/write loop.
//!
//! The loop owns its channel outright: it is the only reader and the only
//! writer, and it handles one frame completely before reading the next, so
//! responses leave in exactly the order requests arrived.
//!
//! A frame whose text equals the handshake sentinel is answered with the
//! identity reply instead of being dispatched:
//!
//! ```text
//! -> ClientKeyPlease
//! <- ClientKey:Client4242
//!    Challenge:Wibble
//! ```
//!
//! Read or write failures end the loop. It never reconnects.

use crate::config::HandshakeConfig;
use crate::dispatcher::Dispatcher;
use crate::{Result, RpcError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a frame's payload is marked on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
}

/// One message on the duplex channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn text(payload: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Text,
            payload: payload.into().into_bytes(),
        }
    }

    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: FrameKind::Binary,
            payload: payload.into(),
        }
    }

    /// Payload as text, replacing invalid UTF-8.
    pub fn as_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// A message-oriented duplex channel.
#[async_trait]
pub trait FrameChannel: Send {
    /// Wait for the next frame. `Ok(None)` means the peer closed cleanly.
    async fn read_frame(&mut self) -> Result<Option<Frame>>;

    /// Write one frame and flush it.
    async fn write_frame(&mut self, frame: Frame) -> Result<()>;
}

/// Why a connection loop stopped.
#[derive(Debug)]
pub enum CloseReason {
    PeerClosed,
    ReadFailed(RpcError),
    WriteFailed(RpcError),
}

impl CloseReason {
    pub fn is_clean(&self) -> bool {
        matches!(self, CloseReason::PeerClosed)
    }
}

/// State of one open connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    ready: bool,
    client_key: Option<String>,
    frames_handled: u64,
}

impl Session {
    /// True while the loop is reading frames.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Identity token sent in the last handshake reply.
    pub fn client_key(&self) -> Option<&str> {
        self.client_key.as_deref()
    }

    pub fn frames_handled(&self) -> u64 {
        self.frames_handled
    }
}

/// Drives one channel until it closes.
pub struct ConnectionLoop<C> {
    channel: C,
    dispatcher: Arc<Dispatcher>,
    handshake: HandshakeConfig,
    session: Session,
}

impl<C: FrameChannel> ConnectionLoop<C> {
    pub fn new(channel: C, dispatcher: Arc<Dispatcher>) -> Self {
        Self::with_handshake(channel, dispatcher, HandshakeConfig::default())
    }

    pub fn with_handshake(
        channel: C,
        dispatcher: Arc<Dispatcher>,
        handshake: HandshakeConfig,
    ) -> Self {
        Self {
            channel,
            dispatcher,
            handshake,
            session: Session::default(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run until the peer closes or a read or write fails.
    pub async fn run(&mut self) -> CloseReason {
        self.session.ready = true;
        info!("Connection open, waiting for frames");

        let reason = loop {
            let frame = match self.channel.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("Connection closed by peer");
                    break CloseReason::PeerClosed;
                }
                Err(err) => {
                    warn!("read: {}", err);
                    break CloseReason::ReadFailed(err);
                }
            };
            self.session.frames_handled += 1;

            if let Some(reply) = self.handle_frame(&frame) {
                if let Err(err) = self.channel.write_frame(reply).await {
                    warn!("write error: {}", err);
                    break CloseReason::WriteFailed(err);
                }
            }
        };

        self.session.ready = false;
        reason
    }

    /// Produce the reply for one inbound frame, if any.
    fn handle_frame(&mut self, frame: &Frame) -> Option<Frame> {
        let text = frame.as_text();
        debug!("recv: {}", text);

        if text.as_ref() == self.handshake.sentinel.as_str() {
            let key = client_key(&self.handshake);
            let reply = format!("ClientKey:{}\nChallenge:{}", key, self.handshake.challenge);
            info!("Sending client key: {}", key);
            self.session.client_key = Some(key);
            return Some(Frame::binary(reply));
        }

        let response = self.dispatcher.serve(&text);
        if response.is_empty() {
            debug!("No response for notification");
            return None;
        }
        Some(Frame::text(response.body))
    }
}

/// Session identity token derived from the process id.
pub fn client_key(handshake: &HandshakeConfig) -> String {
    format!("{}{}", handshake.key_prefix, std::process::id())
}
