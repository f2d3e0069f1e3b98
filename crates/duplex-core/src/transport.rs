//! WebSocket transport built on `tokio-tungstenite`.
//!
//! [`connect`] dials the configured address, optionally through an HTTP
//! proxy using `CONNECT`, and performs the WebSocket upgrade. The whole
//! sequence is bounded by the configured connect timeout. [`WsChannel`]
//! adapts the resulting stream to [`FrameChannel`].

use crate::config::{ClientConfig, TransportConfig};
use crate::connection::{Frame, FrameChannel, FrameKind};
use crate::{Result, RpcError};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info};

/// [`FrameChannel`] over a WebSocket stream.
pub struct WsChannel<S> {
    stream: WebSocketStream<S>,
}

impl<S> WsChannel<S> {
    pub fn new(stream: WebSocketStream<S>) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> WebSocketStream<S> {
        self.stream
    }
}

#[async_trait]
impl<S> FrameChannel for WsChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Frame::text(text.as_str())));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(Frame::binary(data.to_vec())));
                }
                Some(Ok(Message::Ping(data))) => {
                    self.stream.send(Message::Pong(data)).await?;
                    continue;
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn write_frame(&mut self, frame: Frame) -> Result<()> {
        let message = match frame.kind {
            FrameKind::Text => Message::text(frame.as_text().into_owned()),
            FrameKind::Binary => Message::binary(frame.payload),
        };
        self.stream.send(message).await?;
        Ok(())
    }
}

/// Dial the endpoint in `config` and complete the WebSocket upgrade.
pub async fn connect(config: &ClientConfig) -> Result<WsChannel<TcpStream>> {
    config.validate()?;
    let timeout = config.connect_timeout;

    tokio::time::timeout(timeout, establish(config))
        .await
        .map_err(|_| RpcError::HandshakeTimeout(timeout))?
}

async fn establish(config: &ClientConfig) -> Result<WsChannel<TcpStream>> {
    let url = config.url();
    info!("connecting to {}", url);

    let stream = match config.proxy_authority()? {
        Some(proxy) => {
            info!("using proxy {}", proxy);
            let mut stream = TcpStream::connect(&proxy).await?;
            open_tunnel(&mut stream, &config.addr).await?;
            stream
        }
        None => TcpStream::connect(&config.addr).await?,
    };

    let (stream, response) = tokio_tungstenite::client_async(url.as_str(), stream).await?;
    debug!("upgrade response status: {}", response.status());
    Ok(WsChannel::new(stream))
}

/// Ask an HTTP proxy to tunnel to `target` and wait for its `200` reply.
pub(crate) async fn open_tunnel<S>(stream: &mut S, target: &str) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = format!(
        "CONNECT {target} HTTP/1.1\r\nHost: {target}\r\nProxy-Connection: Keep-Alive\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    // Read byte by byte so nothing past the header block is consumed.
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= TransportConfig::MAX_PROXY_RESPONSE_BYTES {
            return Err(RpcError::transport("proxy response header too large"));
        }
        let read = stream.read(&mut byte).await?;
        if read == 0 {
            return Err(RpcError::transport("proxy closed the connection"));
        }
        head.push(byte[0]);
    }

    let head = String::from_utf8_lossy(&head);
    let status_line = head.lines().next().unwrap_or_default();
    let status = status_line.split_whitespace().nth(1).unwrap_or_default();
    if status != "200" {
        return Err(RpcError::transport(format!(
            "proxy refused tunnel: {}",
            status_line
        )));
    }
    debug!("proxy tunnel open to {}", target);
    Ok(())
}
