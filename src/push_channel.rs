//! Progress push channel: a WebSocket the backend streams progress frames on.
//!
//! The orchestrator only reads from the channel; it never sends frames.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::config::Config;
use crate::types::UpdateError;

/// Opens push channel connections.
#[async_trait]
pub trait PushConnector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn PushStream>, UpdateError>;
}

/// An open push channel.
#[async_trait]
pub trait PushStream: Send {
    /// Next text frame. `None` once the peer has closed the connection.
    async fn next_frame(&mut self) -> Option<Result<String, UpdateError>>;

    /// Close the connection from our side.
    async fn close(&mut self);
}

pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.push_url())
    }
}

#[async_trait]
impl PushConnector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn PushStream>, UpdateError> {
        let (socket, _response) = connect_async(self.url.as_str()).await?;
        info!(url = %self.url, "Update push channel connected");
        Ok(Box::new(WsStream { socket }))
    }
}

struct WsStream {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushStream for WsStream {
    async fn next_frame(&mut self) -> Option<Result<String, UpdateError>> {
        loop {
            match self.socket.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(String::from_utf8(bytes).map_err(|err| {
                        UpdateError::Backend(format!("binary frame is not utf-8: {err}"))
                    }))
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Push channel closed by backend");
                    return None;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Err(err) => return Some(Err(err.into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(err) = self.socket.close(None).await {
            debug!(error = ?err, "Push channel close handshake failed");
        }
    }
}
