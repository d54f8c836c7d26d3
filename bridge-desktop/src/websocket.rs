//! Message Transport Implementation using tokio-tungstenite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    transport::MessageTransport,
};
use core_async::sync::Mutex;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket-backed duplex transport
///
/// The socket is split so a reader task can sit in `recv` while other tasks
/// send. Each half has its own lock.
pub struct WebSocketTransport {
    url: String,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketTransport {
    /// Open a connection to `url` (`ws://` or `wss://`)
    pub async fn connect(url: &str) -> Result<Self> {
        let (socket, response) = connect_async(url)
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("WebSocket connect to {url}: {e}")))?;

        info!(url, status = %response.status(), "WebSocket connected");

        let (sink, stream) = socket.split();
        Ok(Self {
            url: url.to_string(),
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Map a received frame to a text payload.
///
/// `Ok(None)` means "nothing to deliver, keep reading"; `Err(())` means the
/// peer closed the connection.
fn frame_text(message: Message) -> std::result::Result<Option<String>, ()> {
    match message {
        Message::Text(text) => Ok(Some(text)),
        Message::Binary(data) => match String::from_utf8(data) {
            Ok(text) => Ok(Some(text)),
            Err(e) => {
                warn!(error = %e, "Dropping non-UTF-8 binary frame");
                Ok(None)
            }
        },
        Message::Close(_) => Err(()),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(None),
    }
}

#[async_trait]
impl MessageTransport for WebSocketTransport {
    async fn send(&self, message: String) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(message))
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("WebSocket send: {e}")))
    }

    async fn recv(&self) -> Result<Option<String>> {
        let mut stream = self.stream.lock().await;
        loop {
            let message = match stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    return Err(BridgeError::OperationFailed(format!("WebSocket receive: {e}")))
                }
                None => return Ok(None),
            };

            match frame_text(message) {
                Ok(Some(text)) => return Ok(Some(text)),
                Ok(None) => continue,
                Err(()) => {
                    debug!(url = %self.url, "WebSocket closed by peer");
                    return Ok(None);
                }
            }
        }
    }

    async fn close(&self) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.close()
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("WebSocket close: {e}")))
    }
}
