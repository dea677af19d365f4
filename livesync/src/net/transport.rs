//! Transport seam for the notification channel.
//!
//! The connection manager only sees a [`Transport`]: a sink of outbound
//! frames paired with a stream of inbound frames. [`WsConnector`] produces
//! one over a real WebSocket carrying protobuf-encoded frames; tests plug in
//! channel-backed connectors instead.

use std::pin::Pin;
use std::time::Duration;

use frames::Frame;
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket connect failed: {0}")]
    WsConnect(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("websocket error: {0}")]
    Ws(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("connect attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("frame decode failed: {0}")]
    Decode(#[from] frames::CodecError),
    #[error("connection closed by server")]
    Closed,
    #[error("{0}")]
    Other(String),
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// One established connection. Dropping it tears the connection down.
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Transport {
    pub fn new(
        sink: impl Sink<Frame, Error = TransportError> + Send + 'static,
        stream: impl Stream<Item = Result<Frame, TransportError>> + Send + 'static,
    ) -> Self {
        Self { sink: Box::pin(sink), stream: Box::pin(stream) }
    }
}

/// Opens transports on demand. One call per connect attempt.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Transport, TransportError>;
}

/// WebSocket connector speaking binary protobuf frames.
#[derive(Clone, Debug)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Transport, TransportError> {
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|error| TransportError::WsConnect(Box::new(error)))?;
        let (write, read) = socket.split();

        let sink = write
            .sink_map_err(|error| TransportError::Ws(Box::new(error)))
            .with(|frame: Frame| {
                future::ready(Ok::<_, TransportError>(Message::Binary(frames::encode_frame(&frame).into())))
            });

        let stream = read.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Binary(bytes)) => Some(frames::decode_frame(&bytes).map_err(TransportError::from)),
                Ok(Message::Close(_)) => Some(Err(TransportError::Closed)),
                Ok(_) => None,
                Err(error) => Some(Err(TransportError::Ws(Box::new(error)))),
            })
        });

        Ok(Transport::new(sink, stream))
    }
}
