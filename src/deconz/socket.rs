use crate::deconz::decoder::Decoder;
use crate::deconz::event::Event;
use crate::deconz::reader::{EventSource, SourceError};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The production event source: a WebSocket connection to the gateway,
/// one JSON envelope per text frame, run through the decoder.
pub struct WsEventSource {
    url: String,
    decoder: Decoder,
    stream: Option<WsStream>,
}

impl WsEventSource {
    pub fn new(url: String, decoder: Decoder) -> WsEventSource {
        WsEventSource {
            url,
            decoder,
            stream: None,
        }
    }
}

#[async_trait]
impl EventSource for WsEventSource {
    async fn dial(&mut self) -> Result<(), SourceError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        debug!("WebSocket handshake with {} completed", self.url);
        self.stream = Some(stream);
        Ok(())
    }

    async fn read_event(&mut self) -> Result<Event, SourceError> {
        let WsEventSource { decoder, stream, .. } = self;
        let stream = stream.as_mut().ok_or(SourceError::Closed)?;

        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(decoder.decode(text.as_bytes()).await?),
                Some(Ok(Message::Ping(_))) => {
                    // tungstenite queues the pong reply on its own
                    trace!("WebSocket ping");
                }
                Some(Ok(Message::Close(_))) => return Err(SourceError::Closed),
                Some(Ok(_)) => {
                    // Binary, pong and raw frames carry no events
                }
                Some(Err(e)) => return Err(SourceError::Connection(e.to_string())),
                None => return Err(SourceError::Closed),
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }
}
