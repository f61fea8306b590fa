use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc::{self, Receiver, Sender};

/// Boundary to the process's message transport. The pipeline only ever
/// publishes; registration and subscription live with the transport
/// owner.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError>;
}

/// A message handed over to the transport, UTF-8 payload on a topic
/// string.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Bridges publishes onto a tokio channel so the process can forward them
/// to whatever transport it is wired to.
pub struct ChannelBus {
    tx: Sender<BusMessage>,
}

impl ChannelBus {
    pub fn new(buffer: usize) -> (ChannelBus, Receiver<BusMessage>) {
        let (tx, rx) = mpsc::channel(buffer);
        (ChannelBus { tx }, rx)
    }
}

#[async_trait]
impl MessageBus for ChannelBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
        self.tx
            .send(BusMessage {
                topic: topic.to_string(),
                payload: payload.to_vec(),
            })
            .await
            .map_err(|_| BusError::Closed)
    }
}

#[derive(Error, Debug)]
pub enum BusError {
    #[error("the bus transport is gone")]
    Closed,
}

/// Records every published message, for assertions.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryBus {
    messages: tokio::sync::Mutex<Vec<BusMessage>>,
}

#[cfg(test)]
impl MemoryBus {
    pub fn new() -> MemoryBus {
        MemoryBus::default()
    }

    pub async fn messages(&self) -> Vec<BusMessage> {
        self.messages.lock().await.clone()
    }
}

#[cfg(test)]
#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
        self.messages.lock().await.push(BusMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}
