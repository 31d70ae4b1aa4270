use alloy_primitives::B256;
use async_trait::async_trait;
use thiserror::Error;

use crate::message::Message;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("peer disconnected")]
    Disconnected,
    #[error("send failed: {0}")]
    Send(String),
}

/// Outbound half of the peer connection. Inbound messages are pushed into
/// the session through `Swap::handle_message`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, offer_id: B256, message: Message) -> Result<(), TransportError>;
}
