use alloy_primitives::B256;
use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::message::Message;
use crate::ports::{Transport, TransportError};

/// In-process transport: outbound messages land on the paired receiver.
#[derive(Clone)]
pub struct ChannelTransport {
    tx: UnboundedSender<(B256, Message)>,
}

impl ChannelTransport {
    pub fn new() -> (Self, UnboundedReceiver<(B256, Message)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, offer_id: B256, message: Message) -> Result<(), TransportError> {
        self.tx
            .send((offer_id, message))
            .map_err(|_| TransportError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_receiver_reports_disconnect() {
        let (transport, rx) = ChannelTransport::new();
        drop(rx);
        let message = Message::NotifyXmrLock {
            address: xmr_wallet::generate_key_pair().address(xmr_wallet::Network::Dev),
            tx_id: "00".into(),
        };
        assert_eq!(
            transport.send(B256::ZERO, message).await,
            Err(TransportError::Disconnected)
        );
    }
}
