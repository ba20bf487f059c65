//! WebSocket-backed media transport
//!
//! The session side sees the `MediaTransport` trait; outbound messages go
//! through a bounded queue drained by the socket pump. A full queue is
//! backpressure the TTS drainer handles with its send timeout.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::protocol::{OutboundMedia, OutboundMessage};
use voicegate_core::{Error, MediaTransport, Result};

/// Transport bound to one media stream
pub struct WsMediaTransport {
    stream_sid: String,
    tx: mpsc::Sender<OutboundMessage>,
}

impl WsMediaTransport {
    /// Create the transport and the receiver the socket pump drains
    pub fn channel(
        stream_sid: impl Into<String>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Arc::new(Self {
                stream_sid: stream_sid.into(),
                tx,
            }),
            rx,
        )
    }

    pub fn stream_sid(&self) -> &str {
        &self.stream_sid
    }
}

#[async_trait]
impl MediaTransport for WsMediaTransport {
    async fn send_media(&self, payload: &str) -> Result<()> {
        self.tx
            .send(OutboundMessage::Media {
                stream_sid: self.stream_sid.clone(),
                media: OutboundMedia {
                    payload: payload.to_string(),
                },
            })
            .await
            .map_err(|_| Error::Transport("media channel closed".to_string()))
    }

    async fn send_clear(&self) -> Result<()> {
        self.tx
            .send(OutboundMessage::Clear {
                stream_sid: self.stream_sid.clone(),
            })
            .await
            .map_err(|_| Error::Transport("media channel closed".to_string()))
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_messages_preserve_order() {
        let (transport, mut rx) = WsMediaTransport::channel("MZ1", 8);
        transport.send_media("AAAA").await.unwrap();
        transport.send_clear().await.unwrap();
        transport.send_media("BBBB").await.unwrap();

        assert!(matches!(rx.recv().await, Some(OutboundMessage::Media { .. })));
        assert!(matches!(rx.recv().await, Some(OutboundMessage::Clear { .. })));
        match rx.recv().await {
            Some(OutboundMessage::Media { media, .. }) => assert_eq!(media.payload, "BBBB"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_closed_channel_errors() {
        let (transport, rx) = WsMediaTransport::channel("MZ1", 8);
        drop(rx);
        assert!(!transport.is_open());
        assert!(transport.send_media("AAAA").await.is_err());
    }
}
