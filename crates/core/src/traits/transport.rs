//! Media transport trait

use crate::Result;
use async_trait::async_trait;

/// The per-call bidirectional media channel (the carrier's socket)
///
/// Implementations are bounded internally; `send_media` may suspend under
/// backpressure, and callers that cannot wait wrap it in a timeout.
#[async_trait]
pub trait MediaTransport: Send + Sync + 'static {
    /// Send one outbound media frame (base64 µ-law payload)
    async fn send_media(&self, payload_b64: &str) -> Result<()>;

    /// Ask the carrier to drop any audio it has buffered
    async fn send_clear(&self) -> Result<()>;

    /// Whether the channel is still open
    fn is_open(&self) -> bool;
}
