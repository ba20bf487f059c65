//! Persistence and webhook traits

use crate::{ConversationRecord, ConversationStatus, Result, Turn};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Append-only conversation persistence
///
/// The core makes exactly these calls; storage schemas beyond them are an
/// external concern.
#[async_trait]
pub trait ConversationStore: Send + Sync + 'static {
    /// Create the record when the media stream starts
    async fn create(&self, record: ConversationRecord) -> Result<()>;

    /// Append one completed turn
    async fn append_turn(&self, call_id: &str, turn: Turn) -> Result<()>;

    /// Finalise the record on call end
    async fn finish(
        &self,
        call_id: &str,
        status: ConversationStatus,
        transcript: String,
        ended_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Fetch a record by call id
    async fn get(&self, call_id: &str) -> Result<Option<ConversationRecord>>;
}

/// Fire-and-forget event sink
///
/// Dispatch must never block or fail the calling worker; failures are logged
/// and dropped.
pub trait WebhookSink: Send + Sync + 'static {
    fn dispatch(&self, event: &str, data: serde_json::Value);
}
