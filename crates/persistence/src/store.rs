//! In-memory conversation store

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use voicegate_core::{
    ConversationRecord, ConversationStatus, ConversationStore, Error, Result, Turn,
};

/// Process-local conversation registry
#[derive(Default)]
pub struct InMemoryConversationStore {
    records: RwLock<HashMap<String, ConversationRecord>>,
    turns: RwLock<HashMap<String, Vec<Turn>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turns appended so far for one call
    pub fn turns(&self, call_id: &str) -> Vec<Turn> {
        self.turns.read().get(call_id).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create(&self, record: ConversationRecord) -> Result<()> {
        tracing::debug!(call_id = %record.call_id, "creating conversation record");
        self.records.write().insert(record.call_id.clone(), record);
        Ok(())
    }

    async fn append_turn(&self, call_id: &str, turn: Turn) -> Result<()> {
        self.turns
            .write()
            .entry(call_id.to_string())
            .or_default()
            .push(turn);
        Ok(())
    }

    async fn finish(
        &self,
        call_id: &str,
        status: ConversationStatus,
        transcript: String,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut records = self.records.write();
        let record = records
            .get_mut(call_id)
            .ok_or_else(|| Error::Store(format!("unknown call: {call_id}")))?;
        record.status = status;
        record.transcript = transcript;
        record.ended_at = Some(ended_at);
        tracing::info!(%call_id, status = status.as_str(), "conversation finished");
        Ok(())
    }

    async fn get(&self, call_id: &str) -> Result<Option<ConversationRecord>> {
        Ok(self.records.read().get(call_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_lifecycle() {
        let store = InMemoryConversationStore::new();
        let record = ConversationRecord::started("call-1", Some("agent-1".to_string()));
        store.create(record).await.unwrap();

        store
            .append_turn("call-1", Turn::new("hi", "Hello!"))
            .await
            .unwrap();
        assert_eq!(store.turns("call-1").len(), 1);

        store
            .finish(
                "call-1",
                ConversationStatus::Completed,
                "User: hi\nAssistant: Hello!".to_string(),
                Utc::now(),
            )
            .await
            .unwrap();

        let stored = store.get("call-1").await.unwrap().unwrap();
        assert_eq!(stored.status, ConversationStatus::Completed);
        assert!(stored.ended_at.is_some());
        assert!(stored.transcript.contains("Assistant: Hello!"));
    }

    #[tokio::test]
    async fn test_finish_unknown_call_errors() {
        let store = InMemoryConversationStore::new();
        let result = store
            .finish("missing", ConversationStatus::Failed, String::new(), Utc::now())
            .await;
        assert!(result.is_err());
    }
}
