//! Conversation turns and the persisted call record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One completed user/assistant exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// What the user said
    pub user: String,
    /// What the agent replied (tool markers and markdown stripped)
    pub assistant: String,
    /// Name of the tool executed during this turn, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// When the turn completed
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
            tool_name: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }
}

/// Lifecycle status of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConversationStatus {
    InProgress,
    Completed,
    Failed,
    Disconnected,
    Timeout,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::InProgress => "in-progress",
            ConversationStatus::Completed => "completed",
            ConversationStatus::Failed => "failed",
            ConversationStatus::Disconnected => "disconnected",
            ConversationStatus::Timeout => "timeout",
        }
    }
}

/// Persisted record of one call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub call_id: String,
    pub agent_id: Option<String>,
    pub status: ConversationStatus,
    pub transcript: String,
    pub phone_number: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ConversationRecord {
    pub fn started(call_id: impl Into<String>, agent_id: Option<String>) -> Self {
        Self {
            call_id: call_id.into(),
            agent_id,
            status: ConversationStatus::InProgress,
            transcript: String::new(),
            phone_number: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }
}

/// Render history as the `User:` / `Assistant:` transcript persisted on end
pub fn render_transcript(turns: &[Turn]) -> String {
    if turns.is_empty() {
        return "[No conversation]".to_string();
    }
    let mut lines = Vec::with_capacity(turns.len() * 2);
    for turn in turns {
        lines.push(format!("User: {}", turn.user));
        lines.push(format!("Assistant: {}", turn.assistant));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(ConversationStatus::InProgress.as_str(), "in-progress");
        assert_eq!(ConversationStatus::Timeout.as_str(), "timeout");
    }

    #[test]
    fn test_render_transcript() {
        let turns = vec![
            Turn::new("hello", "Hi there!"),
            Turn::new("bye", "Goodbye, take care."),
        ];
        let transcript = render_transcript(&turns);
        assert_eq!(
            transcript,
            "User: hello\nAssistant: Hi there!\nUser: bye\nAssistant: Goodbye, take care."
        );
    }

    #[test]
    fn test_render_empty_transcript() {
        assert_eq!(render_transcript(&[]), "[No conversation]");
    }
}
