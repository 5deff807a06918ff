//! Conversation-memory capability and the in-memory trailing window.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::RwLock;
use ragforge_core::{ChatMessage, Result, Role};

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn add_message(&self, session_id: &str, role: Role, content: &str) -> Result<()>;

    /// The most recent `n` messages for a session, oldest first.
    async fn recent(&self, session_id: &str, n: usize) -> Result<Vec<ChatMessage>>;
}

/// Per-session trailing window of the last `max_messages` messages.
pub struct InMemoryHistory {
    max_messages: usize,
    sessions: RwLock<HashMap<String, VecDeque<ChatMessage>>>,
}

impl InMemoryHistory {
    pub fn new(max_messages: usize) -> Self {
        Self {
            max_messages,
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn add_message(&self, session_id: &str, role: Role, content: &str) -> Result<()> {
        let mut sessions = self.sessions.write();
        let messages = sessions.entry(session_id.to_string()).or_default();
        messages.push_back(ChatMessage {
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            created_at: now_millis(),
        });
        while messages.len() > self.max_messages {
            messages.pop_front();
        }
        Ok(())
    }

    async fn recent(&self, session_id: &str, n: usize) -> Result<Vec<ChatMessage>> {
        let sessions = self.sessions.read();
        let Some(messages) = sessions.get(session_id) else {
            return Ok(Vec::new());
        };
        let skip = messages.len().saturating_sub(n);
        Ok(messages.iter().skip(skip).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_window_bounds_session() {
        let history = InMemoryHistory::new(3);
        for i in 0..5 {
            history
                .add_message("s1", Role::User, &format!("m{}", i))
                .await
                .unwrap();
        }
        let recent = history.recent("s1", 10).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "m2");
        assert_eq!(recent[2].content, "m4");
    }

    #[tokio::test]
    async fn test_recent_is_chronological() {
        let history = InMemoryHistory::new(10);
        history.add_message("s", Role::User, "hi").await.unwrap();
        history
            .add_message("s", Role::Assistant, "hello")
            .await
            .unwrap();

        let recent = history.recent("s", 1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].role, Role::Assistant);

        let both = history.recent("s", 2).await.unwrap();
        assert_eq!(both[0].role, Role::User);
        assert!(both[0].created_at <= both[1].created_at);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let history = InMemoryHistory::new(5);
        history.add_message("a", Role::User, "for a").await.unwrap();
        assert!(history.recent("b", 5).await.unwrap().is_empty());
    }
}
