//! Conversation history - bounded, volatile, per user.
//!
//! Each user gets one [`ConversationHistory`] behind its own async mutex.
//! Holding the guard for the whole request serializes handling for that user
//! without blocking anyone else.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use super::message::ConversationTurn;

/// Ordered, size-bounded sequence of turns. Oldest turns are evicted first.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    max_turns: usize,
    turns: VecDeque<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns: max_turns.max(1),
            turns: VecDeque::new(),
        }
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    pub fn extend(&mut self, turns: impl IntoIterator<Item = ConversationTurn>) {
        for turn in turns {
            self.push(turn);
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    /// Turns to send to the model.
    ///
    /// Eviction can cut an exchange in half, leaving tool results whose
    /// `tool_use` is gone. Leading turns are skipped until the first user
    /// text turn.
    pub fn replay(&self) -> Vec<ConversationTurn> {
        self.turns
            .iter()
            .skip_while(|turn| !turn.starts_exchange())
            .cloned()
            .collect()
    }
}

/// All users' histories, created lazily.
pub struct SessionStore {
    max_turns: usize,
    sessions: Mutex<HashMap<String, Arc<Mutex<ConversationHistory>>>>,
}

impl SessionStore {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Get (or create) the history for a user.
    pub async fn session(&self, user_id: &str) -> Arc<Mutex<ConversationHistory>> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                debug!("Creating conversation history for {}", user_id);
                Arc::new(Mutex::new(ConversationHistory::new(self.max_turns)))
            })
            .clone()
    }

    /// Number of turns currently held for a user
    pub async fn turn_count(&self, user_id: &str) -> usize {
        let session = {
            let sessions = self.sessions.lock().await;
            sessions.get(user_id).cloned()
        };
        match session {
            Some(session) => session.lock().await.len(),
            None => 0,
        }
    }

    /// Snapshot of a user's turns
    pub async fn snapshot(&self, user_id: &str) -> Vec<ConversationTurn> {
        let session = {
            let sessions = self.sessions.lock().await;
            sessions.get(user_id).cloned()
        };
        match session {
            Some(session) => session.lock().await.turns().cloned().collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::{ContentBlock, Role};
    use serde_json::json;

    #[test]
    fn test_history_never_exceeds_bound() {
        let mut history = ConversationHistory::new(3);
        for i in 0..10 {
            history.push(ConversationTurn::user(format!("Message {}", i)));
            assert!(history.len() <= 3);
        }
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_history_evicts_oldest_first() {
        let mut history = ConversationHistory::new(4);
        for i in 0..5 {
            history.push(ConversationTurn::user(format!("Message {}", i)));
        }

        let texts: Vec<String> = history.turns().map(|t| t.text()).collect();
        assert!(!texts.contains(&"Message 0".to_string()));
        assert_eq!(texts.first().map(String::as_str), Some("Message 1"));
        assert_eq!(texts.last().map(String::as_str), Some("Message 4"));
    }

    #[test]
    fn test_replay_skips_orphaned_tool_turns() {
        let mut history = ConversationHistory::new(3);
        history.push(ConversationTurn::user("list my emails"));
        history.push(ConversationTurn::new(
            Role::Assistant,
            vec![ContentBlock::tool_use("t1", "list_emails", json!({}))],
        ));
        history.push(ConversationTurn::tool_results(vec![ContentBlock::tool_result(
            "t1",
            json!({"messages": []}),
            false,
        )]));
        history.push(ConversationTurn::assistant("No emails."));

        // The user turn was evicted; the tool_use/tool_result pair is orphaned.
        assert_eq!(history.len(), 3);
        assert!(history.replay().is_empty());

        history.push(ConversationTurn::user("thanks"));
        let replay = history.replay();
        assert_eq!(replay.len(), 1);
        assert_eq!(replay[0].text(), "thanks");
    }

    #[tokio::test]
    async fn test_sessions_are_per_user() {
        let store = SessionStore::new(10);

        store.session("u1").await.lock().await.push(ConversationTurn::user("a"));
        store.session("u1").await.lock().await.push(ConversationTurn::user("b"));
        store.session("u2").await.lock().await.push(ConversationTurn::user("c"));

        assert_eq!(store.turn_count("u1").await, 2);
        assert_eq!(store.turn_count("u2").await, 1);
        assert_eq!(store.turn_count("nobody").await, 0);
        assert_eq!(store.snapshot("u2").await[0].text(), "c");
    }
}
