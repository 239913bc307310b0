//! In-memory conversation windows keyed by session id.
//!
//! Each session keeps at most `window` messages; the oldest are evicted first.
//! The number of sessions is capped and idle sessions expire, least recently
//! used first. Nothing is persisted, so history is lost on restart.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use moka::policy::EvictionPolicy;
use moka::sync::Cache;

use super::ChatMessage;

/// Default number of messages kept per session.
pub const DEFAULT_HISTORY_WINDOW: usize = 20;

/// Default upper bound on remembered sessions.
pub const DEFAULT_MAX_SESSIONS: u64 = 10_000;

/// Default time a session may sit unused before it is forgotten.
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;

type Window = Arc<VecDeque<ChatMessage>>;

pub struct ConversationMemory {
    sessions: Cache<String, Window>,
    window: usize,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

impl ConversationMemory {
    /// A window of `0` disables history.
    pub fn new(window: usize) -> Self {
        Self::with_limits(
            window,
            DEFAULT_MAX_SESSIONS,
            Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
        )
    }

    pub fn with_limits(window: usize, max_sessions: u64, idle_timeout: Duration) -> Self {
        let sessions = Cache::builder()
            .max_capacity(max_sessions)
            .time_to_idle(idle_timeout)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        Self { sessions, window }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Snapshot of the messages remembered for `session_id`, oldest first.
    pub fn history(&self, session_id: &str) -> Vec<ChatMessage> {
        self.sessions
            .get(session_id)
            .map(|messages| messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Record a finished exchange.
    pub fn commit_turn(&self, session_id: &str, user: ChatMessage, assistant: ChatMessage) {
        if self.window == 0 {
            return;
        }

        let window = self.window;
        self.sessions
            .entry(session_id.to_string())
            .and_upsert_with(|existing| {
                let mut messages = existing
                    .map(|entry| VecDeque::clone(&entry.into_value()))
                    .unwrap_or_default();
                messages.push_back(user);
                messages.push_back(assistant);
                while messages.len() > window {
                    messages.pop_front();
                }
                Arc::new(messages)
            });
    }

    pub fn clear(&self, session_id: &str) {
        self.sessions.invalidate(session_id);
    }

    /// Sessions currently remembered, after pending evictions are applied.
    pub fn session_count(&self) -> u64 {
        self.sessions.run_pending_tasks();
        self.sessions.entry_count()
    }
}

impl std::fmt::Debug for ConversationMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationMemory")
            .field("window", &self.window)
            .field("max_sessions", &self.sessions.policy().max_capacity())
            .field("sessions", &self.sessions.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_empty_for_unknown_session() {
        let memory = ConversationMemory::default();
        assert!(memory.history("nobody").is_empty());
        assert_eq!(memory.window(), DEFAULT_HISTORY_WINDOW);
    }

    #[test]
    fn test_commit_turn_keeps_order() {
        let memory = ConversationMemory::new(10);
        memory.commit_turn("s1", ChatMessage::user("hi"), ChatMessage::assistant("hello"));
        memory.commit_turn("s1", ChatMessage::user("how are you"), ChatMessage::assistant("fine"));

        let history = memory.history("s1");
        assert_eq!(
            history,
            vec![
                ChatMessage::user("hi"),
                ChatMessage::assistant("hello"),
                ChatMessage::user("how are you"),
                ChatMessage::assistant("fine"),
            ]
        );
    }

    #[test]
    fn test_window_evicts_oldest() {
        let memory = ConversationMemory::new(4);
        for i in 0..5 {
            memory.commit_turn(
                "s1",
                ChatMessage::user(format!("q{i}")),
                ChatMessage::assistant(format!("a{i}")),
            );
        }

        let history = memory.history("s1");
        assert_eq!(history.len(), 4);
        assert_eq!(history[0], ChatMessage::user("q3"));
        assert_eq!(history[3], ChatMessage::assistant("a4"));
    }

    #[test]
    fn test_sessions_are_isolated() {
        let memory = ConversationMemory::new(10);
        memory.commit_turn("a", ChatMessage::user("one"), ChatMessage::assistant("1"));
        memory.commit_turn("b", ChatMessage::user("two"), ChatMessage::assistant("2"));

        assert_eq!(memory.session_count(), 2);
        assert_eq!(memory.history("a")[0].content, "one");
        assert_eq!(memory.history("b")[0].content, "two");

        memory.clear("a");
        assert!(memory.history("a").is_empty());
        assert_eq!(memory.session_count(), 1);
    }

    #[test]
    fn test_zero_window_disables_history() {
        let memory = ConversationMemory::new(0);
        memory.commit_turn("s1", ChatMessage::user("hi"), ChatMessage::assistant("hello"));
        assert!(memory.history("s1").is_empty());
        assert_eq!(memory.session_count(), 0);
    }

    #[test]
    fn test_session_cap_evicts_least_recent() {
        let memory = ConversationMemory::with_limits(4, 100, Duration::from_secs(60));
        for i in 0..10_000 {
            memory.commit_turn(
                &format!("anon-{i}"),
                ChatMessage::user("q"),
                ChatMessage::assistant("a"),
            );
        }

        assert!(memory.session_count() <= 100);
        assert!(memory.history("anon-0").is_empty());
        assert_eq!(memory.history("anon-9999").len(), 2);
    }

    #[test]
    fn test_idle_sessions_expire() {
        let memory = ConversationMemory::with_limits(4, 100, Duration::from_millis(50));
        memory.commit_turn("s1", ChatMessage::user("hi"), ChatMessage::assistant("hello"));
        assert_eq!(memory.history("s1").len(), 2);

        std::thread::sleep(Duration::from_millis(120));

        assert!(memory.history("s1").is_empty());
        assert_eq!(memory.session_count(), 0);
    }
}
