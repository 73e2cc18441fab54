//! Bounded append-only message log for one conversation topic.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{AgentId, Message};

/// Default number of messages retained per channel.
pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// A chat channel: ordered message log plus membership and a topic string.
///
/// Only the channel mutates its own message list; messages are immutable once
/// appended. The log never exceeds `max_history` entries (FIFO eviction).
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub description: String,
    topic: String,
    created_at: DateTime<Utc>,
    members: HashSet<AgentId>,
    messages: VecDeque<Message>,
    max_history: usize,
}

impl Channel {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::with_max_history(name, description, DEFAULT_MAX_HISTORY)
    }

    pub fn with_max_history(
        name: impl Into<String>,
        description: impl Into<String>,
        max_history: usize,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            topic: String::new(),
            created_at: Utc::now(),
            members: HashSet::new(),
            messages: VecDeque::new(),
            max_history,
        }
    }

    pub fn add_member(&mut self, agent_id: impl Into<AgentId>) {
        self.members.insert(agent_id.into());
    }

    pub fn remove_member(&mut self, agent_id: &str) {
        self.members.remove(agent_id);
    }

    pub fn is_member(&self, agent_id: &str) -> bool {
        self.members.contains(agent_id)
    }

    /// Append a message, evicting from the front while over `max_history`.
    pub fn add_message(&mut self, message: Message) {
        self.messages.push_back(message);
        while self.messages.len() > self.max_history {
            self.messages.pop_front();
        }
    }

    /// The last `count` messages in chronological order (fewer if the log is
    /// shorter).
    pub fn get_recent_messages(&self, count: usize) -> Vec<Message> {
        let skip = self.messages.len().saturating_sub(count);
        self.messages.iter().skip(skip).cloned().collect()
    }

    /// The single most recent message, if any.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.back()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Render the last `count` messages as the context string handed to
    /// responder adapters: an optional topic banner followed by IRC-style
    /// lines. Deterministic for a given log slice.
    pub fn get_context_string(&self, count: usize) -> String {
        let mut lines = Vec::new();

        if !self.topic.is_empty() {
            lines.push(format!("=== Room Topic: {} ===", self.topic));
            lines.push(String::new());
        }

        for msg in self.get_recent_messages(count) {
            lines.push(msg.format_irc());
        }

        lines.join("\n")
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn set_topic(&mut self, topic: impl Into<String>) {
        self.topic = topic.into();
    }

    /// Empty the log, returning the number of messages removed.
    pub fn clear_messages(&mut self) -> usize {
        let count = self.messages.len();
        self.messages.clear();
        count
    }

    /// Serializable view for status snapshots and the presentation layer.
    pub fn snapshot(&self) -> ChannelSnapshot {
        let mut members: Vec<String> = self.members.iter().cloned().collect();
        members.sort();
        ChannelSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            topic: self.topic.clone(),
            members,
            message_count: self.messages.len(),
            created_at: self.created_at,
        }
    }
}

/// Point-in-time serializable view of a channel (no message bodies).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub id: String,
    pub name: String,
    pub description: String,
    pub topic: String,
    pub members: Vec<String>,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(n: usize) -> Message {
        Message::chat("a", "A", format!("msg-{n}"), "general")
    }

    #[test]
    fn test_bounded_log_keeps_suffix() {
        let mut ch = Channel::with_max_history("general", "", 3);
        for n in 0..10 {
            ch.add_message(chat(n));
        }
        assert_eq!(ch.message_count(), 3);
        let contents: Vec<_> = ch
            .get_recent_messages(10)
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["msg-7", "msg-8", "msg-9"]);
    }

    #[test]
    fn test_recent_messages_shorter_log() {
        let mut ch = Channel::new("general", "");
        ch.add_message(chat(0));
        assert_eq!(ch.get_recent_messages(5).len(), 1);
    }

    #[test]
    fn test_context_string_topic_banner() {
        let mut ch = Channel::new("general", "");
        ch.set_topic("rust");
        ch.add_message(chat(0));
        let ctx = ch.get_context_string(10);
        assert!(ctx.starts_with("=== Room Topic: rust ===\n\n"));
        assert!(ctx.contains("<A> msg-0"));
    }

    #[test]
    fn test_context_string_deterministic() {
        let mut ch = Channel::new("general", "");
        ch.add_message(chat(0));
        ch.add_message(chat(1));
        assert_eq!(ch.get_context_string(2), ch.get_context_string(2));
    }

    #[test]
    fn test_clear_returns_count() {
        let mut ch = Channel::new("general", "");
        ch.add_message(chat(0));
        ch.add_message(chat(1));
        assert_eq!(ch.clear_messages(), 2);
        assert_eq!(ch.message_count(), 0);
        assert_eq!(ch.clear_messages(), 0);
    }

    #[test]
    fn test_membership() {
        let mut ch = Channel::new("general", "");
        ch.add_member("a1");
        assert!(ch.is_member("a1"));
        ch.remove_member("a1");
        assert!(!ch.is_member("a1"));
        // Removing a non-member is a no-op.
        ch.remove_member("a1");
    }

    #[test]
    fn test_snapshot() {
        let mut ch = Channel::new("general", "main room");
        ch.add_member("b");
        ch.add_member("a");
        ch.add_message(chat(0));
        let snap = ch.snapshot();
        assert_eq!(snap.name, "general");
        assert_eq!(snap.members, vec!["a", "b"]);
        assert_eq!(snap.message_count, 1);
    }
}
