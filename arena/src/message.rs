//! Chat messages and the `@mention` contract.
//!
//! A [`Message`] is immutable once constructed: mentions are derived from the
//! content exactly once, at construction time, and never re-derived.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Identifier for an agent or other message sender.
pub type AgentId = String;

/// Sender id used for system-generated messages (joins, leaves, notices).
pub const SYSTEM_SENDER: &str = "system";

/// Sender id used for messages injected by a human or external source.
pub const HUMAN_SENDER: &str = "human";

static MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\w+)").expect("valid mention regex"));

/// Kind of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Ordinary chat line.
    Chat,
    /// System notice.
    System,
    /// `/me`-style action.
    Action,
    /// A participant joined a channel.
    Join,
    /// A participant left a channel.
    Leave,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Chat => "chat",
            Self::System => "system",
            Self::Action => "action",
            Self::Join => "join",
            Self::Leave => "leave",
        };
        write!(f, "{s}")
    }
}

/// A single message in a channel. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender_id: AgentId,
    pub sender_name: String,
    pub content: String,
    pub channel: String,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// `@word` tokens extracted from `content`, order, case, and duplicates
    /// preserved.
    pub mentions: Vec<String>,
}

impl Message {
    /// Build a message, deriving mentions from the content.
    pub fn new(
        sender_id: impl Into<AgentId>,
        sender_name: impl Into<String>,
        content: impl Into<String>,
        channel: impl Into<String>,
        kind: MessageKind,
    ) -> Self {
        let content = content.into();
        let mentions = extract_mentions(&content);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            content,
            channel: channel.into(),
            kind,
            timestamp: Utc::now(),
            reply_to: None,
            mentions,
        }
    }

    /// A plain chat message.
    pub fn chat(
        sender_id: impl Into<AgentId>,
        sender_name: impl Into<String>,
        content: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self::new(sender_id, sender_name, content, channel, MessageKind::Chat)
    }

    /// A system-generated message.
    pub fn system(content: impl Into<String>, channel: impl Into<String>, kind: MessageKind) -> Self {
        Self::new(SYSTEM_SENDER, "System", content, channel, kind)
    }

    /// Set the message this one replies to.
    pub fn with_reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to = Some(message_id.into());
        self
    }

    /// Whether `name` appears among the mentions (case-insensitive).
    pub fn mentions_name(&self, name: &str) -> bool {
        self.mentions.iter().any(|m| m.eq_ignore_ascii_case(name))
    }

    /// Render the message IRC-style: `[HH:MM:SS] <sender> content`, with
    /// kind-specific framing for system, join, leave, and action lines.
    pub fn format_irc(&self) -> String {
        let time = self.timestamp.format("%H:%M:%S");
        match self.kind {
            MessageKind::Action => format!("[{time}] * {} {}", self.sender_name, self.content),
            MessageKind::System => format!("[{time}] *** {}", self.content),
            MessageKind::Join => format!("[{time}] --> {}", self.content),
            MessageKind::Leave => format!("[{time}] <-- {}", self.content),
            MessageKind::Chat => format!("[{time}] <{}> {}", self.sender_name, self.content),
        }
    }
}

/// Extract `@word` tokens (alphanumeric/underscore runs) from content.
pub fn extract_mentions(content: &str) -> Vec<String> {
    MENTION_RE
        .captures_iter(content)
        .map(|c| c[1].to_string())
        .collect()
}
