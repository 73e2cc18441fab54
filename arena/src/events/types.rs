//! Event types emitted by the arena.
//!
//! These drive the pub/sub bus; the presentation layer consumes them as
//! tagged JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ScheduleMode;
use crate::message::{AgentId, Message};

/// All events observable on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArenaEvent {
    /// A message was appended to a channel.
    Message {
        channel: String,
        message: Message,
        timestamp: DateTime<Utc>,
    },

    /// An agent started or finished generating.
    AgentThinking {
        agent_id: AgentId,
        agent_name: String,
        thinking: bool,
        timestamp: DateTime<Utc>,
    },

    /// An agent joined the arena.
    AgentJoined {
        agent_id: AgentId,
        agent_name: String,
        timestamp: DateTime<Utc>,
    },

    /// An agent left the arena.
    AgentLeft {
        agent_id: AgentId,
        agent_name: String,
        timestamp: DateTime<Utc>,
    },

    /// A turn-based round began.
    RoundStarted { round: u64, timestamp: DateTime<Utc> },

    /// A turn-based round finished. `speakers` is the number of selected
    /// candidates for the round.
    RoundEnded {
        round: u64,
        speakers: usize,
        timestamp: DateTime<Utc>,
    },

    /// The scheduler started.
    SimulationStarted {
        mode: ScheduleMode,
        timestamp: DateTime<Utc>,
    },

    /// The scheduler stopped after `rounds` completed rounds.
    SimulationStopped { rounds: u64, timestamp: DateTime<Utc> },
}

impl ArenaEvent {
    /// The event type tag, as used for bus subscriptions.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::AgentThinking { .. } => "agent_thinking",
            Self::AgentJoined { .. } => "agent_joined",
            Self::AgentLeft { .. } => "agent_left",
            Self::RoundStarted { .. } => "round_started",
            Self::RoundEnded { .. } => "round_ended",
            Self::SimulationStarted { .. } => "simulation_started",
            Self::SimulationStopped { .. } => "simulation_stopped",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Message { timestamp, .. } => *timestamp,
            Self::AgentThinking { timestamp, .. } => *timestamp,
            Self::AgentJoined { timestamp, .. } => *timestamp,
            Self::AgentLeft { timestamp, .. } => *timestamp,
            Self::RoundStarted { timestamp, .. } => *timestamp,
            Self::RoundEnded { timestamp, .. } => *timestamp,
            Self::SimulationStarted { timestamp, .. } => *timestamp,
            Self::SimulationStopped { timestamp, .. } => *timestamp,
        }
    }

    /// The agent this event concerns, if it is agent-scoped.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::AgentThinking { agent_id, .. } => Some(agent_id),
            Self::AgentJoined { agent_id, .. } => Some(agent_id),
            Self::AgentLeft { agent_id, .. } => Some(agent_id),
            _ => None,
        }
    }

    pub(crate) fn message(message: Message) -> Self {
        Self::Message {
            channel: message.channel.clone(),
            message,
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn thinking(agent_id: &str, agent_name: &str, thinking: bool) -> Self {
        Self::AgentThinking {
            agent_id: agent_id.to_string(),
            agent_name: agent_name.to_string(),
            thinking,
            timestamp: Utc::now(),
        }
    }
}
