//! Agents: profile, runtime status machine, and the responder seam.
//!
//! The status field is an observability projection, not the exclusion
//! mechanism itself: mutual exclusion of in-flight generations is a
//! single-permit semaphore per agent (`try_begin_turn`). At no point can two
//! invocations hold the same agent's permit, so at no point is an agent
//! `Thinking` for two overlapping invocations.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, TryAcquireError};

use crate::message::AgentId;

/// Status of an agent in the arena.
///
/// Transitions: `Offline → Idle` on connect; `Idle → Thinking` when a
/// scheduling invocation begins; `Thinking → Speaking → Idle` on success;
/// `Thinking → Idle` on a pass or failure; `→ Offline` on disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Offline,
    Idle,
    Thinking,
    Speaking,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Offline => "offline",
            Self::Idle => "idle",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
        };
        write!(f, "{s}")
    }
}

/// Static persona configuration for an agent, typically loaded from YAML.
///
/// Generation-related fields (`system_prompt`, `temperature`, `model`) are
/// carried for responder implementations; the scheduler itself only reads
/// `name`, `interests`, and `response_tendency`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    /// Stable identity. Callers generate ids; empty means "assign a UUID".
    pub id: AgentId,
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub personality_traits: BTreeMap<String, f64>,
    pub speaking_style: String,
    pub interests: Vec<String>,
    /// 0.0 (quiet) to 1.0 (talkative).
    pub response_tendency: f64,
    pub temperature: f64,
    pub model: String,
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            description: String::new(),
            system_prompt: String::new(),
            personality_traits: BTreeMap::new(),
            speaking_style: String::new(),
            interests: Vec::new(),
            response_tendency: 0.5,
            temperature: 0.7,
            model: String::new(),
        }
    }
}

impl AgentProfile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_tendency(mut self, tendency: f64) -> Self {
        self.response_tendency = tendency;
        self
    }

    pub fn with_interests(mut self, interests: Vec<String>) -> Self {
        self.interests = interests;
        self
    }
}

/// External boundary through which an agent's response is obtained.
///
/// The engine treats implementations as opaque: `respond` suspends for as
/// long as it likes (timeouts are the adapter's responsibility) and returns
/// `None` to pass without saying anything.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Prepare the adapter for use (open clients, reset per-session state).
    async fn connect(&self) -> anyhow::Result<()>;

    /// Tear down the adapter.
    async fn disconnect(&self) -> anyhow::Result<()>;

    /// Produce a response to the rendered conversation context, or `None`
    /// to pass.
    async fn respond(&self, context: &str) -> anyhow::Result<Option<String>>;
}

#[derive(Debug)]
struct AgentRuntime {
    status: AgentStatus,
    last_spoke_at: Option<Instant>,
    message_count: u64,
}

/// A permit for one in-flight generation. Dropping it ends the turn.
pub struct TurnPermit<'a> {
    _permit: tokio::sync::SemaphorePermit<'a>,
}

/// An agent in the arena: persona, runtime state, and its responder.
pub struct Agent {
    profile: AgentProfile,
    responder: Box<dyn Responder>,
    runtime: Mutex<AgentRuntime>,
    turn: Semaphore,
}

impl Agent {
    /// Build an agent from a profile and a responder. An empty profile id is
    /// replaced with a fresh UUID.
    pub fn new(mut profile: AgentProfile, responder: Box<dyn Responder>) -> Self {
        if profile.id.is_empty() {
            profile.id = uuid::Uuid::new_v4().to_string();
        }
        Self {
            profile,
            responder,
            runtime: Mutex::new(AgentRuntime {
                status: AgentStatus::Offline,
                last_spoke_at: None,
                message_count: 0,
            }),
            turn: Semaphore::new(1),
        }
    }

    pub fn id(&self) -> &str {
        &self.profile.id
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    pub fn status(&self) -> AgentStatus {
        self.runtime.lock().expect("agent runtime lock").status
    }

    pub fn is_idle(&self) -> bool {
        self.status() == AgentStatus::Idle
    }

    /// Time since this agent last spoke, if it has spoken.
    pub fn time_since_spoke(&self) -> Option<Duration> {
        self.runtime
            .lock()
            .expect("agent runtime lock")
            .last_spoke_at
            .map(|t| t.elapsed())
    }

    pub fn message_count(&self) -> u64 {
        self.runtime.lock().expect("agent runtime lock").message_count
    }

    pub(crate) fn set_status(&self, status: AgentStatus) {
        let mut rt = self.runtime.lock().expect("agent runtime lock");
        tracing::trace!(agent = %self.profile.name, from = %rt.status, to = %status, "status transition");
        rt.status = status;
    }

    /// Record a successful utterance: bump the counter and recency marker.
    pub(crate) fn record_spoke(&self) {
        let mut rt = self.runtime.lock().expect("agent runtime lock");
        rt.last_spoke_at = Some(Instant::now());
        rt.message_count += 1;
    }

    /// Try to claim this agent's single generation permit without waiting.
    ///
    /// Returns `None` when another invocation is already in flight.
    pub(crate) fn try_begin_turn(&self) -> Option<TurnPermit<'_>> {
        match self.turn.try_acquire() {
            Ok(permit) => Some(TurnPermit { _permit: permit }),
            Err(TryAcquireError::NoPermits) => None,
            Err(TryAcquireError::Closed) => None,
        }
    }

    /// Connect the responder and bring the agent online.
    pub(crate) async fn connect(&self) -> anyhow::Result<()> {
        self.responder.connect().await?;
        self.set_status(AgentStatus::Idle);
        Ok(())
    }

    /// Disconnect the responder and take the agent offline.
    pub(crate) async fn disconnect(&self) -> anyhow::Result<()> {
        let result = self.responder.disconnect().await;
        self.set_status(AgentStatus::Offline);
        result
    }

    pub(crate) async fn respond(&self, context: &str) -> anyhow::Result<Option<String>> {
        self.responder.respond(context).await
    }

    /// Serializable view for status snapshots.
    pub fn snapshot(&self) -> AgentSnapshot {
        let rt = self.runtime.lock().expect("agent runtime lock");
        AgentSnapshot {
            id: self.profile.id.clone(),
            name: self.profile.name.clone(),
            status: rt.status,
            response_tendency: self.profile.response_tendency,
            message_count: rt.message_count,
            last_spoke_secs_ago: rt.last_spoke_at.map(|t| t.elapsed().as_secs_f64()),
            snapshot_at: Utc::now(),
        }
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.profile.id)
            .field("name", &self.profile.name)
            .field("status", &self.status())
            .finish()
    }
}

/// Point-in-time serializable view of an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub name: String,
    pub status: AgentStatus,
    pub response_tendency: f64,
    pub message_count: u64,
    pub last_spoke_secs_ago: Option<f64>,
    pub snapshot_at: DateTime<Utc>,
}
