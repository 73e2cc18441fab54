//! Arena: a multi-party chat simulation engine for autonomous agents.
//!
//! Agents live in channels, observe the conversation, and are scheduled to
//! speak by the [`Arena`] control loop in one of three modes: turn-based
//! rounds, mention-driven async ticks, or a hybrid of both. Who speaks in a
//! round is probabilistic, shaped by each agent's persona (talkativeness,
//! interests, recency of its last message) and short-circuited by `@mentions`.
//! Everything observable (messages, status changes, round boundaries) flows
//! through the [`events::EventBus`].
//!
//! The language-model boundary is the [`agent::Responder`] trait; the engine
//! ships deterministic implementations in [`responders`] and leaves real
//! model adapters to callers.

pub mod agent;
pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod message;
pub mod registry;
pub mod responders;
pub mod score;
pub mod world;

pub use agent::{Agent, AgentProfile, AgentSnapshot, AgentStatus, Responder};
pub use channel::{Channel, ChannelSnapshot, DEFAULT_MAX_HISTORY};
pub use config::{load_profile, load_profiles, ArenaConfig, ScheduleMode};
pub use error::{ArenaError, ArenaResult};
pub use events::{ArenaEvent, EventBus, SharedEventBus, WILDCARD};
pub use message::{extract_mentions, Message, MessageKind, HUMAN_SENDER, SYSTEM_SENDER};
pub use registry::AgentRegistry;
pub use responders::{ScriptedResponder, SilentResponder, PASS_LINE};
pub use score::response_score;
pub use world::{Arena, StatusSnapshot};
