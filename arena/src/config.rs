//! Arena configuration and persona loading.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agent::AgentProfile;

/// How agents are scheduled to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    /// Rounds only: select and invoke up to K speakers per round.
    TurnBased,
    /// Mentions only: every tick, invoke agents mentioned by the newest
    /// message.
    Async,
    /// Mentions pre-empt; rounds run on the `round_interval` cadence.
    Hybrid,
}

impl std::fmt::Display for ScheduleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TurnBased => "turn_based",
            Self::Async => "async",
            Self::Hybrid => "hybrid",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ScheduleMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "turn_based" | "turn-based" => Ok(Self::TurnBased),
            "async" => Ok(Self::Async),
            "hybrid" => Ok(Self::Hybrid),
            other => anyhow::bail!("unknown schedule mode `{other}` (expected turn_based, async, or hybrid)"),
        }
    }
}

/// Top-level arena configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub name: String,
    pub mode: ScheduleMode,
    /// Seconds between turn-based rounds.
    pub round_interval_secs: f64,
    /// Seconds between Async/Hybrid ticks.
    pub tick_interval_secs: f64,
    pub max_speakers_per_round: usize,
    /// How many recent messages to render into responder context.
    pub context_messages: usize,
    /// Per-channel message log bound.
    pub max_history: usize,
    /// Name of the always-present default channel.
    pub default_channel: String,
    /// Seed for the candidate-selection RNG; `None` seeds from entropy.
    pub rng_seed: Option<u64>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            name: "Agent Arena".to_string(),
            mode: ScheduleMode::Hybrid,
            round_interval_secs: 5.0,
            tick_interval_secs: 1.0,
            max_speakers_per_round: 3,
            context_messages: 20,
            max_history: 1000,
            default_channel: "general".to_string(),
            rng_seed: None,
        }
    }
}

impl ArenaConfig {
    pub fn round_interval(&self) -> Duration {
        Duration::from_secs_f64(self.round_interval_secs.max(0.0))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(self.tick_interval_secs.max(0.0))
    }
}

/// Load one persona profile from a YAML file.
///
/// If the file does not set an `id`, the file stem is used.
pub fn load_profile(path: impl AsRef<Path>) -> Result<AgentProfile> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading persona file {}", path.display()))?;
    let mut profile: AgentProfile = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing persona file {}", path.display()))?;

    if profile.id.is_empty() {
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            profile.id = stem.to_string();
        }
    }
    anyhow::ensure!(
        !profile.name.is_empty(),
        "persona file {} has no name",
        path.display()
    );
    Ok(profile)
}

/// Load every `*.yaml`/`*.yml` persona in a directory.
///
/// Files that fail to parse are logged and skipped; a missing directory
/// yields an empty list.
pub fn load_profiles(dir: impl AsRef<Path>) -> Result<Vec<AgentProfile>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        warn!(dir = %dir.display(), "persona directory not found");
        return Ok(Vec::new());
    }

    let mut profiles = Vec::new();
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("reading persona directory {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            )
        })
        .collect();
    entries.sort();

    for path in entries {
        match load_profile(&path) {
            Ok(profile) => {
                info!(agent = %profile.name, file = %path.display(), "loaded persona");
                profiles.push(profile);
            }
            Err(e) => warn!(file = %path.display(), error = %e, "skipping persona"),
        }
    }
    Ok(profiles)
}
