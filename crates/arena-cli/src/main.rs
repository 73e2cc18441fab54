//! Terminal front-end: runs a simulation and prints the room IRC-style.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use futures::future::BoxFuture;
use tracing::info;

use arena::{
    load_profiles, Agent, AgentProfile, Arena, ArenaConfig, ArenaEvent, ScheduleMode,
    ScriptedResponder, WILDCARD,
};

#[derive(Parser, Debug)]
#[command(name = "arena", about = "Run a multi-agent chat simulation")]
struct Args {
    /// Directory of persona YAML files.
    #[arg(long, default_value = "personas")]
    agents: PathBuf,

    /// Scheduling mode: turn_based, async, or hybrid.
    #[arg(long, default_value = "hybrid")]
    mode: ScheduleMode,

    /// Seconds between turn-based rounds.
    #[arg(long, default_value_t = 5.0)]
    interval: f64,

    /// Maximum speakers invoked per round.
    #[arg(long, default_value_t = 3)]
    max_speakers: usize,

    /// RNG seed for reproducible speaker selection.
    #[arg(long)]
    seed: Option<u64>,

    /// How long to run, in seconds.
    #[arg(long, default_value_t = 30)]
    duration: u64,

    /// Topic to set on the default channel.
    #[arg(long)]
    topic: Option<String>,

    /// A human message to inject right after startup.
    #[arg(long)]
    inject: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let config = ArenaConfig {
        mode: args.mode,
        round_interval_secs: args.interval,
        max_speakers_per_round: args.max_speakers,
        rng_seed: args.seed,
        ..ArenaConfig::default()
    };
    let arena = Arena::new(config).shared();

    arena.bus().subscribe(WILDCARD, |ev| -> BoxFuture<'static, ()> {
        Box::pin(async move { print_event(ev) })
    });

    if let Some(topic) = &args.topic {
        arena.set_topic("general", topic)?;
    }

    let mut profiles = load_profiles(&args.agents)?;
    if profiles.is_empty() {
        info!("no personas found, using the built-in cast");
        profiles = demo_cast();
    }
    for profile in profiles {
        let responder = ScriptedResponder::new(demo_lines(&profile));
        arena.add_agent(Agent::new(profile, Box::new(responder)), None).await?;
    }

    arena.start();

    if let Some(text) = &args.inject {
        arena.inject_message(text, "Human", None)?;
    }

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.duration)) => {}
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    arena.stop().await;

    let status = arena.get_status();
    info!(
        rounds = status.current_round,
        agents = status.agents.count,
        "simulation finished"
    );
    Ok(())
}

fn print_event(ev: ArenaEvent) {
    match ev {
        ArenaEvent::Message { message, .. } => println!("{}", message.format_irc()),
        ArenaEvent::AgentThinking {
            agent_name,
            thinking: true,
            ..
        } => println!("          ... {agent_name} is typing"),
        ArenaEvent::RoundStarted { round, .. } => {
            tracing::debug!(round, "round started");
        }
        ArenaEvent::SimulationStarted { mode, .. } => println!("=== simulation started ({mode}) ==="),
        ArenaEvent::SimulationStopped { rounds, .. } => {
            println!("=== simulation stopped after {rounds} rounds ===")
        }
        _ => {}
    }
}

/// Built-in personas used when no persona directory is present.
fn demo_cast() -> Vec<AgentProfile> {
    vec![
        AgentProfile::named("Ada")
            .with_tendency(0.8)
            .with_interests(vec!["compilers".into(), "chess".into()]),
        AgentProfile::named("Grace")
            .with_tendency(0.6)
            .with_interests(vec!["networks".into(), "history".into()]),
        AgentProfile::named("Linus")
            .with_tendency(0.4)
            .with_interests(vec!["kernels".into(), "coffee".into()]),
    ]
}

/// Canned chat lines per persona. A real deployment would plug a model
/// adapter in here instead.
fn demo_lines(profile: &AgentProfile) -> Vec<String> {
    let name = &profile.name;
    let mut lines = vec![
        format!("{name} here, settling in."),
        "Interesting point, tell me more.".to_string(),
        arena::PASS_LINE.to_string(),
    ];
    if let Some(interest) = profile.interests.first() {
        lines.push(format!("That reminds me of {interest}, actually."));
    }
    lines
}
