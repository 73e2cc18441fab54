//! Response-probability scoring.
//!
//! The score is a probability of inclusion, not a hard rank: the scheduler
//! draws `rng < score` per agent per round. Kept here as a pure function so
//! it is trivially testable and the scheduler stays in charge of selection.

use std::time::Duration;

use crate::agent::AgentProfile;
use crate::message::Message;

/// Upper bound for a non-mention score.
const SCORE_CAP: f64 = 0.8;
/// Upper bound for a mention score.
const MENTION_CAP: f64 = 0.95;

/// Probability that `profile` should respond to `message`.
///
/// `last_spoke` is how long ago the agent last spoke (`None` if never).
///
/// - base is `response_tendency * 0.3`
/// - a direct mention short-circuits to `min(0.95, base + 0.6)`
/// - a question mark in the content adds 0.15
/// - an interest keyword appearing in the content adds 0.10, at most once
/// - having spoken < 10 s ago multiplies by 0.3; < 30 s ago by 0.6
/// - the result is capped at 0.8
pub fn response_score(
    profile: &AgentProfile,
    last_spoke: Option<Duration>,
    message: &Message,
) -> f64 {
    let mut base = profile.response_tendency * 0.3;

    // Direct mention dominates everything else.
    if message.mentions_name(&profile.name) {
        return (base + 0.6).min(MENTION_CAP);
    }

    if message.content.contains('?') {
        base += 0.15;
    }

    let content_lower = message.content.to_lowercase();
    if profile
        .interests
        .iter()
        .any(|i| !i.is_empty() && content_lower.contains(&i.to_lowercase()))
    {
        base += 0.10;
    }

    if let Some(ago) = last_spoke {
        if ago < Duration::from_secs(10) {
            base *= 0.3;
        } else if ago < Duration::from_secs(30) {
            base *= 0.6;
        }
    }

    base.min(SCORE_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentProfile;

    fn msg(content: &str) -> Message {
        Message::chat("sender", "Sender", content, "general")
    }

    fn profile(tendency: f64) -> AgentProfile {
        AgentProfile::named("Alice").with_tendency(tendency)
    }

    #[test]
    fn test_base_from_tendency() {
        let score = response_score(&profile(0.5), None, &msg("hello there"));
        assert!((score - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_mention_short_circuit() {
        // tendency 0.5, no recency: base 0.15, mention adds 0.6 -> 0.75
        let score = response_score(&profile(0.5), None, &msg("hey @Alice"));
        assert!((score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_mention_capped_at_095() {
        let score = response_score(&profile(1.0), None, &msg("hey @alice, thoughts?"));
        // base 0.3 + 0.6 = 0.9, still under the 0.95 cap
        assert!((score - 0.9).abs() < 1e-9);

        let mut p = profile(1.0);
        p.response_tendency = 1.5; // out-of-range tendency still capped
        let score = response_score(&p, None, &msg("@Alice"));
        assert!((score - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_mention_ignores_recency_and_question() {
        // Short-circuit: recency multipliers do not apply to mentions.
        let fresh = response_score(&profile(0.5), None, &msg("@Alice?"));
        let recent = response_score(&profile(0.5), Some(Duration::from_secs(5)), &msg("@Alice?"));
        assert_eq!(fresh, recent);
        assert!((fresh - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_question_boost() {
        let score = response_score(&profile(0.5), None, &msg("what do you think?"));
        assert!((score - 0.30).abs() < 1e-9);
    }

    #[test]
    fn test_interest_boost_applied_once() {
        let p = profile(0.5).with_interests(vec!["rust".into(), "chess".into()]);
        let score = response_score(&p, None, &msg("Rust beats chess for fun"));
        // 0.15 + 0.10, not + 0.20
        assert!((score - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_interest_case_insensitive() {
        let p = profile(0.5).with_interests(vec!["Rust".into()]);
        let score = response_score(&p, None, &msg("i love rust"));
        assert!((score - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_recency_suppression_exact_factors() {
        let m = msg("hello");
        let baseline = response_score(&profile(0.9), None, &m);
        let at_5s = response_score(&profile(0.9), Some(Duration::from_secs(5)), &m);
        let at_20s = response_score(&profile(0.9), Some(Duration::from_secs(20)), &m);
        let at_40s = response_score(&profile(0.9), Some(Duration::from_secs(40)), &m);

        assert!((at_5s - baseline * 0.3).abs() < 1e-9);
        assert!((at_20s - baseline * 0.6).abs() < 1e-9);
        assert!((at_40s - baseline).abs() < 1e-9);
    }

    #[test]
    fn test_capped_at_08() {
        let mut p = profile(1.0).with_interests(vec!["x".into()]);
        p.response_tendency = 3.0;
        let score = response_score(&p, None, &msg("x?"));
        assert!((score - 0.8).abs() < 1e-9);
    }
}
