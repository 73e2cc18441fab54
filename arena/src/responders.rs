//! Deterministic [`Responder`] implementations.
//!
//! These stand in for the real language-model adapter in the CLI demo and in
//! tests. They honor the `[PASS]` convention: a scripted line of exactly
//! `[PASS]` means "say nothing this turn".

use std::sync::Mutex;

use async_trait::async_trait;

use crate::agent::Responder;

/// Scripted line meaning "pass, say nothing".
pub const PASS_LINE: &str = "[PASS]";

/// Cycles through a fixed list of lines, one per invocation.
pub struct ScriptedResponder {
    lines: Vec<String>,
    next: Mutex<usize>,
    /// Rendered context strings seen by `respond`, in call order.
    contexts: Mutex<Vec<String>>,
}

impl ScriptedResponder {
    pub fn new(lines: Vec<String>) -> Self {
        Self {
            lines,
            next: Mutex::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Single line repeated forever.
    pub fn repeating(line: impl Into<String>) -> Self {
        Self::new(vec![line.into()])
    }

    /// Context strings received so far (useful for asserting what a speaker
    /// saw when it was invoked).
    pub fn seen_contexts(&self) -> Vec<String> {
        self.contexts.lock().expect("contexts lock").clone()
    }
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn connect(&self) -> anyhow::Result<()> {
        *self.next.lock().expect("cursor lock") = 0;
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn respond(&self, context: &str) -> anyhow::Result<Option<String>> {
        self.contexts
            .lock()
            .expect("contexts lock")
            .push(context.to_string());

        if self.lines.is_empty() {
            return Ok(None);
        }
        let line = {
            let mut next = self.next.lock().expect("cursor lock");
            let line = self.lines[*next % self.lines.len()].clone();
            *next += 1;
            line
        };
        if line == PASS_LINE {
            Ok(None)
        } else {
            Ok(Some(line))
        }
    }
}

/// Always passes. Useful for agents that should be present but quiet.
#[derive(Default)]
pub struct SilentResponder;

#[async_trait]
impl Responder for SilentResponder {
    async fn connect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn respond(&self, _context: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_cycles() {
        let r = ScriptedResponder::new(vec!["a".into(), "b".into()]);
        assert_eq!(r.respond("c1").await.unwrap().as_deref(), Some("a"));
        assert_eq!(r.respond("c2").await.unwrap().as_deref(), Some("b"));
        assert_eq!(r.respond("c3").await.unwrap().as_deref(), Some("a"));
        assert_eq!(r.seen_contexts(), vec!["c1", "c2", "c3"]);
    }

    #[tokio::test]
    async fn test_pass_line() {
        let r = ScriptedResponder::new(vec![PASS_LINE.into(), "hi".into()]);
        assert_eq!(r.respond("c").await.unwrap(), None);
        assert_eq!(r.respond("c").await.unwrap().as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_silent_passes() {
        let r = SilentResponder;
        assert_eq!(r.respond("c").await.unwrap(), None);
    }
}
