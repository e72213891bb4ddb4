//! In-memory collaborators for tests and the console binary

use crate::engine::{CallEngine, EngineOperation};
use crate::error::{EngineError, GrammarError};
use crate::grammar::{Grammar, MatchResult, Matcher};
use crate::transport::Transport;
use parking_lot::Mutex;
use rayo_actors::{Actor, ActorBehavior, Message};
use rayo_types::Stanza;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Transport that keeps everything it is asked to send
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, Stanza)>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything sent so far
    pub fn take(&self) -> Vec<(String, Stanza)> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Stanzas sent to one peer address, oldest first
    pub fn sent_to(&self, address: &str) -> Vec<Stanza> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| to == address)
            .map(|(_, stanza)| stanza.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, peer_address: &str, stanza: &Stanza) {
        self.sent.lock().push((peer_address.to_string(), stanza.clone()));
    }
}

/// Engine that accepts everything unless told to refuse an operation
#[derive(Debug, Default)]
pub struct RecordingEngine {
    operations: Mutex<Vec<EngineOperation>>,
    failures: Mutex<HashMap<&'static str, EngineError>>,
    executed: AtomicU64,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every operation named `operation` with `error`
    pub fn fail(&self, operation: &'static str, error: EngineError) {
        self.failures.lock().insert(operation, error);
    }

    pub fn succeed(&self, operation: &'static str) {
        self.failures.lock().remove(operation);
    }

    pub fn take_operations(&self) -> Vec<EngineOperation> {
        std::mem::take(&mut *self.operations.lock())
    }

    pub fn operations(&self) -> Vec<EngineOperation> {
        self.operations.lock().clone()
    }

    /// Names of recorded operations, in order
    pub fn names(&self) -> Vec<&'static str> {
        self.operations.lock().iter().map(EngineOperation::name).collect()
    }

    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }
}

impl CallEngine for RecordingEngine {
    fn execute(&self, operation: EngineOperation) -> Result<(), EngineError> {
        if let Some(error) = self.failures.lock().get(operation.name()) {
            return Err(error.clone());
        }
        self.executed.fetch_add(1, Ordering::Relaxed);
        self.operations.lock().push(operation);
        Ok(())
    }
}

/// Grammar of comma-separated literal choices, e.g. `"1,2,12#"`
#[derive(Debug, Default, Clone, Copy)]
pub struct LiteralGrammar;

struct LiteralMatcher {
    choices: Vec<String>,
}

impl Grammar for LiteralGrammar {
    fn compile(&self, text: &str) -> Result<Box<dyn Matcher>, GrammarError> {
        let choices: Vec<String> = text
            .split(',')
            .map(str::trim)
            .filter(|choice| !choice.is_empty())
            .map(str::to_string)
            .collect();
        if choices.is_empty() {
            return Err(GrammarError::Empty);
        }
        if let Some(bad) = choices.iter().find(|c| !c.chars().all(|d| d.is_ascii_digit() || d == '*' || d == '#')) {
            return Err(GrammarError::Invalid {
                reason: format!("'{}' is not a DTMF string", bad),
            });
        }
        Ok(Box::new(LiteralMatcher { choices }))
    }
}

impl Matcher for LiteralMatcher {
    fn matches(&self, input: &str) -> MatchResult {
        let exact = self.choices.iter().any(|choice| choice == input);
        let longer = self
            .choices
            .iter()
            .any(|choice| choice.len() > input.len() && choice.starts_with(input));
        match (exact, longer) {
            (true, false) => MatchResult::MatchEnd {
                interpretation: Some(input.to_string()),
            },
            (true, true) => MatchResult::Match {
                interpretation: Some(input.to_string()),
            },
            (false, true) => MatchResult::Partial,
            (false, false) => MatchResult::NoMatch,
        }
    }
}

/// Behavior that swallows everything; stands in for actors a test only
/// needs registered
#[derive(Debug, Default)]
pub struct Inert;

impl ActorBehavior for Inert {
    fn receive(&mut self, _actor: &Arc<Actor>, _msg: Message) {}
}

/// Behavior that keeps every message it receives
#[derive(Debug, Default, Clone)]
pub struct Collector {
    received: Arc<Mutex<Vec<Message>>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything received so far
    pub fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.received.lock())
    }
}

impl ActorBehavior for Collector {
    fn receive(&mut self, _actor: &Arc<Actor>, msg: Message) {
        self.received.lock().push(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_grammar() {
        let matcher = LiteralGrammar.compile("1, 12#").unwrap();
        assert_eq!(matcher.matches("2"), MatchResult::NoMatch);
        assert_eq!(matcher.matches("12"), MatchResult::Partial);
        assert!(matches!(matcher.matches("1"), MatchResult::Match { .. }));
        assert!(matches!(matcher.matches("12#"), MatchResult::MatchEnd { .. }));

        assert!(matches!(LiteralGrammar.compile(" , "), Err(GrammarError::Empty)));
        assert!(matches!(
            LiteralGrammar.compile("yes"),
            Err(GrammarError::Invalid { .. })
        ));
    }

    #[test]
    fn test_recording_engine_failures() {
        let engine = RecordingEngine::new();
        engine.fail("bridge", EngineError::Unavailable("busy".into()));
        let bridge = EngineOperation::Bridge {
            uuid: "a".into(),
            peer: "b".into(),
        };
        assert!(engine.execute(bridge.clone()).is_err());
        engine.succeed("bridge");
        assert!(engine.execute(bridge).is_ok());
        assert_eq!(engine.names(), vec!["bridge"]);
    }
}
