//! Mock collaborators
//!
//! Deterministic, scriptable stand-ins for the reasoning service, connectors,
//! executors and notification sink. Used by the `mock` reasoning provider and
//! throughout the tests.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::scheduler::CycleSummary;
use crate::types::{ActionKind, Decision, Domain, Observation, ReasoningOutput};

use super::{
    ActionExecutor, ApprovedAction, Connector, NotificationSink, ObservationContext, PersonaContext,
    ReasoningService,
};

/// Matches any topic in a script key
pub const ANY_TOPIC: &str = "*";

// ─────────────────────────────────────────────────────────────────
// Mock Reasoning
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Script {
    Reply(ReasoningOutput),
    Fail(String),
}

/// Scripted reasoning service.
///
/// Lookup order: exact `(persona, topic)`, then `(persona, ANY_TOPIC)`, then
/// the default reply. Replies to a requested action default to that action.
pub struct MockReasoning {
    scripts: RwLock<HashMap<(String, String), Script>>,
    delays: RwLock<HashMap<String, Duration>>,
    default_confidence: f64,
    calls: RwLock<Vec<(String, ObservationContext)>>,
}

impl MockReasoning {
    pub fn new() -> Self {
        Self {
            scripts: RwLock::new(HashMap::new()),
            delays: RwLock::new(HashMap::new()),
            default_confidence: 0.6,
            calls: RwLock::new(Vec::new()),
        }
    }

    pub fn reply(&self, persona_id: &str, topic: &str, output: ReasoningOutput) -> &Self {
        self.scripts
            .write()
            .insert((persona_id.to_string(), topic.to_string()), Script::Reply(output));
        self
    }

    pub fn fail(&self, persona_id: &str, topic: &str, message: &str) -> &Self {
        self.scripts.write().insert(
            (persona_id.to_string(), topic.to_string()),
            Script::Fail(message.to_string()),
        );
        self
    }

    /// Delay every answer from `persona_id`
    pub fn delay(&self, persona_id: &str, delay: Duration) -> &Self {
        self.delays.write().insert(persona_id.to_string(), delay);
        self
    }

    /// Number of calls made for a persona
    pub fn call_count(&self, persona_id: &str) -> usize {
        self.calls.read().iter().filter(|(p, _)| p == persona_id).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.read().len()
    }

    /// Contexts a persona was asked with, in call order
    pub fn contexts_for(&self, persona_id: &str) -> Vec<ObservationContext> {
        self.calls
            .read()
            .iter()
            .filter(|(p, _)| p == persona_id)
            .map(|(_, ctx)| ctx.clone())
            .collect()
    }

    pub fn reset_counts(&self) {
        self.calls.write().clear();
    }

    fn lookup(&self, persona_id: &str, topic: &str) -> Option<Script> {
        let scripts = self.scripts.read();
        scripts
            .get(&(persona_id.to_string(), topic.to_string()))
            .or_else(|| scripts.get(&(persona_id.to_string(), ANY_TOPIC.to_string())))
            .cloned()
    }

    fn default_reply(&self, observation: &Observation) -> ReasoningOutput {
        let decision = match observation.requested_action {
            Some(action) if action.is_executable() => {
                Decision::new(action, format!("{} on {}", action, observation.topic))
            }
            _ => Decision::no_action(format!("nothing to do on {}", observation.topic)),
        };
        ReasoningOutput::new(decision, self.default_confidence, "default mock reply")
    }
}

impl Default for MockReasoning {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReasoningService for MockReasoning {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn reason(
        &self,
        persona: &PersonaContext,
        observation: &ObservationContext,
    ) -> Result<ReasoningOutput> {
        let topic = observation.observation.topic.clone();
        self.calls
            .write()
            .push((persona.persona_id.clone(), observation.clone()));

        let delay = self.delays.read().get(&persona.persona_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.lookup(&persona.persona_id, &topic) {
            Some(Script::Reply(output)) => Ok(output),
            Some(Script::Fail(message)) => Err(Error::reasoning_failure(message)),
            None => Ok(self.default_reply(&observation.observation)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Scripted Connector
// ─────────────────────────────────────────────────────────────────

pub struct ScriptedConnector {
    domain: Domain,
    observations: RwLock<Vec<Observation>>,
    delay: Option<Duration>,
    failing: bool,
    polls: RwLock<u32>,
}

impl ScriptedConnector {
    pub fn new(domain: Domain, observations: Vec<Observation>) -> Self {
        Self {
            domain,
            observations: RwLock::new(observations),
            delay: None,
            failing: false,
            polls: RwLock::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Replace what the next poll returns
    pub fn set_observations(&self, observations: Vec<Observation>) {
        *self.observations.write() = observations;
    }

    pub fn poll_count(&self) -> u32 {
        *self.polls.read()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    fn domain(&self) -> Domain {
        self.domain
    }

    async fn poll(&self) -> Result<Vec<Observation>> {
        *self.polls.write() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(Error::connector_unavailable(self.domain, "scripted failure"));
        }
        Ok(self.observations.read().clone())
    }
}

// ─────────────────────────────────────────────────────────────────
// Recording Executor & Sink
// ─────────────────────────────────────────────────────────────────

pub struct RecordingExecutor {
    kind: ActionKind,
    executed: RwLock<Vec<ApprovedAction>>,
    failing_topics: RwLock<HashSet<String>>,
}

impl RecordingExecutor {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            executed: RwLock::new(Vec::new()),
            failing_topics: RwLock::new(HashSet::new()),
        }
    }

    pub fn fail_topic(&self, topic: &str) {
        self.failing_topics.write().insert(topic.to_string());
    }

    pub fn executed(&self) -> Vec<ApprovedAction> {
        self.executed.read().clone()
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    fn kind(&self) -> ActionKind {
        self.kind
    }

    async fn execute(&self, action: &ApprovedAction) -> Result<serde_json::Value> {
        self.executed.write().push(action.clone());
        if self.failing_topics.read().contains(&action.topic) {
            return Err(Error::execution_failure(
                self.kind.as_str(),
                &action.topic,
                "scripted failure",
            ));
        }
        Ok(serde_json::json!({ "recorded": true }))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    summaries: RwLock<Vec<CycleSummary>>,
    delay: Option<Duration>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every send for `delay` before recording it
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn summaries(&self) -> Vec<CycleSummary> {
        self.summaries.read().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, summary: &CycleSummary) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.summaries.write().push(summary.clone());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
