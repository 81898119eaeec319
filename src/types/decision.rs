//! Decision, position and decision-history types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::ActionKind;

/// A candidate or approved decision on one topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: ActionKind,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub summary: String,
}

impl Decision {
    pub fn new(action: ActionKind, summary: impl Into<String>) -> Self {
        Self {
            action,
            payload: serde_json::Value::Null,
            summary: summary.into(),
        }
    }

    pub fn no_action(summary: impl Into<String>) -> Self {
        Self::new(ActionKind::NoAction, summary)
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Same action with the same parameters; free-text summaries may differ
    pub fn agrees_with(&self, other: &Decision) -> bool {
        self.action == other.action && self.payload == other.payload
    }
}

/// What the reasoning service returns for one persona and one observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningOutput {
    pub decision: Decision,
    /// Confidence in 0.0..=1.0
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    /// Request to block the decision; only honoured from compliance personas
    #[serde(default)]
    pub veto: bool,
}

impl ReasoningOutput {
    pub fn new(decision: Decision, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            decision,
            confidence: clamp_confidence(confidence),
            reasoning: reasoning.into(),
            veto: false,
        }
    }

    pub fn with_veto(mut self) -> Self {
        self.veto = true;
        self
    }
}

/// A persona's submitted position in a coordination session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub persona_id: String,
    pub decision: Decision,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub veto: bool,
}

impl Position {
    pub fn from_output(persona_id: impl Into<String>, output: ReasoningOutput) -> Self {
        Self {
            persona_id: persona_id.into(),
            decision: output.decision,
            confidence: clamp_confidence(output.confidence),
            reasoning: output.reasoning,
            veto: output.veto,
        }
    }
}

/// Clamp confidence into 0..=1, mapping NaN to 0
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

// ─────────────────────────────────────────────────────────────────
// Decision History
// ─────────────────────────────────────────────────────────────────

/// How a recorded decision ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Executed,
    ExecutionFailed,
    /// Another persona's position won the session
    Overruled,
    Vetoed,
    NoAction,
    /// Approved by a session that was interrupted before ACT; never executed
    Abandoned,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Executed => "executed",
            OutcomeStatus::ExecutionFailed => "execution_failed",
            OutcomeStatus::Overruled => "overruled",
            OutcomeStatus::Vetoed => "vetoed",
            OutcomeStatus::NoAction => "no_action",
            OutcomeStatus::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable history entry for one persona's decision on one topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: String,
    pub cycle_id: String,
    pub persona_id: String,
    pub topic: String,
    #[serde(default)]
    pub context: serde_json::Value,
    pub decision: Decision,
    #[serde(default)]
    pub reasoning: String,
    pub confidence: f64,
    pub outcome_status: OutcomeStatus,
    #[serde(default)]
    pub outcome_data: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl DecisionRecord {
    /// Deterministic record id: SHA-256 over cycle, topic and persona.
    ///
    /// Replaying RECORD for the same cycle yields the same ids, so the
    /// insert-only store rejects the duplicates.
    pub fn record_id(cycle_id: &str, topic: &str, persona_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(cycle_id.as_bytes());
        hasher.update(b"|");
        hasher.update(topic.as_bytes());
        hasher.update(b"|");
        hasher.update(persona_id.as_bytes());
        hex::encode(hasher.finalize())
    }
}
