//! Collaborator trait definitions
//!
//! The daemon talks to the outside world through four seams: a reasoning
//! service, one connector per domain, one executor per action kind and a
//! notification sink. All are object-safe and shared as `Arc<dyn _>`.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::coordination::SessionKind;
use crate::error::Result;
use crate::persona::{Persona, PersonaRole};
use crate::scheduler::CycleSummary;
use crate::types::{
    ActionKind, Decision, DecisionRecord, Domain, ImpactTier, Observation, ReasoningOutput,
};

// ─────────────────────────────────────────────────────────────────
// Reasoning contexts
// ─────────────────────────────────────────────────────────────────

/// What the reasoning service knows about the persona it speaks for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaContext {
    pub persona_id: String,
    pub name: String,
    pub role: PersonaRole,
    pub authority_level: u8,
    pub expertise: BTreeSet<String>,
    /// Named trait scores, 1-10
    pub traits: Vec<(String, u8)>,
    pub communication_style: String,
    pub focus_areas: Vec<String>,
}

impl From<&Persona> for PersonaContext {
    fn from(persona: &Persona) -> Self {
        Self {
            persona_id: persona.id.clone(),
            name: persona.name.clone(),
            role: persona.role,
            authority_level: persona.authority_level,
            expertise: persona.expertise.clone(),
            traits: persona
                .traits
                .scores()
                .into_iter()
                .map(|(name, score)| (name.to_string(), score))
                .collect(),
            communication_style: persona.communication_style.clone(),
            focus_areas: persona
                .role
                .focus_areas()
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// The observation under consideration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationContext {
    pub cycle_id: String,
    pub observation: Observation,
    pub tier: ImpactTier,
    /// Set when the persona answers inside a coordination session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_kind: Option<SessionKind>,
    /// The persona's own earlier decisions, newest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_decisions: Vec<DecisionRecord>,
}

/// A decision cleared for execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovedAction {
    pub cycle_id: String,
    pub topic: String,
    pub domain: Domain,
    pub observation_id: String,
    pub decision: Decision,
    /// Personas the decision is attributed to, deciding persona first
    pub persona_ids: Vec<String>,
    pub tier: ImpactTier,
}

// ─────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────

/// Produces a persona's decision on one observation. Must be safe to call
/// concurrently.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    fn name(&self) -> &'static str;

    async fn reason(
        &self,
        persona: &PersonaContext,
        observation: &ObservationContext,
    ) -> Result<ReasoningOutput>;
}

/// Polls one domain for fresh observations
#[async_trait]
pub trait Connector: Send + Sync {
    fn domain(&self) -> Domain;

    async fn poll(&self) -> Result<Vec<Observation>>;
}

/// Carries out one kind of approved action
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    fn kind(&self) -> ActionKind;

    /// Execute and return the executor's receipt
    async fn execute(&self, action: &ApprovedAction) -> Result<serde_json::Value>;
}

/// Receives the end-of-cycle summary
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, summary: &CycleSummary) -> Result<()>;
}

pub type SharedReasoning = Arc<dyn ReasoningService>;
pub type SharedConnector = Arc<dyn Connector>;
pub type SharedExecutor = Arc<dyn ActionExecutor>;
pub type SharedSink = Arc<dyn NotificationSink>;
