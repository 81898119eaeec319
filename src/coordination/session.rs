//! Coordination session state machine
//!
//! `Initiated -> Deliberating -> Resolving -> Resolved | Cancelled`. A session
//! ends in exactly one outcome; once every participant has submitted it
//! resolves immediately.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::persona::{Persona, PersonaRole};
use crate::types::{ImpactTier, Position};

use super::resolve::{resolve_positions, ResolutionRule, SessionOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    HighImpact,
    ComplianceReview,
    TopicConflict,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionKind::HighImpact => "high_impact",
            SessionKind::ComplianceReview => "compliance_review",
            SessionKind::TopicConflict => "topic_conflict",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Initiated,
    Deliberating,
    Resolving,
    Resolved,
    Cancelled,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Resolved | SessionPhase::Cancelled)
    }
}

/// Persisted lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Cancelled,
}

/// A participant as seen when the session opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub persona_id: String,
    pub role: PersonaRole,
    pub authority_level: u8,
}

impl From<&Persona> for Participant {
    fn from(persona: &Persona) -> Self {
        Self {
            persona_id: persona.id.clone(),
            role: persona.role,
            authority_level: persona.authority_level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationSession {
    pub id: String,
    pub cycle_id: String,
    pub kind: SessionKind,
    pub topic: String,
    pub observation_id: String,
    pub tier: ImpactTier,
    /// Ordered by descending authority, then id
    pub participants: Vec<Participant>,
    pub positions: BTreeMap<String, Position>,
    pub phase: SessionPhase,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SessionOutcome>,
    pub opened_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl CoordinationSession {
    pub fn open(
        cycle_id: impl Into<String>,
        kind: SessionKind,
        topic: impl Into<String>,
        observation_id: impl Into<String>,
        tier: ImpactTier,
        mut participants: Vec<Participant>,
    ) -> Self {
        participants.sort_by(|a, b| {
            b.authority_level
                .cmp(&a.authority_level)
                .then_with(|| a.persona_id.cmp(&b.persona_id))
        });
        participants.dedup_by(|a, b| a.persona_id == b.persona_id);

        Self {
            id: Uuid::new_v4().to_string(),
            cycle_id: cycle_id.into(),
            kind,
            topic: topic.into(),
            observation_id: observation_id.into(),
            tier,
            participants,
            positions: BTreeMap::new(),
            phase: SessionPhase::Initiated,
            status: SessionStatus::Active,
            outcome: None,
            opened_at: Utc::now(),
            closed_at: None,
        }
    }

    fn invalid(&self, message: impl Into<String>) -> Error {
        Error::InvalidSession {
            session_id: self.id.clone(),
            message: message.into(),
        }
    }

    pub fn is_participant(&self, persona_id: &str) -> bool {
        self.participants.iter().any(|p| p.persona_id == persona_id)
    }

    /// Participants that have not submitted yet
    pub fn pending(&self) -> Vec<&Participant> {
        self.participants
            .iter()
            .filter(|p| !self.positions.contains_key(&p.persona_id))
            .collect()
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn begin_deliberation(&mut self) -> Result<()> {
        if self.phase != SessionPhase::Initiated {
            return Err(self.invalid(format!("cannot deliberate from {:?}", self.phase)));
        }
        self.phase = SessionPhase::Deliberating;
        Ok(())
    }

    /// Submit a participant's position. Resolves once all have submitted.
    pub fn submit(&mut self, position: Position) -> Result<()> {
        if self.phase != SessionPhase::Deliberating {
            return Err(self.invalid(format!("not accepting positions in {:?}", self.phase)));
        }
        if !self.is_participant(&position.persona_id) {
            return Err(self.invalid(format!("{} is not a participant", position.persona_id)));
        }
        if self.positions.contains_key(&position.persona_id) {
            return Err(self.invalid(format!("{} already submitted", position.persona_id)));
        }

        self.positions.insert(position.persona_id.clone(), position);
        if self.pending().is_empty() {
            self.resolve()?;
        }
        Ok(())
    }

    /// Resolve from the positions submitted so far
    pub fn resolve(&mut self) -> Result<&SessionOutcome> {
        if self.phase != SessionPhase::Deliberating {
            return Err(self.invalid(format!("cannot resolve from {:?}", self.phase)));
        }
        self.phase = SessionPhase::Resolving;
        Ok(self.finish())
    }

    /// Resolve regardless of phase; missing positions count as abstentions.
    /// A terminal session keeps its outcome.
    pub fn force_resolve(&mut self) -> SessionOutcome {
        if self.is_terminal() {
            if let Some(outcome) = self.outcome.clone() {
                return outcome;
            }
        }
        self.phase = SessionPhase::Resolving;
        self.finish().clone()
    }

    fn finish(&mut self) -> &SessionOutcome {
        let positions: Vec<Position> = self.positions.values().cloned().collect();
        let outcome = resolve_positions(&self.participants, &positions);

        let approved = outcome.is_approved();
        self.phase = if approved {
            SessionPhase::Resolved
        } else {
            SessionPhase::Cancelled
        };
        self.status = if approved {
            SessionStatus::Completed
        } else {
            SessionStatus::Cancelled
        };
        self.closed_at = Some(Utc::now());
        self.outcome.insert(outcome)
    }

    /// Rule that closed the session, if closed
    pub fn rule(&self) -> Option<ResolutionRule> {
        self.outcome.as_ref().map(SessionOutcome::rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionKind, Decision};

    fn session() -> CoordinationSession {
        CoordinationSession::open(
            "c1",
            SessionKind::HighImpact,
            "payout:w1",
            "o1",
            ImpactTier::High,
            vec![
                Participant {
                    persona_id: "tech".into(),
                    role: PersonaRole::Technical,
                    authority_level: 8,
                },
                Participant {
                    persona_id: "exec".into(),
                    role: PersonaRole::Executive,
                    authority_level: 9,
                },
            ],
        )
    }

    fn position(id: &str) -> Position {
        Position {
            persona_id: id.into(),
            decision: Decision::new(ActionKind::RewardTransfer, "pay"),
            confidence: 0.8,
            reasoning: String::new(),
            veto: false,
        }
    }

    #[test]
    fn test_participants_ordered_by_authority() {
        let s = session();
        assert_eq!(s.participants[0].persona_id, "exec");
        assert_eq!(s.status, SessionStatus::Active);
    }

    #[test]
    fn test_submit_requires_deliberation() {
        let mut s = session();
        assert!(s.submit(position("tech")).is_err());
        s.begin_deliberation().unwrap();
        assert!(s.begin_deliberation().is_err());
        s.submit(position("tech")).unwrap();
    }

    #[test]
    fn test_rejects_outsider_and_duplicate() {
        let mut s = session();
        s.begin_deliberation().unwrap();
        assert!(s.submit(position("stranger")).is_err());
        s.submit(position("tech")).unwrap();
        assert!(s.submit(position("tech")).is_err());
        assert_eq!(s.phase, SessionPhase::Deliberating);
    }

    #[test]
    fn test_resolves_when_all_submitted() {
        let mut s = session();
        s.begin_deliberation().unwrap();
        s.submit(position("tech")).unwrap();
        s.submit(position("exec")).unwrap();
        assert_eq!(s.phase, SessionPhase::Resolved);
        assert_eq!(s.status, SessionStatus::Completed);
        assert_eq!(s.rule(), Some(ResolutionRule::ExecutiveOverride));
        assert!(s.closed_at.is_some());
    }

    #[test]
    fn test_force_resolve_with_abstention() {
        let mut s = session();
        s.begin_deliberation().unwrap();
        s.submit(position("tech")).unwrap();
        let outcome = s.force_resolve();
        assert_eq!(outcome.rule(), ResolutionRule::SinglePosition);
        assert!(s.submit(position("exec")).is_err());
    }

    #[test]
    fn test_force_resolve_empty_cancels() {
        let mut s = session();
        assert_eq!(s.force_resolve().rule(), ResolutionRule::NoQuorum);
        assert_eq!(s.phase, SessionPhase::Cancelled);
        assert_eq!(s.status, SessionStatus::Cancelled);
    }

    #[test]
    fn test_force_resolve_is_idempotent() {
        let mut s = session();
        s.begin_deliberation().unwrap();
        s.submit(position("tech")).unwrap();
        s.submit(position("exec")).unwrap();
        let first = s.outcome.clone();
        s.force_resolve();
        assert_eq!(s.outcome, first);
    }
}
