//! Resolution rules for a coordination session.
//!
//! Applied strictly in order over the submitted positions:
//! 1. A veto from a compliance participant cancels the session.
//! 2. A participant whose authority strictly exceeds all others wins.
//! 3. Highest confidence wins; ties go to higher authority, then lower id.
//!
//! One position is approved as-is; no positions means no quorum.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::types::{Decision, Position};

use super::session::Participant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionRule {
    ComplianceVeto,
    ExecutiveOverride,
    HighestConfidence,
    SinglePosition,
    NoQuorum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SessionOutcome {
    Approved {
        decision: Decision,
        /// Winner first, then participants who submitted the same decision
        persona_ids: Vec<String>,
        rule: ResolutionRule,
    },
    Cancelled {
        rule: ResolutionRule,
        /// The vetoing persona, if any
        #[serde(default, skip_serializing_if = "Option::is_none")]
        persona_id: Option<String>,
        reason: String,
    },
}

impl SessionOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, SessionOutcome::Approved { .. })
    }

    pub fn is_vetoed(&self) -> bool {
        matches!(
            self,
            SessionOutcome::Cancelled {
                rule: ResolutionRule::ComplianceVeto,
                ..
            }
        )
    }

    pub fn rule(&self) -> ResolutionRule {
        match self {
            SessionOutcome::Approved { rule, .. } | SessionOutcome::Cancelled { rule, .. } => *rule,
        }
    }
}

/// Resolve submitted positions. Positions from non-participants are ignored.
pub fn resolve_positions(participants: &[Participant], positions: &[Position]) -> SessionOutcome {
    let submitted: Vec<(&Participant, &Position)> = positions
        .iter()
        .filter_map(|pos| {
            participants
                .iter()
                .find(|p| p.persona_id == pos.persona_id)
                .map(|p| (p, pos))
        })
        .collect();

    if submitted.is_empty() {
        return SessionOutcome::Cancelled {
            rule: ResolutionRule::NoQuorum,
            persona_id: None,
            reason: "no positions submitted".to_string(),
        };
    }

    // 1. Compliance veto, lowest id first for a stable attribution
    if let Some((participant, _)) = submitted
        .iter()
        .filter(|(p, pos)| pos.veto && p.role.has_veto())
        .min_by(|a, b| a.0.persona_id.cmp(&b.0.persona_id))
    {
        return SessionOutcome::Cancelled {
            rule: ResolutionRule::ComplianceVeto,
            persona_id: Some(participant.persona_id.clone()),
            reason: format!("vetoed by {}", participant.persona_id),
        };
    }

    if submitted.len() == 1 {
        let (participant, position) = submitted[0];
        return approved(position, &submitted, participant, ResolutionRule::SinglePosition);
    }

    // 2. Executive override
    let max_authority = submitted
        .iter()
        .map(|(p, _)| p.authority_level)
        .max()
        .unwrap_or_default();
    let top: Vec<_> = submitted
        .iter()
        .filter(|(p, _)| p.authority_level == max_authority)
        .collect();
    if let [(participant, position)] = top.as_slice() {
        return approved(position, &submitted, participant, ResolutionRule::ExecutiveOverride);
    }

    // 3. Highest confidence, then authority, then lower id
    let winner = submitted.iter().min_by(|(pa, a), (pb, b)| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
            .then_with(|| pb.authority_level.cmp(&pa.authority_level))
            .then_with(|| pa.persona_id.cmp(&pb.persona_id))
    });

    match winner {
        Some((participant, position)) => {
            approved(position, &submitted, participant, ResolutionRule::HighestConfidence)
        }
        None => SessionOutcome::Cancelled {
            rule: ResolutionRule::NoQuorum,
            persona_id: None,
            reason: "no positions submitted".to_string(),
        },
    }
}

fn approved(
    winner: &Position,
    submitted: &[(&Participant, &Position)],
    participant: &Participant,
    rule: ResolutionRule,
) -> SessionOutcome {
    let mut persona_ids = vec![participant.persona_id.clone()];
    let mut agreeing: Vec<String> = submitted
        .iter()
        .filter(|(p, pos)| {
            p.persona_id != participant.persona_id && pos.decision.agrees_with(&winner.decision)
        })
        .map(|(p, _)| p.persona_id.clone())
        .collect();
    agreeing.sort();
    persona_ids.extend(agreeing);

    SessionOutcome::Approved {
        decision: winner.decision.clone(),
        persona_ids,
        rule,
    }
}
