//! Task router
//!
//! Maps one observation to the persona (or set of personas) that should
//! decide on it. Rankings always read the registry and ledger fresh, so a
//! suspension takes effect on the very next route.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ImpactSettings;
use crate::ledger::PerformanceLedger;
use crate::persona::{Persona, PersonaRegistry, PersonaRole};
use crate::types::{ImpactTier, Observation};

/// Success rate assumed for personas without history
pub const NEUTRAL_SUCCESS_RATE: f64 = 0.5;

/// Why an observation needs more than one persona
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationReason {
    /// Tier reached the domain's coordination tier
    ImpactTier,
    /// Amount exceeded the domain's high-impact threshold
    HighImpactAmount,
    /// Tags matched the configured compliance tags
    ComplianceTags,
    /// The best-ranked persona lacks authority for the tier
    InsufficientAuthority,
}

impl fmt::Display for CoordinationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CoordinationReason::ImpactTier => "impact_tier",
            CoordinationReason::HighImpactAmount => "high_impact_amount",
            CoordinationReason::ComplianceTags => "compliance_tags",
            CoordinationReason::InsufficientAuthority => "insufficient_authority",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoutingDecision {
    /// A single persona decides alone
    Assigned { persona_id: String, tier: ImpactTier },
    /// A coordination session decides
    RequiresCoordination {
        /// Ranked candidates followed by added compliance/escalation personas
        candidates: Vec<String>,
        tier: ImpactTier,
        reasons: Vec<CoordinationReason>,
    },
    /// Nobody can take it this cycle
    Unroutable { reason: String },
}

impl RoutingDecision {
    pub fn tier(&self) -> Option<ImpactTier> {
        match self {
            RoutingDecision::Assigned { tier, .. } | RoutingDecision::RequiresCoordination { tier, .. } => {
                Some(*tier)
            }
            RoutingDecision::Unroutable { .. } => None,
        }
    }
}

/// A persona scored for one observation
#[derive(Debug, Clone)]
struct Ranked {
    persona: Persona,
    sufficient: bool,
    success_rate: f64,
}

fn rank(a: &Ranked, b: &Ranked) -> Ordering {
    b.sufficient
        .cmp(&a.sufficient)
        .then_with(|| {
            b.success_rate
                .partial_cmp(&a.success_rate)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.persona.id.cmp(&b.persona.id))
}

pub struct TaskRouter {
    registry: Arc<PersonaRegistry>,
    ledger: Arc<PerformanceLedger>,
    impact: ImpactSettings,
}

impl TaskRouter {
    pub fn new(
        registry: Arc<PersonaRegistry>,
        ledger: Arc<PerformanceLedger>,
        impact: ImpactSettings,
    ) -> Self {
        Self {
            registry,
            ledger,
            impact,
        }
    }

    /// Estimate the impact tier of an observation under this router's thresholds
    pub fn estimate_tier(&self, observation: &Observation) -> ImpactTier {
        let domain = self.impact.for_domain(observation.domain);
        ImpactTier::estimate(observation, domain.high_impact_amount)
    }

    pub fn route(&self, observation: &Observation) -> RoutingDecision {
        let active = self.registry.list_active(None);
        let tier = self.estimate_tier(observation);
        let domain = self.impact.for_domain(observation.domain);

        let mut ranked: Vec<Ranked> = active
            .iter()
            .filter(|p| p.matches_any(&observation.tags))
            .map(|p| Ranked {
                persona: p.clone(),
                sufficient: p.can_approve(tier),
                success_rate: self
                    .ledger
                    .success_rate(&p.id)
                    .unwrap_or(NEUTRAL_SUCCESS_RATE),
            })
            .collect();

        if ranked.is_empty() {
            return RoutingDecision::Unroutable {
                reason: format!(
                    "no active persona with expertise in [{}]",
                    observation.tags.iter().cloned().collect::<Vec<_>>().join(", ")
                ),
            };
        }

        ranked.sort_by(rank);
        let top = &ranked[0];

        let mut reasons = Vec::new();
        if tier >= domain.coordination_tier {
            reasons.push(CoordinationReason::ImpactTier);
        }
        if let (Some(amount), Some(threshold)) = (observation.amount, domain.high_impact_amount) {
            if amount > threshold {
                reasons.push(CoordinationReason::HighImpactAmount);
            }
        }
        if observation
            .tags
            .iter()
            .any(|t| self.impact.coordination_tags.contains(t))
        {
            reasons.push(CoordinationReason::ComplianceTags);
        }
        if !top.sufficient {
            reasons.push(CoordinationReason::InsufficientAuthority);
        }

        if reasons.is_empty() {
            debug!(
                observation_id = %observation.id,
                persona_id = %top.persona.id,
                %tier,
                "Routed to single persona"
            );
            return RoutingDecision::Assigned {
                persona_id: top.persona.id.clone(),
                tier,
            };
        }

        let mut candidates: Vec<String> = ranked.iter().map(|r| r.persona.id.clone()).collect();
        let mut seen: BTreeSet<String> = candidates.iter().cloned().collect();

        if self.impact.include_compliance {
            for persona in active.iter().filter(|p| p.role == PersonaRole::Compliance) {
                if seen.insert(persona.id.clone()) {
                    candidates.push(persona.id.clone());
                }
            }
        }

        // Escalate to the most senior persona able to approve the tier
        let has_sufficient = candidates
            .iter()
            .filter_map(|id| active.iter().find(|p| &p.id == id))
            .any(|p| p.can_approve(tier));
        if !has_sufficient {
            if let Some(target) = active.iter().find(|p| p.can_approve(tier)) {
                if seen.insert(target.id.clone()) {
                    candidates.push(target.id.clone());
                }
            }
        }

        if candidates.len() >= 2 {
            debug!(
                observation_id = %observation.id,
                candidates = ?candidates,
                %tier,
                reasons = ?reasons,
                "Observation requires coordination"
            );
            return RoutingDecision::RequiresCoordination {
                candidates,
                tier,
                reasons,
            };
        }

        // A lone candidate may still decide if its authority suffices
        let only = &candidates[0];
        match active.iter().find(|p| &p.id == only) {
            Some(persona) if persona.can_approve(tier) => RoutingDecision::Assigned {
                persona_id: persona.id.clone(),
                tier,
            },
            _ => RoutingDecision::Unroutable {
                reason: format!(
                    "coordination required ({}) but only {} is available without authority for {} impact",
                    reasons
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", "),
                    only,
                    tier
                ),
            },
        }
    }
}
