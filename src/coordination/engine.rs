//! Coordination engine
//!
//! Opens sessions for the routed candidates and collects positions
//! concurrently. Collection is blind: every answer is gathered first and only
//! then submitted, so no persona sees another's position. A participant that
//! fails or misses the deadline abstains.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::persona::{Persona, PersonaRegistry};
use crate::types::{ImpactTier, Observation, Position};

use super::resolve::SessionOutcome;
use super::session::{CoordinationSession, Participant, SessionKind};

/// Produces one persona's position for the session's observation
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn position(&self, persona: &Persona) -> Result<Position>;
}

/// Result of one deliberation round
#[derive(Debug, Clone)]
pub struct Deliberation {
    pub outcome: SessionOutcome,
    /// Response time of each persona that answered during this round
    pub latencies: BTreeMap<String, u64>,
    /// Participants that never submitted
    pub abstained: Vec<String>,
}

pub struct CoordinationEngine {
    registry: Arc<PersonaRegistry>,
    deliberation_timeout: Duration,
}

impl CoordinationEngine {
    pub fn new(registry: Arc<PersonaRegistry>, deliberation_timeout: Duration) -> Self {
        Self {
            registry,
            deliberation_timeout,
        }
    }

    pub fn deliberation_timeout(&self) -> Duration {
        self.deliberation_timeout
    }

    /// Open a session over the active candidates and start deliberation.
    /// Unknown or inactive candidates are left out.
    pub fn open_session(
        &self,
        cycle_id: &str,
        kind: SessionKind,
        observation: &Observation,
        tier: ImpactTier,
        candidates: &[String],
    ) -> Result<CoordinationSession> {
        let participants: Vec<Participant> = candidates
            .iter()
            .filter_map(|id| match self.registry.get(id) {
                Some(persona) if persona.is_active() => Some(Participant::from(&persona)),
                Some(persona) => {
                    debug!(persona_id = %id, status = %persona.status, "Skipping inactive candidate");
                    None
                }
                None => {
                    warn!(persona_id = %id, "Skipping unknown candidate");
                    None
                }
            })
            .collect();

        let mut session = CoordinationSession::open(
            cycle_id,
            kind,
            observation.topic.clone(),
            observation.id.clone(),
            tier,
            participants,
        );
        session.begin_deliberation()?;

        info!(
            session_id = %session.id,
            topic = %session.topic,
            kind = %kind,
            %tier,
            participants = session.participants.len(),
            "Coordination session opened"
        );
        Ok(session)
    }

    /// Submit positions gathered before the session opened
    pub fn seed(&self, session: &mut CoordinationSession, positions: Vec<Position>) {
        for position in positions {
            if session.is_terminal() {
                break;
            }
            if let Err(e) = session.submit(position) {
                debug!(session_id = %session.id, error = %e, "Seed position rejected");
            }
        }
    }

    /// Collect the missing positions and resolve.
    ///
    /// Waits at most the deliberation timeout, clamped to `deadline`.
    pub async fn deliberate(
        &self,
        session: &mut CoordinationSession,
        source: &dyn PositionSource,
        deadline: Instant,
    ) -> Deliberation {
        let limit = std::cmp::min(Instant::now() + self.deliberation_timeout, deadline);

        let pending: Vec<Persona> = session
            .pending()
            .into_iter()
            .filter_map(|p| self.registry.get(&p.persona_id))
            .filter(Persona::is_active)
            .collect();

        let requests = pending.iter().map(|persona| async move {
            let started = Instant::now();
            let result = tokio::time::timeout_at(limit, source.position(persona)).await;
            (persona.id.clone(), started.elapsed().as_millis() as u64, result)
        });
        let answers = join_all(requests).await;

        let mut latencies = BTreeMap::new();
        for (persona_id, elapsed_ms, answer) in answers {
            match answer {
                Ok(Ok(mut position)) => {
                    position.persona_id = persona_id.clone();
                    latencies.insert(persona_id.clone(), elapsed_ms);
                    if let Err(e) = session.submit(position) {
                        warn!(session_id = %session.id, error = %e, "Position rejected");
                    }
                }
                Ok(Err(e)) => {
                    warn!(
                        session_id = %session.id,
                        persona_id = %persona_id,
                        error = %e.format_for_log(),
                        "Participant failed to answer, counting as abstention"
                    );
                }
                Err(_) => {
                    let err = Error::DeliberationTimeout {
                        session_id: session.id.clone(),
                        timeout_ms: self.deliberation_timeout.as_millis() as u64,
                    };
                    warn!(
                        persona_id = %persona_id,
                        error = %err.format_for_log(),
                        "Participant timed out, counting as abstention"
                    );
                }
            }
        }

        let abstained: Vec<String> = session
            .pending()
            .into_iter()
            .map(|p| p.persona_id.clone())
            .collect();
        let outcome = session.force_resolve();

        info!(
            session_id = %session.id,
            topic = %session.topic,
            rule = ?outcome.rule(),
            approved = outcome.is_approved(),
            abstained = abstained.len(),
            "Coordination session resolved"
        );

        Deliberation {
            outcome,
            latencies,
            abstained,
        }
    }
}
