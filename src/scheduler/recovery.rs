//! Startup recovery
//!
//! Work interrupted by a crash or restart is closed out before the first
//! cycle runs. Nothing recovered is ever executed; decisions from an
//! interrupted session are recorded so the audit trail has no gaps.

use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::coordination::{CoordinationSession, SessionOutcome};
use crate::error::Result;
use crate::store::{self, collections, DocumentStore, InsertOutcome};
use crate::types::{AssignmentStatus, DecisionRecord, OutcomeStatus, TaskAssignment};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Older than one cycle period; marked failed
    pub failed_assignments: usize,
    /// Interrupted within the last period; marked cancelled
    pub cancelled_assignments: usize,
    pub sessions: usize,
    pub records: usize,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub async fn recover(store: &dyn DocumentStore, period: Duration) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();
    let now = Utc::now();

    let assignments: Vec<TaskAssignment> = store::list_docs(store, collections::ASSIGNMENTS).await?;
    for mut assignment in assignments.into_iter().filter(|a| !a.status.is_terminal()) {
        let age = (now - assignment.last_activity()).to_std().unwrap_or_default();
        let status = if age > period {
            report.failed_assignments += 1;
            AssignmentStatus::Failed
        } else {
            report.cancelled_assignments += 1;
            AssignmentStatus::Cancelled
        };
        assignment.finish(status, json!({ "recovered": true }), now);
        store::upsert_doc(store, collections::ASSIGNMENTS, &assignment.id, &assignment).await?;
    }

    let sessions: Vec<CoordinationSession> = store::list_docs(store, collections::SESSIONS).await?;
    for mut session in sessions.into_iter().filter(|s| !s.is_terminal()) {
        let outcome = session.force_resolve();
        store::upsert_doc(store, collections::SESSIONS, &session.id, &session).await?;
        report.sessions += 1;

        for position in session.positions.values() {
            let record = DecisionRecord {
                id: DecisionRecord::record_id(&session.cycle_id, &session.topic, &position.persona_id),
                cycle_id: session.cycle_id.clone(),
                persona_id: position.persona_id.clone(),
                topic: session.topic.clone(),
                context: json!({
                    "session_id": session.id,
                    "session_kind": session.kind,
                    "rule": outcome.rule(),
                    "recovered": true,
                }),
                decision: position.decision.clone(),
                reasoning: position.reasoning.clone(),
                confidence: position.confidence,
                outcome_status: recovered_status(&outcome, &position.persona_id),
                outcome_data: serde_json::Value::Null,
                recorded_at: now,
            };
            match store::insert_doc(store, collections::DECISIONS, &record.id, &record).await? {
                InsertOutcome::Inserted => report.records += 1,
                InsertOutcome::AlreadyExists => {
                    warn!(record_id = %record.id, "Recovered decision already recorded")
                }
            }
        }
    }

    if !report.is_empty() {
        info!(
            failed = report.failed_assignments,
            cancelled = report.cancelled_assignments,
            sessions = report.sessions,
            records = report.records,
            "Recovered interrupted work"
        );
    }
    Ok(report)
}

fn recovered_status(outcome: &SessionOutcome, persona_id: &str) -> OutcomeStatus {
    match outcome {
        SessionOutcome::Cancelled { .. } if outcome.is_vetoed() => OutcomeStatus::Vetoed,
        SessionOutcome::Cancelled { .. } => OutcomeStatus::NoAction,
        SessionOutcome::Approved {
            decision,
            persona_ids,
            ..
        } => {
            if !persona_ids.iter().any(|id| id == persona_id) {
                OutcomeStatus::Overruled
            } else if decision.action.is_executable() {
                OutcomeStatus::Abandoned
            } else {
                OutcomeStatus::NoAction
            }
        }
    }
}
