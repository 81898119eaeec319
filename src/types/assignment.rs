//! Task assignment lifecycle

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Domain, Observation};

/// Whether one persona decides alone or a session decides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    SingleDecision,
    CoordinatedDecision,
}

/// Assignment status
///
/// `Assigned -> InProgress -> Completed | Failed | Cancelled`. Terminal
/// states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl AssignmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssignmentStatus::Completed | AssignmentStatus::Failed | AssignmentStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::InProgress => "in_progress",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Failed => "failed",
            AssignmentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of routing one observation to one or more personas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub id: String,
    pub cycle_id: String,
    pub observation_id: String,
    pub topic: String,
    pub domain: Domain,
    pub task_type: TaskType,
    pub persona_ids: Vec<String>,
    pub status: AssignmentStatus,
    pub priority: u8,
    pub assigned_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl TaskAssignment {
    pub fn new(
        cycle_id: &str,
        observation: &Observation,
        task_type: TaskType,
        persona_ids: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            cycle_id: cycle_id.to_string(),
            observation_id: observation.id.clone(),
            topic: observation.topic.clone(),
            domain: observation.domain,
            task_type,
            persona_ids,
            status: AssignmentStatus::Assigned,
            priority: observation.priority(),
            assigned_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
        }
    }

    /// Mark as in progress. Returns false if the assignment is not `Assigned`.
    pub fn start(&mut self, at: DateTime<Utc>) -> bool {
        if self.status != AssignmentStatus::Assigned {
            return false;
        }
        self.status = AssignmentStatus::InProgress;
        self.started_at = Some(at);
        true
    }

    /// Move to a terminal status. Returns false if already terminal.
    pub fn finish(
        &mut self,
        status: AssignmentStatus,
        result: serde_json::Value,
        at: DateTime<Utc>,
    ) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.result = Some(result);
        self.completed_at = Some(at);
        true
    }

    /// Most recent lifecycle timestamp
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.started_at.unwrap_or(self.assigned_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment() -> TaskAssignment {
        let obs = Observation::new(Domain::Mining, "payout:w1").with_urgency(6);
        TaskAssignment::new("c1", &obs, TaskType::SingleDecision, vec!["marcus".into()])
    }

    #[test]
    fn test_lifecycle() {
        let mut a = assignment();
        assert_eq!(a.priority, 6);
        assert!(a.start(Utc::now()));
        assert!(!a.start(Utc::now()));
        assert!(a.finish(AssignmentStatus::Completed, serde_json::json!({}), Utc::now()));
        assert_eq!(a.status, AssignmentStatus::Completed);
        assert!(a.completed_at.is_some());
    }

    #[test]
    fn test_terminal_is_final() {
        let mut a = assignment();
        assert!(a.finish(AssignmentStatus::Cancelled, serde_json::Value::Null, Utc::now()));
        assert!(!a.finish(AssignmentStatus::Completed, serde_json::Value::Null, Utc::now()));
        assert_eq!(a.status, AssignmentStatus::Cancelled);
    }

    #[test]
    fn test_finish_rejects_non_terminal_target() {
        let mut a = assignment();
        assert!(!a.finish(AssignmentStatus::InProgress, serde_json::Value::Null, Utc::now()));
        assert_eq!(a.status, AssignmentStatus::Assigned);
    }
}
