//! Per-cycle context and summary

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::types::{ActionKind, Domain};

/// Explicit state of one running cycle
#[derive(Debug, Clone)]
pub struct CycleContext {
    pub cycle_id: String,
    pub cycle_number: u64,
    pub started_at: DateTime<Utc>,
    /// Nothing in the cycle may wait past this point
    pub deadline: Instant,
}

impl CycleContext {
    pub fn new(cycle_number: u64, period: std::time::Duration) -> Self {
        Self {
            cycle_id: Uuid::new_v4().to_string(),
            cycle_number,
            started_at: Utc::now(),
            deadline: Instant::now() + period,
        }
    }
}

/// What one persona did in a cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonaActivity {
    pub decisions: u32,
    pub executed: u32,
    pub failed: u32,
    pub abstained: u32,
    pub vetoes: u32,
}

/// One action sent (or attempted) in ACT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionReport {
    pub topic: String,
    pub domain: Domain,
    pub action: ActionKind,
    pub persona_ids: Vec<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    /// Cycle id
    pub id: String,
    pub cycle_number: u64,
    pub daemon: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub observations: BTreeMap<Domain, usize>,
    pub unavailable_domains: Vec<Domain>,
    pub assignments: usize,
    pub sessions: usize,
    pub vetoed: usize,
    pub unroutable: usize,
    pub actions: Vec<ActionReport>,
    pub personas: BTreeMap<String, PersonaActivity>,
    /// Personas suspended by the ledger during this cycle
    pub suspended: Vec<String>,
    /// Records already present from an earlier run of this cycle
    pub duplicate_records: usize,
}

impl CycleSummary {
    pub fn new(ctx: &CycleContext, daemon: impl Into<String>) -> Self {
        Self {
            id: ctx.cycle_id.clone(),
            cycle_number: ctx.cycle_number,
            daemon: daemon.into(),
            started_at: ctx.started_at,
            finished_at: ctx.started_at,
            observations: BTreeMap::new(),
            unavailable_domains: Vec::new(),
            assignments: 0,
            sessions: 0,
            vetoed: 0,
            unroutable: 0,
            actions: Vec::new(),
            personas: BTreeMap::new(),
            suspended: Vec::new(),
            duplicate_records: 0,
        }
    }

    pub fn total_observations(&self) -> usize {
        self.observations.values().sum()
    }

    pub fn executed(&self) -> usize {
        self.actions.iter().filter(|a| a.success).count()
    }

    /// Actions attempted for observations from `domain`
    pub fn actions_for(&self, domain: Domain) -> usize {
        self.actions.iter().filter(|a| a.domain == domain).count()
    }

    pub fn activity(&mut self, persona_id: &str) -> &mut PersonaActivity {
        self.personas.entry(persona_id.to_string()).or_default()
    }

    /// Human-readable message for chat notifications
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "**{}** cycle #{} ({} observations, {} actions executed)\n",
            self.daemon,
            self.cycle_number,
            self.total_observations(),
            self.executed()
        );

        for (domain, count) in &self.observations {
            let _ = writeln!(out, "- {}: {} observations", domain, count);
        }
        for domain in &self.unavailable_domains {
            let _ = writeln!(out, "- {}: unavailable", domain);
        }
        if self.sessions > 0 {
            let _ = writeln!(out, "Coordination sessions: {} ({} vetoed)", self.sessions, self.vetoed);
        }

        for action in &self.actions {
            let _ = writeln!(
                out,
                "{} {} `{}` by {}",
                if action.success { "✅" } else { "❌" },
                action.action,
                action.topic,
                action.persona_ids.join(", ")
            );
        }

        if !self.personas.is_empty() {
            out.push_str("\nPersonas:\n");
            for (id, a) in &self.personas {
                let _ = writeln!(
                    out,
                    "- {}: {} decisions, {} executed, {} failed, {} abstained",
                    id, a.decisions, a.executed, a.failed, a.abstained
                );
            }
        }
        for id in &self.suspended {
            let _ = writeln!(out, "⚠️ {} suspended for low success rate", id);
        }
        out
    }
}
