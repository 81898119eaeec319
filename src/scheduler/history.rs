//! Recent decision history per persona
//!
//! Loaded once from the decision records at startup and extended as RECORD
//! appends, so reasoning calls never read the store.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::store::{self, collections, DocumentStore};
use crate::types::DecisionRecord;

pub struct DecisionHistory {
    limit: usize,
    by_persona: RwLock<HashMap<String, VecDeque<DecisionRecord>>>,
}

impl DecisionHistory {
    /// Keep at most `limit` records per persona; 0 keeps nothing
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            by_persona: RwLock::new(HashMap::new()),
        }
    }

    pub async fn load(store: &dyn DocumentStore, limit: usize) -> Result<Self> {
        let history = Self::new(limit);
        if limit == 0 {
            return Ok(history);
        }

        let mut records: Vec<DecisionRecord> = store::list_docs(store, collections::DECISIONS).await?;
        records.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at).then_with(|| a.id.cmp(&b.id)));
        let total = records.len();
        for record in records {
            history.push(record);
        }

        debug!(records = total, limit, "Decision history loaded");
        Ok(history)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn push(&self, record: DecisionRecord) {
        if self.limit == 0 {
            return;
        }
        let mut by_persona = self.by_persona.write();
        let entries = by_persona.entry(record.persona_id.clone()).or_default();
        entries.push_back(record);
        while entries.len() > self.limit {
            entries.pop_front();
        }
    }

    /// A persona's latest records, newest first
    pub fn recent(&self, persona_id: &str) -> Vec<DecisionRecord> {
        self.by_persona
            .read()
            .get(persona_id)
            .map(|entries| entries.iter().rev().cloned().collect())
            .unwrap_or_default()
    }
}
