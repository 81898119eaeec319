//! Performance ledger
//!
//! Tracks per-persona outcomes over a rolling window and derives success
//! rates for routing. When the window crosses the suspension policy the
//! ledger asks the registry to suspend the persona; this is the only path
//! from performance to availability.

mod window;

pub use window::{should_suspend, OutcomeSample, RollingWindow, SuspensionPolicy, WindowSummary};

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::LedgerSettings;
use crate::error::{Error, Result};
use crate::persona::{PersonaRegistry, PersonaStatus};
use crate::store::{self, collections, DocumentStore};

// ─────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────

/// An outcome to attribute to a persona
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Dedupe key; replaying the same key is a no-op
    pub key: String,
    pub success: bool,
    pub latency_ms: u64,
    pub compliance_violation: bool,
    pub at: DateTime<Utc>,
}

impl Outcome {
    pub fn success(key: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            key: key.into(),
            success: true,
            latency_ms,
            compliance_violation: false,
            at: Utc::now(),
        }
    }

    pub fn failure(key: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            success: false,
            ..Self::success(key, latency_ms)
        }
    }

    pub fn with_violation(mut self) -> Self {
        self.compliance_violation = true;
        self
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }
}

/// Result of [`PerformanceLedger::record_outcome`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordResult {
    Applied { suspended: bool },
    Duplicate,
}

/// Windowed performance figures for one persona
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub persona_id: String,
    pub tasks_assigned: usize,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub avg_response_ms: f64,
    pub success_rate: Option<f64>,
    pub compliance_violations: usize,
    pub period_start: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored form: the metric plus the window state needed to rebuild it
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MetricDocument {
    id: String,
    #[serde(flatten)]
    metric: PerformanceMetric,
    #[serde(default)]
    samples: Vec<OutcomeSample>,
    #[serde(default)]
    applied_keys: BTreeMap<String, DateTime<Utc>>,
    #[serde(default)]
    assigned: Vec<DateTime<Utc>>,
}

struct PersonaPerformance {
    window: RollingWindow,
    applied_keys: HashMap<String, DateTime<Utc>>,
    assigned: VecDeque<DateTime<Utc>>,
}

impl PersonaPerformance {
    fn new(window_days: u32) -> Self {
        Self {
            window: RollingWindow::new(window_days),
            applied_keys: HashMap::new(),
            assigned: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        self.window.prune(now);
        let start = self.window.start(now);
        self.applied_keys.retain(|_, at| *at >= start);
        while self.assigned.front().is_some_and(|at| *at < start) {
            self.assigned.pop_front();
        }
    }

    fn metric(&self, persona_id: &str, now: DateTime<Utc>) -> PerformanceMetric {
        let summary = self.window.summary(now);
        let start = self.window.start(now);
        PerformanceMetric {
            persona_id: persona_id.to_string(),
            tasks_assigned: self.assigned.iter().filter(|at| **at >= start).count(),
            tasks_completed: summary.successes,
            tasks_failed: summary.failures,
            avg_response_ms: summary.avg_latency_ms,
            success_rate: summary.success_rate(),
            compliance_violations: summary.compliance_violations,
            period_start: start,
            updated_at: now,
        }
    }

    fn document(&self, persona_id: &str, now: DateTime<Utc>) -> MetricDocument {
        MetricDocument {
            id: persona_id.to_string(),
            metric: self.metric(persona_id, now),
            samples: self.window.samples().cloned().collect(),
            applied_keys: self
                .applied_keys
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            assigned: self.assigned.iter().copied().collect(),
        }
    }
}

struct PerformanceEntry {
    state: Mutex<PersonaPerformance>,
    write_lock: tokio::sync::Mutex<()>,
}

// ─────────────────────────────────────────────────────────────────
// Ledger
// ─────────────────────────────────────────────────────────────────

pub struct PerformanceLedger {
    registry: Arc<PersonaRegistry>,
    policy: SuspensionPolicy,
    window_days: u32,
    records: RwLock<HashMap<String, Arc<PerformanceEntry>>>,
    store: Option<Arc<dyn DocumentStore>>,
}

impl PerformanceLedger {
    /// Memory-only ledger
    pub fn new(registry: Arc<PersonaRegistry>, settings: &LedgerSettings) -> Self {
        Self {
            registry,
            policy: SuspensionPolicy {
                threshold: settings.suspension_threshold,
                min_samples: settings.min_samples,
            },
            window_days: settings.window_days,
            records: RwLock::new(HashMap::new()),
            store: None,
        }
    }

    /// Store-backed ledger, restoring window state persisted by earlier runs
    pub async fn load(
        registry: Arc<PersonaRegistry>,
        settings: &LedgerSettings,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Self> {
        let docs: Vec<MetricDocument> = store::list_docs(store.as_ref(), collections::METRICS).await?;
        let mut ledger = Self::new(registry, settings);

        {
            let mut records = ledger.records.write();
            for doc in docs {
                let mut perf = PersonaPerformance::new(ledger.window_days);
                for sample in doc.samples {
                    perf.window.push(sample);
                }
                perf.applied_keys = doc.applied_keys.into_iter().collect();
                perf.assigned = doc.assigned.into_iter().collect();
                perf.prune(Utc::now());
                records.insert(
                    doc.id,
                    Arc::new(PerformanceEntry {
                        state: Mutex::new(perf),
                        write_lock: tokio::sync::Mutex::new(()),
                    }),
                );
            }
            debug!(personas = records.len(), "Performance ledger restored");
        }

        ledger.store = Some(store);
        Ok(ledger)
    }

    pub fn policy(&self) -> SuspensionPolicy {
        self.policy
    }

    fn entry(&self, persona_id: &str) -> Arc<PerformanceEntry> {
        if let Some(entry) = self.records.read().get(persona_id) {
            return entry.clone();
        }
        self.records
            .write()
            .entry(persona_id.to_string())
            .or_insert_with(|| {
                Arc::new(PerformanceEntry {
                    state: Mutex::new(PersonaPerformance::new(self.window_days)),
                    write_lock: tokio::sync::Mutex::new(()),
                })
            })
            .clone()
    }

    /// Count an assignment toward `tasks_assigned`
    pub fn note_assigned(&self, persona_id: &str, at: DateTime<Utc>) {
        let entry = self.entry(persona_id);
        let mut state = entry.state.lock();
        state.assigned.push_back(at);
        state.prune(Utc::now());
    }

    /// Record an outcome for a persona.
    ///
    /// Replaying an already-applied key returns `Duplicate` and changes
    /// nothing. When the resulting window satisfies the suspension policy
    /// and the persona is active, it is suspended.
    pub async fn record_outcome(&self, persona_id: &str, outcome: Outcome) -> Result<RecordResult> {
        if self.registry.get(persona_id).is_none() {
            return Err(Error::unknown_persona(persona_id));
        }

        let entry = self.entry(persona_id);
        let _guard = entry.write_lock.lock().await;
        let now = Utc::now();

        let (summary, doc) = {
            let mut state = entry.state.lock();
            if state.applied_keys.contains_key(&outcome.key) {
                debug!(persona_id, key = %outcome.key, "Outcome already applied");
                return Ok(RecordResult::Duplicate);
            }
            state.applied_keys.insert(outcome.key.clone(), outcome.at);
            state.window.push(OutcomeSample {
                at: outcome.at,
                success: outcome.success,
                latency_ms: outcome.latency_ms,
                compliance_violation: outcome.compliance_violation,
            });
            state.prune(now);
            (state.window.summary(now), state.document(persona_id, now))
        };

        if let Some(ref store) = self.store {
            if let Err(e) = store::upsert_doc(store.as_ref(), collections::METRICS, persona_id, &doc).await {
                warn!(persona_id, error = %e.format_for_log(), "Failed to persist performance metric");
            }
        }

        let mut suspended = false;
        if should_suspend(&summary, &self.policy) {
            if let Some(persona) = self
                .registry
                .update_status_if(persona_id, PersonaStatus::Active, PersonaStatus::Suspended)
                .await?
            {
                suspended = true;
                warn!(
                    persona_id = %persona.id,
                    success_rate = summary.success_rate().unwrap_or_default(),
                    samples = summary.samples,
                    "Persona auto-suspended for low success rate"
                );
            }
        }

        Ok(RecordResult::Applied { suspended })
    }

    /// Success rate over the window; `None` without data
    pub fn success_rate(&self, persona_id: &str) -> Option<f64> {
        let entry = self.records.read().get(persona_id).cloned()?;
        let state = entry.state.lock();
        state.window.summary(Utc::now()).success_rate()
    }

    /// Current metric for a persona (zeroed if nothing was recorded)
    pub fn metric(&self, persona_id: &str) -> PerformanceMetric {
        let now = Utc::now();
        match self.records.read().get(persona_id) {
            Some(entry) => entry.state.lock().metric(persona_id, now),
            None => PersonaPerformance::new(self.window_days).metric(persona_id, now),
        }
    }

    /// Upsert every tracked persona's metric
    pub async fn persist_all(&self) -> Result<usize> {
        let Some(ref store) = self.store else {
            return Ok(0);
        };

        let entries: Vec<(String, Arc<PerformanceEntry>)> = self
            .records
            .read()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect();

        let now = Utc::now();
        for (persona_id, entry) in &entries {
            let _guard = entry.write_lock.lock().await;
            let doc = entry.state.lock().document(persona_id, now);
            store::upsert_doc(store.as_ref(), collections::METRICS, persona_id, &doc).await?;
        }
        Ok(entries.len())
    }
}
