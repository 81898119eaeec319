//! Rolling outcome window and the suspension rule.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One closed assignment or session outcome attributed to a persona
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSample {
    pub at: DateTime<Utc>,
    pub success: bool,
    pub latency_ms: u64,
    #[serde(default)]
    pub compliance_violation: bool,
}

/// Aggregate over the samples inside the window
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowSummary {
    pub samples: usize,
    pub successes: usize,
    pub failures: usize,
    pub compliance_violations: usize,
    pub avg_latency_ms: f64,
}

impl WindowSummary {
    /// Simple average of successes over outcomes; `None` without data
    pub fn success_rate(&self) -> Option<f64> {
        if self.samples == 0 {
            None
        } else {
            Some(self.successes as f64 / self.samples as f64)
        }
    }
}

/// Samples from the trailing `span`, oldest first
#[derive(Debug, Clone)]
pub struct RollingWindow {
    span: Duration,
    samples: VecDeque<OutcomeSample>,
}

impl RollingWindow {
    pub fn new(days: u32) -> Self {
        Self {
            span: Duration::days(i64::from(days.max(1))),
            samples: VecDeque::new(),
        }
    }

    pub fn span(&self) -> Duration {
        self.span
    }

    /// Start of the window relative to `now`
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.span
    }

    /// Insert keeping time order; samples may arrive slightly out of order
    pub fn push(&mut self, sample: OutcomeSample) {
        let pos = self
            .samples
            .iter()
            .rposition(|s| s.at <= sample.at)
            .map_or(0, |i| i + 1);
        self.samples.insert(pos, sample);
    }

    /// Drop samples that fell out of the window
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let start = self.start(now);
        while self.samples.front().is_some_and(|s| s.at < start) {
            self.samples.pop_front();
        }
    }

    pub fn summary(&self, now: DateTime<Utc>) -> WindowSummary {
        let start = self.start(now);
        let mut summary = WindowSummary::default();
        let mut latency_total = 0u128;

        for sample in self.samples.iter().filter(|s| s.at >= start && s.at <= now) {
            summary.samples += 1;
            if sample.success {
                summary.successes += 1;
            } else {
                summary.failures += 1;
            }
            if sample.compliance_violation {
                summary.compliance_violations += 1;
            }
            latency_total += u128::from(sample.latency_ms);
        }

        if summary.samples > 0 {
            summary.avg_latency_ms = latency_total as f64 / summary.samples as f64;
        }
        summary
    }

    pub fn samples(&self) -> impl Iterator<Item = &OutcomeSample> {
        self.samples.iter()
    }
}

/// Auto-suspension policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuspensionPolicy {
    pub threshold: f64,
    pub min_samples: usize,
}

impl Default for SuspensionPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_samples: 20,
        }
    }
}

/// Suspend when the window holds at least `min_samples` outcomes and the
/// success rate is strictly below `threshold`.
pub fn should_suspend(summary: &WindowSummary, policy: &SuspensionPolicy) -> bool {
    if summary.samples < policy.min_samples.max(1) {
        return false;
    }
    summary
        .success_rate()
        .is_some_and(|rate| rate < policy.threshold)
}
