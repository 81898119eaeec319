//! Decision loop scheduler
//!
//! The [`Daemon`] wires persistence, the persona registry, the performance
//! ledger, routing and coordination together, recovers interrupted work and
//! then runs one [`Scheduler`] cycle per period until shutdown.

mod history;
mod recovery;
mod runner;
mod summary;

pub use history::DecisionHistory;
pub use recovery::{recover, RecoveryReport};
pub use runner::{CycleReport, Execution, Scheduler, SchedulerSettings, TopicOutcome};
pub use summary::{ActionReport, CycleContext, CycleSummary, PersonaActivity};

use std::sync::Arc;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::backend::Collaborators;
use crate::config::DaemonConfig;
use crate::coordination::CoordinationEngine;
use crate::error::Result;
use crate::ledger::PerformanceLedger;
use crate::persona::PersonaRegistry;
use crate::router::TaskRouter;
use crate::store::{DocumentStore, FileStore};

pub struct Daemon {
    scheduler: Scheduler,
    recovery: RecoveryReport,
}

impl Daemon {
    /// Open the file store under the configured data directory and start
    pub async fn start(config: &DaemonConfig, collaborators: Collaborators) -> Result<Self> {
        let store: Arc<dyn DocumentStore> = Arc::new(FileStore::open(config.data_dir())?);
        Self::with_store(config, collaborators, store).await
    }

    pub async fn with_store(
        config: &DaemonConfig,
        collaborators: Collaborators,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Self> {
        info!(store = %store.location(), "Starting daemon");

        let registry = Arc::new(PersonaRegistry::bootstrap(store.clone()).await?);
        let ledger = Arc::new(PerformanceLedger::load(registry.clone(), &config.ledger, store.clone()).await?);
        let recovery = recover(store.as_ref(), config.cycle_period()).await?;
        let history = DecisionHistory::load(store.as_ref(), config.reasoning.history_limit).await?;

        let router = TaskRouter::new(registry.clone(), ledger.clone(), config.impact.clone());
        let engine = CoordinationEngine::new(registry.clone(), config.deliberation_timeout());
        let scheduler = Scheduler::new(
            SchedulerSettings::from_config(config),
            registry,
            ledger,
            router,
            engine,
            collaborators,
            store,
            history,
        );

        Ok(Self { scheduler, recovery })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// What was recovered at startup
    pub fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Run cycles until Ctrl+C, or a single cycle when `once` is set.
    ///
    /// A running cycle always completes before shutdown. Cycles never
    /// overlap: a tick missed while a cycle overran is skipped. Summary
    /// notifications still in flight get one connector timeout to finish
    /// before this returns.
    pub async fn run(&self, once: bool) -> Result<()> {
        let grace = self.scheduler.settings().connector_timeout;

        if once {
            let summary = self.scheduler.run_cycle(1).await?;
            self.scheduler.flush_notifications(grace).await;
            println!("{}", summary.render_text());
            return Ok(());
        }

        let period = self.scheduler.settings().period;
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let shutdown_signal = tokio::signal::ctrl_c();
        tokio::pin!(shutdown_signal);

        info!(period_secs = period.as_secs(), "Decision loop running. Press Ctrl+C to stop.");

        let mut cycle_number: u64 = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown_signal => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = timer.tick() => {
                    cycle_number += 1;
                    if let Err(e) = self.scheduler.run_cycle(cycle_number).await {
                        if e.is_fatal() {
                            self.scheduler.flush_notifications(grace).await;
                            return Err(e);
                        }
                        error!(cycle = cycle_number, error = %e.format_for_log(), "Cycle failed");
                    }
                }
            }
        }

        self.scheduler.flush_notifications(grace).await;
        let persisted = self.scheduler.ledger().persist_all().await?;
        info!(cycles = cycle_number, metrics = persisted, "Daemon stopped");
        Ok(())
    }
}
