//! Common test utilities and fixtures
//!
//! A daemon wired to an in-memory store and scripted collaborators.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use eliza_daemon::backend::{
    Collaborators, MockReasoning, RecordingExecutor, RecordingSink, ScriptedConnector,
};
use eliza_daemon::config::DaemonConfig;
use eliza_daemon::ledger::PerformanceLedger;
use eliza_daemon::persona::PersonaRegistry;
use eliza_daemon::scheduler::{CycleSummary, Daemon, Scheduler};
use eliza_daemon::store::{self, collections, MemoryStore};
use eliza_daemon::types::{ActionKind, DecisionRecord};

/// Short timeouts suitable for tests
pub fn test_config() -> DaemonConfig {
    let mut config = DaemonConfig::default();
    config.daemon.name = Some("test-daemon".to_string());
    config.daemon.cycle_period_secs = 30;
    config.daemon.deliberation_timeout_secs = 10;
    config.daemon.reasoning_timeout_secs = 5;
    config.connectors.timeout_ms = 200;
    config.reasoning.provider = "mock".to_string();
    config
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub reasoning: Arc<MockReasoning>,
    pub rewards: Arc<RecordingExecutor>,
    pub proposals: Arc<RecordingExecutor>,
    pub notifications: Arc<RecordingExecutor>,
    pub sink: Arc<RecordingSink>,
    pub daemon: Daemon,
}

impl Harness {
    pub async fn new(config: DaemonConfig, connectors: Vec<Arc<ScriptedConnector>>) -> Self {
        Self::with_store(config, connectors, Arc::new(MemoryStore::new())).await
    }

    pub async fn with_store(
        config: DaemonConfig,
        connectors: Vec<Arc<ScriptedConnector>>,
        store: Arc<MemoryStore>,
    ) -> Self {
        Self::build(config, connectors, store, Arc::new(RecordingSink::new())).await
    }

    pub async fn with_sink(
        config: DaemonConfig,
        connectors: Vec<Arc<ScriptedConnector>>,
        sink: Arc<RecordingSink>,
    ) -> Self {
        Self::build(config, connectors, Arc::new(MemoryStore::new()), sink).await
    }

    pub async fn build(
        config: DaemonConfig,
        connectors: Vec<Arc<ScriptedConnector>>,
        store: Arc<MemoryStore>,
        sink: Arc<RecordingSink>,
    ) -> Self {
        let reasoning = Arc::new(MockReasoning::new());
        let rewards = Arc::new(RecordingExecutor::new(ActionKind::RewardTransfer));
        let proposals = Arc::new(RecordingExecutor::new(ActionKind::ProposalSubmission));
        let notifications = Arc::new(RecordingExecutor::new(ActionKind::Notification));

        let mut collaborators = Collaborators::new(reasoning.clone(), sink.clone())
            .with_executor(rewards.clone())
            .with_executor(proposals.clone())
            .with_executor(notifications.clone());
        for connector in connectors {
            collaborators = collaborators.with_connector(connector);
        }

        let daemon = Daemon::with_store(&config, collaborators, store.clone())
            .await
            .expect("daemon should start");

        Self {
            store,
            reasoning,
            rewards,
            proposals,
            notifications,
            sink,
            daemon,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        self.daemon.scheduler()
    }

    pub fn registry(&self) -> &Arc<PersonaRegistry> {
        self.scheduler().registry()
    }

    pub fn ledger(&self) -> &Arc<PerformanceLedger> {
        self.scheduler().ledger()
    }

    pub async fn cycle(&self, number: u64) -> CycleSummary {
        self.scheduler()
            .run_cycle(number)
            .await
            .expect("cycle should complete")
    }

    pub async fn records(&self) -> Vec<DecisionRecord> {
        store::list_docs(&*self.store, collections::DECISIONS)
            .await
            .expect("decision records should decode")
    }

    pub async fn record_for(&self, persona_id: &str, topic: &str) -> DecisionRecord {
        self.records()
            .await
            .into_iter()
            .find(|r| r.persona_id == persona_id && r.topic == topic)
            .unwrap_or_else(|| panic!("no record for {} on {}", persona_id, topic))
    }

    /// Wait for the background summary notification
    pub async fn wait_for_summaries(&self, count: usize) -> Vec<CycleSummary> {
        for _ in 0..100 {
            let summaries = self.sink.summaries();
            if summaries.len() >= count {
                return summaries;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.sink.summaries()
    }
}

/// A temporary directory holding a config file and data directory
pub struct ConfigFixture {
    pub temp_dir: TempDir,
    pub config_path: PathBuf,
}

impl ConfigFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("daemon.toml");
        Self { temp_dir, config_path }
    }

    pub fn write_config(&self, content: &str) {
        fs::write(&self.config_path, content).unwrap();
    }

    pub fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.temp_dir.path().join("data")
    }
}
