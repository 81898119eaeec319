//! Collaborator wiring
//!
//! Builds the reasoning service, connectors, executors and notification sink
//! from configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{DaemonConfig, EndpointSettings};
use crate::error::{Error, Result};
use crate::types::{ActionKind, Domain};

use super::{
    HttpActionExecutor, HttpConnector, LogSink, LoggingExecutor, MockReasoning, OpenAiReasoning,
    SharedConnector, SharedExecutor, SharedReasoning, SharedSink, WebhookSink,
};

/// Supported reasoning providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasoningProvider {
    /// Any OpenAI-compatible chat-completion API
    OpenAi,
    /// Deterministic mock
    Mock,
}

impl ReasoningProvider {
    pub fn name(&self) -> &'static str {
        match self {
            ReasoningProvider::OpenAi => "openai",
            ReasoningProvider::Mock => "mock",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Some(ReasoningProvider::OpenAi),
            "mock" => Some(ReasoningProvider::Mock),
            _ => None,
        }
    }
}

/// Everything the scheduler talks to
#[derive(Clone)]
pub struct Collaborators {
    pub reasoning: SharedReasoning,
    pub connectors: Vec<SharedConnector>,
    pub executors: HashMap<ActionKind, SharedExecutor>,
    pub sink: SharedSink,
}

impl Collaborators {
    pub fn new(reasoning: SharedReasoning, sink: SharedSink) -> Self {
        Self {
            reasoning,
            connectors: Vec::new(),
            executors: HashMap::new(),
            sink,
        }
    }

    pub fn with_connector(mut self, connector: SharedConnector) -> Self {
        self.connectors.push(connector);
        self
    }

    pub fn with_executor(mut self, executor: SharedExecutor) -> Self {
        self.executors.insert(executor.kind(), executor);
        self
    }

    pub fn executor(&self, kind: ActionKind) -> Option<&SharedExecutor> {
        self.executors.get(&kind)
    }

    pub fn from_config(config: &DaemonConfig) -> Result<Self> {
        let reasoning = build_reasoning(config)?;
        let sink = build_sink(config)?;
        let mut collaborators = Self::new(reasoning, sink);

        for &domain in Domain::all() {
            let endpoint = config.connectors.for_domain(domain);
            match endpoint.url {
                Some(ref url) => {
                    let connector =
                        HttpConnector::new(domain, url.clone(), endpoint.token.clone(), config.connector_timeout())?;
                    collaborators = collaborators.with_connector(Arc::new(connector));
                }
                None => warn!(%domain, "No connector configured, domain will not be observed"),
            }
        }

        let timeout = Duration::from_millis(config.actions.timeout_ms);
        for (kind, endpoint) in [
            (ActionKind::RewardTransfer, &config.actions.reward),
            (ActionKind::ProposalSubmission, &config.actions.proposal),
            (ActionKind::Notification, &config.actions.notification),
        ] {
            collaborators = collaborators.with_executor(build_executor(
                kind,
                endpoint,
                config.actions.dry_run,
                timeout,
            )?);
        }

        info!(
            reasoning = collaborators.reasoning.name(),
            connectors = collaborators.connectors.len(),
            dry_run = config.actions.dry_run,
            sink = collaborators.sink.name(),
            "Collaborators ready"
        );
        Ok(collaborators)
    }
}

fn build_reasoning(config: &DaemonConfig) -> Result<SharedReasoning> {
    let provider = ReasoningProvider::parse(&config.reasoning.provider).ok_or_else(|| {
        Error::config_field_invalid(
            "reasoning.provider",
            format!("unknown provider '{}'", config.reasoning.provider),
        )
    })?;

    Ok(match provider {
        ReasoningProvider::OpenAi => Arc::new(OpenAiReasoning::new(config.reasoning.clone())?),
        ReasoningProvider::Mock => Arc::new(MockReasoning::new()),
    })
}

fn build_executor(
    kind: ActionKind,
    endpoint: &EndpointSettings,
    dry_run: bool,
    timeout: Duration,
) -> Result<SharedExecutor> {
    match endpoint.url {
        Some(ref url) if !dry_run => Ok(Arc::new(HttpActionExecutor::new(
            kind,
            url.clone(),
            endpoint.token.clone(),
            timeout,
        )?)),
        _ => Ok(Arc::new(LoggingExecutor::new(kind))),
    }
}

fn build_sink(config: &DaemonConfig) -> Result<SharedSink> {
    match config.notifications.webhook_url {
        Some(ref url) => Ok(Arc::new(WebhookSink::new(url.clone(), Duration::from_secs(10))?)),
        None => Ok(Arc::new(LogSink)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!(ReasoningProvider::parse("OpenAI"), Some(ReasoningProvider::OpenAi));
        assert_eq!(ReasoningProvider::parse("mock"), Some(ReasoningProvider::Mock));
        assert_eq!(ReasoningProvider::parse("gpt"), None);
        assert_eq!(ReasoningProvider::Mock.name(), "mock");
    }

    #[test]
    fn test_from_config_defaults() {
        let mut config = DaemonConfig::default();
        config.reasoning.provider = "mock".to_string();
        config.connectors.social.url = Some("http://localhost:9/social".to_string());

        let collaborators = Collaborators::from_config(&config).unwrap();
        assert_eq!(collaborators.reasoning.name(), "mock");
        assert_eq!(collaborators.connectors.len(), 1);
        assert_eq!(collaborators.connectors[0].domain(), Domain::Social);
        assert!(collaborators.executor(ActionKind::RewardTransfer).is_some());
        assert!(collaborators.executor(ActionKind::NoAction).is_none());
        assert_eq!(collaborators.sink.name(), "log");
    }

    #[test]
    fn test_unknown_provider() {
        let mut config = DaemonConfig::default();
        config.reasoning.provider = "oracle".to_string();
        assert!(Collaborators::from_config(&config).is_err());
    }
}
