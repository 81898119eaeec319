//! Action executors
//!
//! One executor per executable action kind. `HttpActionExecutor` POSTs the
//! approved action as JSON; `LoggingExecutor` only logs it (dry run).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::info;

use crate::error::{Error, Result};
use crate::types::ActionKind;
use crate::version;

use super::{ActionExecutor, ApprovedAction};

pub struct HttpActionExecutor {
    kind: ActionKind,
    url: String,
    token: Option<String>,
    client: Client,
}

impl HttpActionExecutor {
    pub fn new(kind: ActionKind, url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(version::build_info().user_agent())
            .build()
            .map_err(|e| Error::Internal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            kind,
            url: url.into(),
            token,
            client,
        })
    }
}

#[async_trait]
impl ActionExecutor for HttpActionExecutor {
    fn kind(&self) -> ActionKind {
        self.kind
    }

    async fn execute(&self, action: &ApprovedAction) -> Result<serde_json::Value> {
        let fail = |message: String| Error::execution_failure(self.kind.as_str(), &action.topic, message);

        let mut req = self.client.post(&self.url).json(action);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }

        let response = req.send().await.map_err(|e| fail(format!("request failed: {}", e)))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(fail(format!("endpoint returned {}: {}", status, body)));
        }

        info!(
            action = %self.kind,
            topic = %action.topic,
            cycle_id = %action.cycle_id,
            "Action executed"
        );

        // Non-JSON receipts are kept verbatim
        Ok(serde_json::from_str(&body).unwrap_or_else(|_| json!({ "status": status.as_u16(), "body": body })))
    }
}

/// Dry-run executor
pub struct LoggingExecutor {
    kind: ActionKind,
}

impl LoggingExecutor {
    pub fn new(kind: ActionKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl ActionExecutor for LoggingExecutor {
    fn kind(&self) -> ActionKind {
        self.kind
    }

    async fn execute(&self, action: &ApprovedAction) -> Result<serde_json::Value> {
        info!(
            action = %self.kind,
            topic = %action.topic,
            cycle_id = %action.cycle_id,
            personas = ?action.persona_ids,
            summary = %action.decision.summary,
            "Dry run: action not sent"
        );
        Ok(json!({ "dry_run": true }))
    }
}
