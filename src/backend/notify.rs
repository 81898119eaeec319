//! Cycle summary notification sinks

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::scheduler::CycleSummary;
use crate::version;

use super::NotificationSink;

/// Discord message content limit
const MAX_CONTENT_CHARS: usize = 2000;

/// Posts `{"content": ...}` to a Discord-style webhook
pub struct WebhookSink {
    url: String,
    client: Client,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(version::build_info().user_agent())
            .build()
            .map_err(|e| Error::NotificationFailure {
                message: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, summary: &CycleSummary) -> Result<()> {
        let content = truncate(&summary.render_text(), MAX_CONTENT_CHARS);
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "content": content }))
            .send()
            .await
            .map_err(|e| Error::NotificationFailure {
                message: format!("webhook request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(Error::NotificationFailure {
                message: format!("webhook returned {}", response.status()),
            });
        }
        debug!(cycle_id = %summary.id, "Cycle summary sent");
        Ok(())
    }
}

/// Logs the summary
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, summary: &CycleSummary) -> Result<()> {
        info!(
            cycle_id = %summary.id,
            cycle = summary.cycle_number,
            observations = summary.total_observations(),
            sessions = summary.sessions,
            executed = summary.executed(),
            suspended = ?summary.suspended,
            "Cycle summary"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        let long = "x".repeat(2500);
        let cut = truncate(&long, MAX_CONTENT_CHARS);
        assert_eq!(cut.chars().count(), MAX_CONTENT_CHARS);
        assert!(cut.ends_with('…'));
    }
}
