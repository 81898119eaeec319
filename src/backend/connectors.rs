//! HTTP JSON feed connector
//!
//! Each domain feed answers a GET with either a JSON array of items or an
//! object with an `items` array. Items missing an id or timestamp get fresh
//! ones; domain tags are always applied.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{ActionKind, Domain, Observation};
use crate::version;

use super::Connector;

/// One item as published by a feed
#[derive(Debug, Deserialize)]
struct FeedItem {
    #[serde(default)]
    id: Option<String>,
    topic: String,
    #[serde(default)]
    tags: BTreeSet<String>,
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(default)]
    observed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    urgency: Option<u8>,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    requested_action: Option<ActionKind>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedPage {
    Items(Vec<FeedItem>),
    Wrapped { items: Vec<FeedItem> },
}

impl FeedItem {
    fn into_observation(self, domain: Domain) -> Observation {
        let mut obs = Observation::new(domain, self.topic)
            .with_tags(self.tags)
            .with_payload(self.payload)
            .with_urgency(self.urgency.unwrap_or(1));
        if let Some(id) = self.id {
            obs = obs.with_id(id);
        }
        if let Some(at) = self.observed_at {
            obs.observed_at = at;
        }
        if let Some(amount) = self.amount {
            obs = obs.with_amount(amount);
        }
        if let Some(action) = self.requested_action {
            obs = obs.with_requested_action(action);
        }
        obs.normalize()
    }
}

/// Decode a feed body into observations for `domain`
pub(crate) fn parse_feed(domain: Domain, body: &str) -> Result<Vec<Observation>> {
    let page: FeedPage = serde_json::from_str(body)
        .map_err(|e| Error::connector_unavailable(domain, format!("malformed feed: {}", e)))?;
    let items = match page {
        FeedPage::Items(items) | FeedPage::Wrapped { items } => items,
    };
    Ok(items
        .into_iter()
        .map(|item| item.into_observation(domain))
        .collect())
}

pub struct HttpConnector {
    domain: Domain,
    url: String,
    token: Option<String>,
    client: Client,
}

impl HttpConnector {
    pub fn new(domain: Domain, url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(version::build_info().user_agent())
            .build()
            .map_err(|e| Error::connector_unavailable(domain, format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            domain,
            url: url.into(),
            token,
            client,
        })
    }
}

#[async_trait]
impl Connector for HttpConnector {
    fn domain(&self) -> Domain {
        self.domain
    }

    async fn poll(&self) -> Result<Vec<Observation>> {
        let mut req = self.client.get(&self.url);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }

        let response = req
            .send()
            .await
            .map_err(|e| Error::connector_unavailable(self.domain, format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::connector_unavailable(
                self.domain,
                format!("feed returned {}", status),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::connector_unavailable(self.domain, format!("failed to read body: {}", e)))?;
        let observations = parse_feed(self.domain, &body)?;

        debug!(domain = %self.domain, count = observations.len(), "Feed polled");
        Ok(observations)
    }
}
