//! Observation and impact classification types
//!
//! Observations are the ephemeral signals produced by connectors each cycle.
//! They are never stored directly; the assignments and decision records they
//! produce are.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────
// Domain
// ─────────────────────────────────────────────────────────────────

/// Source domain of an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Social,
    Mining,
    Governance,
}

impl Domain {
    pub fn all() -> &'static [Domain] {
        &[Domain::Social, Domain::Mining, Domain::Governance]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Social => "social",
            Domain::Mining => "mining",
            Domain::Governance => "governance",
        }
    }

    /// Tags every observation from this domain carries, so that routing
    /// always has expertise to match against
    pub fn default_tags(&self) -> &'static [&'static str] {
        match self {
            Domain::Social => &["social_media", "community_building"],
            Domain::Mining => &["mining"],
            Domain::Governance => &["governance", "dao_operations"],
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "social" => Ok(Domain::Social),
            "mining" => Ok(Domain::Mining),
            "governance" => Ok(Domain::Governance),
            other => Err(format!("unknown domain '{}'", other)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Impact Tier
// ─────────────────────────────────────────────────────────────────

/// Consequence magnitude of a decision
///
/// Ordered so that `High > Medium`; comparisons against a configured
/// coordination tier use this ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactTier {
    Low,
    Medium,
    High,
    Critical,
}

impl ImpactTier {
    /// Tier implied by an urgency score (clamped to 1-10)
    pub fn from_urgency(urgency: u8) -> Self {
        match urgency.clamp(1, 10) {
            1..=3 => ImpactTier::Low,
            4..=6 => ImpactTier::Medium,
            7..=8 => ImpactTier::High,
            _ => ImpactTier::Critical,
        }
    }

    /// Minimum authority a persona needs to approve this tier alone
    pub fn required_authority(&self) -> u8 {
        match self {
            ImpactTier::Low => 1,
            ImpactTier::Medium => 4,
            ImpactTier::High => 7,
            ImpactTier::Critical => 9,
        }
    }

    /// Estimate the tier of an observation.
    ///
    /// An amount strictly above the domain's high-impact threshold raises
    /// the tier to at least `High`.
    pub fn estimate(observation: &Observation, high_impact_amount: Option<f64>) -> Self {
        let tier = Self::from_urgency(observation.urgency);
        match (observation.amount, high_impact_amount) {
            (Some(amount), Some(threshold)) if amount > threshold => tier.max(ImpactTier::High),
            _ => tier,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactTier::Low => "low",
            ImpactTier::Medium => "medium",
            ImpactTier::High => "high",
            ImpactTier::Critical => "critical",
        }
    }
}

impl fmt::Display for ImpactTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImpactTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(ImpactTier::Low),
            "medium" => Ok(ImpactTier::Medium),
            "high" => Ok(ImpactTier::High),
            "critical" => Ok(ImpactTier::Critical),
            other => Err(format!("unknown impact tier '{}'", other)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Action Kind
// ─────────────────────────────────────────────────────────────────

/// Kind of outbound action a decision requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    RewardTransfer,
    ProposalSubmission,
    Notification,
    NoAction,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::RewardTransfer => "reward_transfer",
            ActionKind::ProposalSubmission => "proposal_submission",
            ActionKind::Notification => "notification",
            ActionKind::NoAction => "no_action",
        }
    }

    pub fn is_executable(&self) -> bool {
        !matches!(self, ActionKind::NoAction)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "reward_transfer" | "reward" => Ok(ActionKind::RewardTransfer),
            "proposal_submission" | "proposal" => Ok(ActionKind::ProposalSubmission),
            "notification" | "notify" => Ok(ActionKind::Notification),
            "no_action" | "none" => Ok(ActionKind::NoAction),
            other => Err(format!("unknown action '{}'", other)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Observation
// ─────────────────────────────────────────────────────────────────

/// A normalized signal from one monitoring domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub domain: Domain,
    /// Decision topic key; at most one action per topic per cycle
    pub topic: String,
    /// Tags used for expertise matching
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub observed_at: DateTime<Utc>,
    /// Urgency score 1-10
    pub urgency: u8,
    /// Optional notional value (e.g. a reward disbursement)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_action: Option<ActionKind>,
}

impl Observation {
    /// Create an observation carrying the domain's default tags
    pub fn new(domain: Domain, topic: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            domain,
            topic: topic.into(),
            tags: domain.default_tags().iter().map(|t| t.to_string()).collect(),
            payload: serde_json::Value::Null,
            observed_at: Utc::now(),
            urgency: 1,
            amount: None,
            requested_action: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_urgency(mut self, urgency: u8) -> Self {
        self.urgency = urgency.clamp(1, 10);
        self
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_requested_action(mut self, action: ActionKind) -> Self {
        self.requested_action = Some(action);
        self
    }

    /// Re-apply domain defaults and clamp urgency after deserialization
    pub fn normalize(mut self) -> Self {
        for tag in self.domain.default_tags() {
            self.tags.insert(tag.to_string());
        }
        self.urgency = self.urgency.clamp(1, 10);
        self
    }

    /// Assignment priority derived from urgency
    pub fn priority(&self) -> u8 {
        self.urgency.clamp(1, 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_from_urgency() {
        assert_eq!(ImpactTier::from_urgency(0), ImpactTier::Low);
        assert_eq!(ImpactTier::from_urgency(3), ImpactTier::Low);
        assert_eq!(ImpactTier::from_urgency(4), ImpactTier::Medium);
        assert_eq!(ImpactTier::from_urgency(8), ImpactTier::High);
        assert_eq!(ImpactTier::from_urgency(9), ImpactTier::Critical);
        assert_eq!(ImpactTier::from_urgency(200), ImpactTier::Critical);
    }

    #[test]
    fn test_amount_raises_tier() {
        let obs = Observation::new(Domain::Mining, "payout:w1")
            .with_urgency(2)
            .with_amount(5000.0);
        assert_eq!(ImpactTier::estimate(&obs, Some(1000.0)), ImpactTier::High);
        assert_eq!(ImpactTier::estimate(&obs, Some(5000.0)), ImpactTier::Low);
        assert_eq!(ImpactTier::estimate(&obs, None), ImpactTier::Low);

        let critical = obs.with_urgency(10);
        assert_eq!(ImpactTier::estimate(&critical, Some(1.0)), ImpactTier::Critical);
    }

    #[test]
    fn test_required_authority_is_monotonic() {
        let tiers = [
            ImpactTier::Low,
            ImpactTier::Medium,
            ImpactTier::High,
            ImpactTier::Critical,
        ];
        for pair in tiers.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].required_authority() < pair[1].required_authority());
        }
    }

    #[test]
    fn test_observation_carries_domain_tags() {
        let obs = Observation::new(Domain::Social, "post:1").with_tags(["events"]);
        assert!(obs.tags.contains("community_building"));
        assert!(obs.tags.contains("social_media"));
        assert!(obs.tags.contains("events"));
    }

    #[test]
    fn test_normalize_after_deserialize() {
        let json = serde_json::json!({
            "id": "o1",
            "domain": "governance",
            "topic": "proposal:7",
            "tags": [],
            "observed_at": "2024-01-01T00:00:00Z",
            "urgency": 42
        });
        let obs: Observation = serde_json::from_value(json).unwrap();
        let obs = obs.normalize();
        assert_eq!(obs.urgency, 10);
        assert!(obs.tags.contains("governance"));
    }

    #[test]
    fn test_action_kind_parse() {
        assert_eq!("reward".parse::<ActionKind>().unwrap(), ActionKind::RewardTransfer);
        assert_eq!("no-action".parse::<ActionKind>().unwrap(), ActionKind::NoAction);
        assert!("launch_rocket".parse::<ActionKind>().is_err());
        assert!(!ActionKind::NoAction.is_executable());
    }
}
