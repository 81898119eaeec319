//! Core types for the persona system.
//!
//! A persona is a decision-making identity with a role, an authority level
//! that bounds what it may approve alone, and expertise tags used for routing.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::ImpactTier;

pub const MIN_AUTHORITY: u8 = 1;
pub const MAX_AUTHORITY: u8 = 10;

/// Bounds for personality trait scores
pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 10;

// ─────────────────────────────────────────────────────────────────
// Persona Role
// ─────────────────────────────────────────────────────────────────

/// The persona roles in the organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaRole {
    /// Strategic direction and governance.
    Executive,
    /// Mining, blockchain and security.
    Technical,
    /// Social presence and community engagement.
    Community,
    /// Regulatory review; carries veto power.
    Compliance,
    /// Cross-team coordination.
    Coordinator,
}

impl PersonaRole {
    /// Slug used in config files and CLI args.
    pub fn slug(&self) -> &'static str {
        match self {
            PersonaRole::Executive => "executive",
            PersonaRole::Technical => "technical",
            PersonaRole::Community => "community",
            PersonaRole::Compliance => "compliance",
            PersonaRole::Coordinator => "coordinator",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PersonaRole::Executive => "Executive",
            PersonaRole::Technical => "Technical",
            PersonaRole::Community => "Community",
            PersonaRole::Compliance => "Compliance",
            PersonaRole::Coordinator => "Coordinator",
        }
    }

    pub fn all() -> &'static [PersonaRole] {
        &[
            PersonaRole::Executive,
            PersonaRole::Technical,
            PersonaRole::Community,
            PersonaRole::Compliance,
            PersonaRole::Coordinator,
        ]
    }

    /// Compliance personas can block any decision regardless of authority.
    pub fn has_veto(&self) -> bool {
        matches!(self, PersonaRole::Compliance)
    }

    /// Areas this role pays attention to, passed to the reasoning service.
    pub fn focus_areas(&self) -> &'static [&'static str] {
        match self {
            PersonaRole::Executive => &["governance", "strategic_decisions", "community_leadership"],
            PersonaRole::Technical => &["mining_stats", "technical_issues", "blockchain_data"],
            PersonaRole::Community => &["social_activity", "community_engagement", "user_feedback"],
            PersonaRole::Compliance => &["regulatory_compliance", "legal_requirements", "risk_assessment"],
            PersonaRole::Coordinator => &["cross_team_alignment", "scheduling", "escalations"],
        }
    }
}

impl fmt::Display for PersonaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for PersonaRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "executive" | "exec" => Ok(PersonaRole::Executive),
            "technical" | "tech" => Ok(PersonaRole::Technical),
            "community" => Ok(PersonaRole::Community),
            "compliance" => Ok(PersonaRole::Compliance),
            "coordinator" => Ok(PersonaRole::Coordinator),
            _ => Err(format!(
                "Unknown persona role '{}'. Valid: executive, technical, community, compliance, coordinator",
                s
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Persona Status
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaStatus {
    Active,
    Inactive,
    Suspended,
    Maintenance,
}

impl PersonaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonaStatus::Active => "active",
            PersonaStatus::Inactive => "inactive",
            PersonaStatus::Suspended => "suspended",
            PersonaStatus::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for PersonaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────
// Personality Traits
// ─────────────────────────────────────────────────────────────────

/// Personality dimensions, each an optional 1-10 score.
///
/// Unknown dimensions found in stored documents are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalityTraits {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leadership: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decisiveness: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategic_thinking: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytical: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub innovation: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empathy: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enthusiasm: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patience: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creativity: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attention_to_detail: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cautiousness: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reliability: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thoroughness: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub communication: Option<u8>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, u8>,
}

impl PersonalityTraits {
    /// All set dimensions as (name, score) pairs
    pub fn scores(&self) -> Vec<(&str, u8)> {
        let named = [
            ("leadership", self.leadership),
            ("decisiveness", self.decisiveness),
            ("strategic_thinking", self.strategic_thinking),
            ("analytical", self.analytical),
            ("precision", self.precision),
            ("innovation", self.innovation),
            ("empathy", self.empathy),
            ("enthusiasm", self.enthusiasm),
            ("patience", self.patience),
            ("creativity", self.creativity),
            ("attention_to_detail", self.attention_to_detail),
            ("cautiousness", self.cautiousness),
            ("reliability", self.reliability),
            ("thoroughness", self.thoroughness),
            ("communication", self.communication),
        ];
        named
            .into_iter()
            .filter_map(|(name, score)| score.map(|s| (name, s)))
            .chain(self.extra.iter().map(|(k, v)| (k.as_str(), *v)))
            .collect()
    }

    fn validate(&self) -> std::result::Result<(), String> {
        for (name, score) in self.scores() {
            if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
                return Err(format!(
                    "trait '{}' score {} outside {}-{}",
                    name, score, MIN_SCORE, MAX_SCORE
                ));
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Persona
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub role: PersonaRole,
    /// 1-10; bounds the impact tiers this persona may approve alone
    pub authority_level: u8,
    pub expertise: BTreeSet<String>,
    pub status: PersonaStatus,
    #[serde(default)]
    pub traits: PersonalityTraits,
    #[serde(default)]
    pub communication_style: String,
    #[serde(default)]
    pub social_accounts: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Persona {
    /// Create an active persona, validating the authority level.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        role: PersonaRole,
        authority_level: u8,
    ) -> Result<Self> {
        let now = Utc::now();
        let persona = Self {
            id: id.into(),
            name: name.into(),
            role,
            authority_level,
            expertise: BTreeSet::new(),
            status: PersonaStatus::Active,
            traits: PersonalityTraits::default(),
            communication_style: String::new(),
            social_accounts: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        };
        persona.validate()?;
        Ok(persona)
    }

    pub fn with_expertise<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expertise.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_status(mut self, status: PersonaStatus) -> Self {
        self.status = status;
        self
    }

    /// Check the invariants stored documents and seeds must satisfy.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Error::InvalidPersona {
            id: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty".to_string()));
        }
        if !(MIN_AUTHORITY..=MAX_AUTHORITY).contains(&self.authority_level) {
            return Err(invalid(format!(
                "authority level {} outside {}-{}",
                self.authority_level, MIN_AUTHORITY, MAX_AUTHORITY
            )));
        }
        self.traits.validate().map_err(invalid)
    }

    pub fn is_active(&self) -> bool {
        self.status == PersonaStatus::Active
    }

    /// Whether this persona may approve a decision of `tier` alone
    pub fn can_approve(&self, tier: ImpactTier) -> bool {
        self.authority_level >= tier.required_authority()
    }

    pub fn has_veto(&self) -> bool {
        self.role.has_veto()
    }

    /// Whether any expertise tag matches one of `tags`
    pub fn matches_any(&self, tags: &BTreeSet<String>) -> bool {
        !self.expertise.is_disjoint(tags)
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
