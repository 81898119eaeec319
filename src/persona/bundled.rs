//! Bundled default personas, seeded into an empty registry at bootstrap.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::Deserialize;

use crate::error::{Error, Result};

use super::types::{PersonalityTraits, Persona, PersonaRole, PersonaStatus};

/// Seed definition as written in `config/personas/*.toml`.
#[derive(Debug, Clone, Deserialize)]
struct PersonaSeed {
    id: String,
    name: String,
    role: PersonaRole,
    authority_level: u8,
    #[serde(default)]
    expertise: BTreeSet<String>,
    #[serde(default)]
    communication_style: String,
    #[serde(default)]
    traits: PersonalityTraits,
    #[serde(default)]
    social_accounts: BTreeMap<String, String>,
}

/// Get the bundled TOML seed for a role, if one ships with the daemon.
pub fn bundled_config(role: PersonaRole) -> Option<&'static str> {
    match role {
        PersonaRole::Executive => Some(include_str!("../../config/personas/executive.toml")),
        PersonaRole::Technical => Some(include_str!("../../config/personas/technical.toml")),
        PersonaRole::Community => Some(include_str!("../../config/personas/community.toml")),
        PersonaRole::Compliance => Some(include_str!("../../config/personas/compliance.toml")),
        PersonaRole::Coordinator => None,
    }
}

/// Parse one persona seed from TOML.
pub fn parse_seed(content: &str) -> Result<Persona> {
    let seed: PersonaSeed = toml::from_str(content).map_err(|e| Error::ConfigParse {
        message: format!("persona seed: {}", e.message()),
        source: Some(e),
    })?;

    let now = Utc::now();
    let persona = Persona {
        id: seed.id,
        name: seed.name,
        role: seed.role,
        authority_level: seed.authority_level,
        expertise: seed.expertise,
        status: PersonaStatus::Active,
        traits: seed.traits,
        communication_style: seed.communication_style,
        social_accounts: seed.social_accounts,
        created_at: now,
        updated_at: now,
    };
    persona.validate()?;
    Ok(persona)
}

/// All bundled default personas, in role order.
pub fn default_personas() -> Result<Vec<Persona>> {
    PersonaRole::all()
        .iter()
        .filter_map(|role| bundled_config(*role))
        .map(parse_seed)
        .collect()
}
