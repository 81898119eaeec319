//! Persona system: decision-making identities and their registry.
//!
//! Four default personas (executive, technical, community, compliance) ship
//! as bundled TOML seeds and are written to the store on first start.

pub mod bundled;
pub mod registry;
pub mod types;

pub use registry::{PersonaRegistry, RegistryStats};
pub use types::{Persona, PersonaRole, PersonaStatus, PersonalityTraits};
