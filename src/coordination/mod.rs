//! Coordination of multi-persona decisions
//!
//! A session gathers positions from its participants and resolves them to
//! exactly one outcome per topic.

pub mod engine;
pub mod resolve;
pub mod session;

pub use engine::{CoordinationEngine, Deliberation, PositionSource};
pub use resolve::{resolve_positions, ResolutionRule, SessionOutcome};
pub use session::{CoordinationSession, Participant, SessionKind, SessionPhase, SessionStatus};
