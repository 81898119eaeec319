//! Core data types shared by the daemon components
//!
//! Observations and impact tiers, decisions and positions, decision history
//! records and task assignments.

mod assignment;
mod decision;
mod observation;

pub use assignment::*;
pub use decision::*;
pub use observation::*;
