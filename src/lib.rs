//! Eliza Daemon - autonomous multi-persona decision loop for XMRT DAO
//!
//! Each cycle the daemon listens to its domain connectors, routes every
//! observation to the qualified persona, coordinates high-impact and
//! conflicting decisions between personas, executes at most one action per
//! topic and records every persona's decision with its outcome.

pub mod backend;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod persona;
pub mod router;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod version;

pub use error::{Error, Result};
