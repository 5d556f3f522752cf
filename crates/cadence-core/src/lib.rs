//! `cadence-core` — shared types and configuration for the Cadence workspace.
//!
//! Holds everything both the scheduler and a host process need to agree on:
//! the environment snapshot model (what the host reports about network,
//! battery, charging and idleness) and the figment-based configuration layer.

pub mod config;
pub mod env;
pub mod error;

pub use config::CadenceConfig;
pub use env::{EnvironmentSnapshot, NetworkClass};
pub use error::{CoreError, Result};
