//! ThingSync device agent library.
//!
//! Re-exports all modules so external crates (e.g. `ts-e2e-tests`) can
//! drive the `Agent` against a `MockChannel`.

pub mod agent;
pub mod config;
pub mod sample;
pub mod shadow_handlers;

pub use agent::{Agent, AgentError};
pub use config::{AgentConfig, SampleConfig};
