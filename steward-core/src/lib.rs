//! Shared foundation for the Steward deployment orchestrator.
//!
//! This crate holds the types that every other Steward crate agrees on:
//! the deployment spec document operators apply, the shared error type,
//! and the validation rules that keep bad specs out of the store.

pub mod error;
pub mod spec;
pub mod validation;

pub use error::{Result, StewardError};
pub use spec::{DeploymentSpec, HealthCheckSpec, RolloutPolicy};
