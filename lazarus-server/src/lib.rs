// Lazarus server
//
// Collector, restore orchestrator and service façade, plus the tmux, storage
// and notification collaborators they run against.

pub mod boot;
pub mod collector;
pub mod error;
pub mod integrations;
pub mod notifications;
pub mod persistence;
pub mod restore;
pub mod service;

pub use error::{RecoveryError, RecoveryResult};
pub use service::{RecoveryDeps, RecoveryService};

#[cfg(test)]
mod unit;
