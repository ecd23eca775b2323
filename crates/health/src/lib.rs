//! Periodic health checks, failure ledger and termination policy (C7).
//!
//! Grounded on `health_monitor.py`'s `HealthMonitor`: a health loop and a
//! permission loop, both driven off a shared failure ledger, publishing a
//! termination reason the orchestrator subscribes to.

pub mod ledger;
pub mod monitor;
pub mod status;

pub use ledger::{FailureLedger, FailureLedgerConfig};
pub use monitor::{HealthMonitor, HealthMonitorConfig, VoiceHealthProbe};
pub use status::HealthStatus;
