//! Orchestrator, CLI and status HTTP surface for the voice relay (C8).

pub mod http;
pub mod null;
pub mod orchestrator;

pub use http::create_router;
pub use orchestrator::{Orchestrator, StatusSnapshot};
