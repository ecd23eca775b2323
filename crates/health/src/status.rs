//! Health status snapshot, published by the health loop and read by the
//! orchestrator's `/status` surface.

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub last_check_monotonic_secs: u64,
    pub voice_disconnects_10m: u32,
    pub voice_disconnects_30m: u32,
    pub voice_disconnects_1h: u32,
    pub api_unavailable_seconds: u64,
}
