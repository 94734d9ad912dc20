/// Monitoring engine module - probing and state derivation
///
/// This module is responsible for:
/// - Executing the monitored HTTP request with retry/backoff
/// - Inspecting TLS certificates on HTTPS targets
/// - Deriving up/down/warning/recovery transitions from probe results
pub mod cert;
pub mod prober;
pub mod state;
pub mod types;

pub use prober::Prober;
pub use state::{StateDelta, StateTracker};
pub use types::{AlertEvent, CheckResult, MonitorStatus};
