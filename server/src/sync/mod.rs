//! Sync orchestration: the engine, its retry wrapper, the per-organization
//! run guard and the periodic scheduler.

mod engine;
mod guard;
mod retry;
mod scheduler;

pub use engine::{EngineSettings, SyncEngine};
pub use guard::{ActiveRun, RunGuard, RunRegistry};
pub use retry::{with_retry, RetryPolicy, RetryStats};
pub use scheduler::{run_schedule, sync_all, OrgReport};
