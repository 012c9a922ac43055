//! Per-job migration state machine, per spec §4.4. Grounded in
//! `original_source/orchestrator/migrator.py` for step order and retry
//! counts, and in `client-engine::worker`'s retry/backoff style for how
//! those retries are structured in async Rust.

mod migrator;
mod ops;
mod session;

pub use migrator::{MigrationRequest, Migrator};
pub use session::{ProvisionOverrides, ProvisionedInstance, RemoteSession, SessionConnector, VmProvisioner};
