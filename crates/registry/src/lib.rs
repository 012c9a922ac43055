//! Job registry backends: the authoritative, versioned store of per-job
//! state described in spec §4.1. [`Registry`] is the seam the control loop
//! and migrator code against; [`FileRegistry`] and [`RemoteRegistry`] are
//! the two backends spec §6's `registry_backend` setting selects between.

mod file;
mod remote;

pub use file::FileRegistry;
pub use remote::RemoteRegistry;

use async_trait::async_trait;
use nomadctl_core::job::JobAttrs;
use nomadctl_core::{ControllerError, JobRecord, JobState};

/// Storage contract for job records, per spec §4.1. Every mutation is a
/// compare-and-swap keyed on `version`: pass `expected_version` to make an
/// update conditional, or `None` to overwrite unconditionally.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn get(&self, job_id: &str) -> Result<JobRecord, ControllerError>;

    async fn create(&self, job_id: &str, attrs: JobAttrs) -> Result<JobRecord, ControllerError>;

    async fn update(
        &self,
        job_id: &str,
        state: JobState,
        attrs: JobAttrs,
        expected_version: Option<u64>,
    ) -> Result<JobRecord, ControllerError>;

    async fn list_by_state(&self, states: &[JobState]) -> Result<Vec<JobRecord>, ControllerError>;
}

/// Applies a patch-style [`JobAttrs`] onto a record in place: `Some` fields
/// overwrite, `None` fields leave the existing value untouched, and `extra`
/// keys are merged rather than replaced wholesale.
pub(crate) fn apply_attrs(record: &mut JobRecord, attrs: JobAttrs) {
    if let Some(region) = attrs.region {
        record.region = Some(region);
    }
    if let Some(public_ip) = attrs.public_ip {
        record.public_ip = Some(public_ip);
    }
    if let Some(pid) = attrs.pid {
        record.pid = Some(pid);
    }
    if let Some(workload_type) = attrs.workload_type {
        record.workload_type = Some(workload_type);
    }
    record.extra.extend(attrs.extra);
}
