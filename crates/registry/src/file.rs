use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use nomadctl_core::job::JobAttrs;
use nomadctl_core::{ControllerError, JobRecord, JobState};
use tokio::sync::Mutex;

use crate::{apply_attrs, Registry};

/// File-backed registry, grounded in `client-engine`'s `InflightStore`: the
/// whole table lives in memory behind a mutex and is persisted to disk as
/// one JSON document, written atomically via a `.tmp` file plus rename so a
/// crash mid-write never corrupts the registry spec §4.1 requires.
pub struct FileRegistry {
    path: PathBuf,
    table: Mutex<BTreeMap<String, JobRecord>>,
}

impl FileRegistry {
    pub async fn open(path: PathBuf) -> Result<Self, ControllerError> {
        let table = Self::load(&path)?;
        Ok(FileRegistry {
            path,
            table: Mutex::new(table),
        })
    }

    fn load(path: &Path) -> Result<BTreeMap<String, JobRecord>, ControllerError> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|err| ControllerError::InvalidInput(format!("reading registry file: {err}")))?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw)
            .map_err(|err| ControllerError::InvalidInput(format!("parsing registry file: {err}")))
    }

    async fn persist(&self, table: &BTreeMap<String, JobRecord>) -> Result<(), ControllerError> {
        let path = self.path.clone();
        let body = serde_json::to_vec_pretty(table)
            .map_err(|err| ControllerError::InvalidInput(format!("serializing registry: {err}")))?;
        tokio::task::spawn_blocking(move || {
            let tmp_path = path.with_extension("json.tmp");
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&tmp_path, body)?;
            std::fs::rename(&tmp_path, &path)
        })
        .await
        .map_err(|err| ControllerError::InvalidInput(format!("persist task panicked: {err}")))?
        .map_err(|err| ControllerError::InvalidInput(format!("writing registry file: {err}")))
    }
}

#[async_trait]
impl Registry for FileRegistry {
    async fn get(&self, job_id: &str) -> Result<JobRecord, ControllerError> {
        let table = self.table.lock().await;
        table
            .get(job_id)
            .cloned()
            .ok_or_else(|| ControllerError::NotFound(job_id.to_string()))
    }

    async fn create(&self, job_id: &str, attrs: JobAttrs) -> Result<JobRecord, ControllerError> {
        let mut table = self.table.lock().await;
        if table.contains_key(job_id) {
            return Err(ControllerError::AlreadyExists(job_id.to_string()));
        }
        let mut record = JobRecord {
            job_id: job_id.to_string(),
            state: JobState::Running,
            region: attrs.region,
            public_ip: attrs.public_ip,
            pid: attrs.pid,
            workload_type: attrs.workload_type,
            version: 0,
            last_updated: Utc::now(),
            extra: Default::default(),
        };
        record.extra.extend(attrs.extra);
        table.insert(job_id.to_string(), record.clone());
        self.persist(&table).await?;
        Ok(record)
    }

    async fn update(
        &self,
        job_id: &str,
        state: JobState,
        attrs: JobAttrs,
        expected_version: Option<u64>,
    ) -> Result<JobRecord, ControllerError> {
        let mut table = self.table.lock().await;
        let record = table
            .get_mut(job_id)
            .ok_or_else(|| ControllerError::NotFound(job_id.to_string()))?;

        if let Some(expected) = expected_version {
            if record.version != expected {
                return Err(ControllerError::ConcurrencyConflict(job_id.to_string()));
            }
        }

        apply_attrs(record, attrs);
        record.state = state;
        record.version += 1;
        record.last_updated = Utc::now();
        let updated = record.clone();

        self.persist(&table).await?;
        Ok(updated)
    }

    async fn list_by_state(&self, states: &[JobState]) -> Result<Vec<JobRecord>, ControllerError> {
        let table = self.table.lock().await;
        Ok(table
            .values()
            .filter(|record| states.contains(&record.state))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let dir = std::env::temp_dir().join(format!("nomadctl-registry-test-{}", std::process::id()));
        let path = dir.join("registry.json");
        let registry = FileRegistry::open(path).await.unwrap();

        let record = registry.create("job-1", JobAttrs::default()).await.unwrap();
        assert_eq!(record.version, 0);
        assert_eq!(record.state, JobState::Running);

        let fetched = registry.get("job-1").await.unwrap();
        assert_eq!(fetched.job_id, "job-1");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_job_id() {
        let dir = std::env::temp_dir().join(format!("nomadctl-registry-test-dup-{}", std::process::id()));
        let path = dir.join("registry.json");
        let registry = FileRegistry::open(path).await.unwrap();

        registry.create("job-1", JobAttrs::default()).await.unwrap();
        let err = registry.create("job-1", JobAttrs::default()).await.unwrap_err();
        assert!(matches!(err, ControllerError::AlreadyExists(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn update_with_stale_expected_version_conflicts() {
        let dir = std::env::temp_dir().join(format!("nomadctl-registry-test-cas-{}", std::process::id()));
        let path = dir.join("registry.json");
        let registry = FileRegistry::open(path).await.unwrap();

        registry.create("job-1", JobAttrs::default()).await.unwrap();
        let err = registry
            .update("job-1", JobState::Checkpointing, JobAttrs::default(), Some(99))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::ConcurrencyConflict(_)));

        let ok = registry
            .update("job-1", JobState::Checkpointing, JobAttrs::default(), Some(0))
            .await
            .unwrap();
        assert_eq!(ok.version, 1);
        assert_eq!(ok.state, JobState::Checkpointing);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn list_by_state_filters() {
        let dir = std::env::temp_dir().join(format!("nomadctl-registry-test-list-{}", std::process::id()));
        let path = dir.join("registry.json");
        let registry = FileRegistry::open(path).await.unwrap();

        registry.create("job-1", JobAttrs::default()).await.unwrap();
        registry.create("job-2", JobAttrs::default()).await.unwrap();
        registry
            .update("job-2", JobState::Checkpointing, JobAttrs::default(), None)
            .await
            .unwrap();

        let running = registry.list_by_state(&[JobState::Running]).await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].job_id, "job-1");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
