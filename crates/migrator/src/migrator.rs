use std::sync::Arc;
use std::time::Duration;

use nomadctl_core::job::JobAttrs;
use nomadctl_core::retry::retry_async;
use nomadctl_core::{ControllerError, JobState};
use nomadctl_registry::Registry;

use crate::ops;
use crate::session::{ProvisionOverrides, SessionConnector, VmProvisioner};

/// Parameters for a single job's migration, grounded in
/// `original_source/orchestrator/migrator.py::Migrator.migrate`'s argument
/// list.
pub struct MigrationRequest {
    pub job_id: String,
    pub source_ip: String,
    pub target_region: String,
    pub target_ip: Option<String>,
    pub checkpoint_bucket: String,
    pub auto_provision: bool,
    pub provision_overrides: ProvisionOverrides,
}

/// Drives one job through the freeze/move/thaw state machine in spec §4.4.
/// Registry state is persisted *before* each step's side effect runs, so a
/// crash mid-migration leaves behind an accurate "furthest state reached"
/// record rather than a stale one.
pub struct Migrator {
    registry: Arc<dyn Registry>,
    connector: Arc<dyn SessionConnector>,
    provisioner: Option<Arc<dyn VmProvisioner>>,
}

impl Migrator {
    pub fn new(
        registry: Arc<dyn Registry>,
        connector: Arc<dyn SessionConnector>,
        provisioner: Option<Arc<dyn VmProvisioner>>,
    ) -> Self {
        Migrator {
            registry,
            connector,
            provisioner,
        }
    }

    pub async fn migrate(&self, req: MigrationRequest) -> Result<(), ControllerError> {
        let job = self.registry.get(&req.job_id).await?;
        let pid = job
            .pid
            .ok_or_else(|| ControllerError::InvalidInput(format!("job {:?} has no pid on record", req.job_id)))?;

        // Carried and advanced through every step below so each
        // `registry.update` is a CAS against the version this controller
        // last observed, per spec §5: a second controller racing the same
        // job gets `ConcurrencyConflict` instead of silently clobbering it.
        let mut version = job.version;

        self.freeze(&req, pid, &mut version).await?;
        let target_ip = self.move_to_target(&req, &mut version).await?;
        self.thaw(&req, &target_ip, &mut version).await?;
        Ok(())
    }

    async fn cas_update(
        &self,
        job_id: &str,
        state: JobState,
        attrs: JobAttrs,
        version: &mut u64,
    ) -> Result<(), ControllerError> {
        let updated = self.registry.update(job_id, state, attrs, Some(*version)).await?;
        *version = updated.version;
        Ok(())
    }

    /// STEP 1: checkpoint the running process and upload it, then fence the
    /// source process unconditionally. Retry counts match the original
    /// exactly: 3 attempts / 5s delay for both checkpoint and upload.
    async fn freeze(&self, req: &MigrationRequest, pid: u64, version: &mut u64) -> Result<(), ControllerError> {
        let mut source = self.connector.connect(&req.source_ip).await?;

        let result = async {
            self.cas_update(&req.job_id, JobState::Checkpointing, JobAttrs::default(), version)
                .await?;
            retry_async(3, Duration::from_secs(5), || {
                ops::checkpoint_dump(source.as_mut(), pid)
            })
            .await?;
            ops::validate_checkpoint_images(source.as_mut(), &req.job_id).await?;

            self.cas_update(&req.job_id, JobState::Uploading, JobAttrs::default(), version)
                .await?;
            retry_async(3, Duration::from_secs(5), || {
                ops::upload_checkpoint(source.as_mut(), &req.checkpoint_bucket, &req.job_id)
            })
            .await?;

            // Unconditional, unretried: the checkpoint is already durable.
            if let Err(err) = ops::fence_kill(source.as_mut(), pid).await {
                tracing::warn!(job_id = %req.job_id, %err, "fence kill failed, continuing anyway");
            }

            Ok(())
        }
        .await;

        source.close().await;
        result
    }

    /// STEP 2: obtain a target host, either a caller-supplied IP or an
    /// auto-provisioned one. Manual (non-auto-provision, no target IP)
    /// handoff is represented as a hard error rather than a blocking
    /// `input()` prompt, since this runs unattended (spec §9).
    async fn move_to_target(&self, req: &MigrationRequest, version: &mut u64) -> Result<String, ControllerError> {
        self.cas_update(&req.job_id, JobState::Provisioning, JobAttrs::default(), version)
            .await?;

        if let Some(ip) = &req.target_ip {
            return Ok(ip.clone());
        }

        if !req.auto_provision {
            return Err(ControllerError::ProvisionFailed(
                "no target_ip supplied and auto_provision is disabled".to_string(),
            ));
        }

        req.provision_overrides.require_complete()?;
        let provisioner = self.provisioner.as_ref().ok_or_else(|| {
            ControllerError::ProvisionFailed("auto_provision enabled but no provisioner configured".to_string())
        })?;
        let instance = provisioner.provision(&req.provision_overrides).await?;
        Ok(instance.ip)
    }

    /// STEP 3: validate the checkpoint tool on the target, download the
    /// checkpoint, restore it, and mark the job running again in its new
    /// home. Retry counts: validate 2x/3s, download/restore 3x/5s.
    async fn thaw(&self, req: &MigrationRequest, target_ip: &str, version: &mut u64) -> Result<(), ControllerError> {
        let mut target = self.connector.connect(target_ip).await?;

        let result = async {
            self.cas_update(&req.job_id, JobState::Validating, JobAttrs::default(), version)
                .await?;
            retry_async(2, Duration::from_secs(3), || {
                ops::checkpoint_tool_version(target.as_mut())
            })
            .await?;
            retry_async(2, Duration::from_secs(3), || {
                ops::checkpoint_tool_check(target.as_mut())
            })
            .await?;

            self.cas_update(&req.job_id, JobState::Downloading, JobAttrs::default(), version)
                .await?;
            retry_async(3, Duration::from_secs(5), || {
                ops::download_checkpoint(target.as_mut(), &req.checkpoint_bucket, &req.job_id)
            })
            .await?;
            ops::validate_checkpoint_images(target.as_mut(), &req.job_id).await?;

            self.cas_update(&req.job_id, JobState::Restoring, JobAttrs::default(), version)
                .await?;
            retry_async(3, Duration::from_secs(5), || {
                ops::checkpoint_restore(target.as_mut(), &req.job_id)
            })
            .await?;

            let attrs = JobAttrs {
                region: Some(req.target_region.clone()),
                public_ip: Some(target_ip.to_string()),
                ..Default::default()
            };
            self.cas_update(&req.job_id, JobState::Running, attrs, version).await?;

            Ok(())
        }
        .await;

        target.close().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nomadctl_core::job::JobAttrs as Attrs;
    use nomadctl_registry::FileRegistry;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    struct FakeSession {
        commands: Arc<StdMutex<Vec<String>>>,
        fail_matching: Option<&'static str>,
        fail_calls_remaining: Arc<AtomicU32>,
    }

    #[async_trait]
    impl crate::session::RemoteSession for FakeSession {
        async fn run_command(&mut self, command: &str) -> Result<String, ControllerError> {
            self.commands.lock().unwrap().push(command.to_string());
            if let Some(needle) = self.fail_matching {
                if command.contains(needle) && self.fail_calls_remaining.load(Ordering::SeqCst) > 0 {
                    self.fail_calls_remaining.fetch_sub(1, Ordering::SeqCst);
                    return Err(ControllerError::RemoteFailure("simulated failure".to_string()));
                }
            }
            Ok(String::new())
        }

        async fn close(&mut self) {}
    }

    struct FakeConnector {
        commands: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl SessionConnector for FakeConnector {
        async fn connect(
            &self,
            _ip: &str,
        ) -> Result<Box<dyn crate::session::RemoteSession>, ControllerError> {
            Ok(Box::new(FakeSession {
                commands: self.commands.clone(),
                fail_matching: None,
                fail_calls_remaining: Arc::new(AtomicU32::new(0)),
            }))
        }
    }

    async fn setup_registry(job_id: &str, pid: u64) -> Arc<dyn Registry> {
        let dir = std::env::temp_dir().join(format!("nomadctl-migrator-test-{}-{job_id}", std::process::id()));
        let path = dir.join("registry.json");
        let registry = FileRegistry::open(path).await.unwrap();
        registry
            .create(
                job_id,
                Attrs {
                    pid: Some(pid),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        Arc::new(registry)
    }

    #[tokio::test]
    async fn happy_path_drives_job_to_running_in_new_region() {
        let registry = setup_registry("job-1", 4242).await;
        let commands = Arc::new(StdMutex::new(Vec::new()));
        let connector: Arc<dyn SessionConnector> = Arc::new(FakeConnector {
            commands: commands.clone(),
        });
        let migrator = Migrator::new(registry.clone(), connector, None);

        let req = MigrationRequest {
            job_id: "job-1".to_string(),
            source_ip: "10.0.0.1".to_string(),
            target_region: "us-west-2".to_string(),
            target_ip: Some("10.0.0.2".to_string()),
            checkpoint_bucket: "bucket".to_string(),
            auto_provision: false,
            provision_overrides: ProvisionOverrides::default(),
        };

        migrator.migrate(req).await.unwrap();

        let job = registry.get("job-1").await.unwrap();
        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.region.as_deref(), Some("us-west-2"));
        assert_eq!(job.public_ip.as_deref(), Some("10.0.0.2"));

        let issued = commands.lock().unwrap();
        assert!(issued.iter().any(|c| c.contains("criu_wrapper.sh dump")));
        assert!(issued.iter().any(|c| c.contains("kill -9")));
        assert!(issued.iter().any(|c| c.contains("criu_wrapper.sh restore")));
    }

    #[tokio::test]
    async fn missing_target_ip_without_auto_provision_fails() {
        let registry = setup_registry("job-2", 1).await;
        let commands = Arc::new(StdMutex::new(Vec::new()));
        let connector: Arc<dyn SessionConnector> = Arc::new(FakeConnector { commands });
        let migrator = Migrator::new(registry, connector, None);

        let req = MigrationRequest {
            job_id: "job-2".to_string(),
            source_ip: "10.0.0.1".to_string(),
            target_region: "us-west-2".to_string(),
            target_ip: None,
            checkpoint_bucket: "bucket".to_string(),
            auto_provision: false,
            provision_overrides: ProvisionOverrides::default(),
        };

        let err = migrator.migrate(req).await.unwrap_err();
        assert!(matches!(err, ControllerError::ProvisionFailed(_)));
    }
}
