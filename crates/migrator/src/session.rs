use async_trait::async_trait;
use nomadctl_core::ControllerError;

/// A connected remote command channel to one host, grounded in
/// `original_source/orchestrator/utils.py::SSHClient`. The concrete
/// transport (SSH, SSM, whatever) is out of scope for this crate; adapters
/// implement this trait and are injected into [`crate::Migrator`].
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Runs `command` on the remote host and returns its captured stdout.
    /// An error return covers both a nonzero exit and a transport failure,
    /// matching `SSHClient.run_command`'s single `RuntimeError` surface.
    async fn run_command(&mut self, command: &str) -> Result<String, ControllerError>;

    async fn close(&mut self);
}

/// Establishes a [`RemoteSession`] to a given IP. Kept separate from
/// `RemoteSession` itself so the migrator can connect to the target host
/// only once the target IP is known (after provisioning), mirroring the
/// two separate `SSHClient(...)` instances the original constructs.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, ip: &str) -> Result<Box<dyn RemoteSession>, ControllerError>;
}

/// Overrides passed through to a [`VmProvisioner`] when auto-provisioning a
/// replacement instance, per spec §4.4 and
/// `original_source/orchestrator/instance_manager.py::provision_instance`.
#[derive(Debug, Clone, Default)]
pub struct ProvisionOverrides {
    pub ami_id: Option<String>,
    pub security_group_id: Option<String>,
    pub key_name: Option<String>,
    pub instance_type: Option<String>,
}

impl ProvisionOverrides {
    /// All four fields are required before auto-provisioning can proceed;
    /// the original raises `RuntimeError` the moment any is missing.
    pub fn require_complete(&self) -> Result<(), ControllerError> {
        let missing: Vec<&str> = [
            ("ami_id", self.ami_id.is_none()),
            ("security_group_id", self.security_group_id.is_none()),
            ("key_name", self.key_name.is_none()),
            ("instance_type", self.instance_type.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ControllerError::ProvisionFailed(format!(
                "auto-provisioning requires {}",
                missing.join(", ")
            )))
        }
    }
}

pub struct ProvisionedInstance {
    pub ip: String,
}

/// Out-of-scope collaborator that launches a replacement VM, per spec §1's
/// non-goal list ("no cloud SDK calls"). Production wiring plugs in a real
/// implementation; this crate only depends on the trait boundary.
#[async_trait]
pub trait VmProvisioner: Send + Sync {
    async fn provision(
        &self,
        overrides: &ProvisionOverrides,
    ) -> Result<ProvisionedInstance, ControllerError>;
}
