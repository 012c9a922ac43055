//! Concrete adapters wiring the trait boundaries in `nomadctl-migrator` and
//! `nomadctl-watcher` to real transports. The SSH adapter is grounded in
//! `original_source/orchestrator/utils.py::SSHClient` (a subprocess `ssh`
//! invocation); the price and provisioning adapters speak a generic HTTP
//! contract rather than any specific cloud SDK, per spec §1's non-goal that
//! no cloud-provider semantics live in this controller.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use nomadctl_core::ControllerError;
use nomadctl_migrator::{ProvisionOverrides, ProvisionedInstance, RemoteSession, SessionConnector, VmProvisioner};
use nomadctl_watcher::SpotPriceProvider;
use tokio::process::Command;

/// Bound on a single remote command, per spec §5 ("each remote command has
/// a bounded timeout, default 30 seconds").
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// `ssh` invoked as a subprocess per command, matching the original's
/// per-call `subprocess.run(["ssh", ...])` rather than a persistent
/// connection.
pub struct SshSession {
    ip: String,
    timeout: Duration,
}

fn ssh_key_path() -> Option<String> {
    let home = std::env::var("HOME").ok()?;
    for candidate in ["id_ed25519", "id_ecdsa", "id_rsa"] {
        let path = format!("{home}/.ssh/{candidate}");
        if std::path::Path::new(&path).exists() {
            return Some(path);
        }
    }
    None
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run_command(&mut self, command: &str) -> Result<String, ControllerError> {
        let mut cmd = Command::new("ssh");
        cmd.args([
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "UserKnownHostsFile=/dev/null",
            "-o",
            "ConnectTimeout=10",
            "-o",
            "BatchMode=yes",
            "-o",
            "LogLevel=ERROR",
        ]);
        if let Some(key) = ssh_key_path() {
            cmd.args(["-i", &key]);
        }
        cmd.arg(&self.ip).arg(command);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ControllerError::RemoteTimeout(self.timeout))?
            .map_err(|err| ControllerError::RemoteFailure(format!("spawning ssh: {err}")))?;

        if !output.status.success() {
            return Err(ControllerError::RemoteFailure(format!(
                "ssh {} {command:?} exited {}: {}",
                self.ip,
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn close(&mut self) {}
}

pub struct SshConnector;

#[async_trait]
impl SessionConnector for SshConnector {
    async fn connect(&self, ip: &str) -> Result<Box<dyn RemoteSession>, ControllerError> {
        let mut session = SshSession {
            ip: ip.to_string(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        };
        // Liveness probe, matching `SSHClient.connect`'s `echo` round-trip.
        session.run_command("echo connected").await?;
        Ok(Box::new(session))
    }
}

/// Spot price source, speaking a minimal `GET {base}/prices?region=...`
/// contract that returns `{"price": <f64>}`.
pub struct HttpSpotPriceProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSpotPriceProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpSpotPriceProvider {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[derive(serde::Deserialize)]
struct PriceResponse {
    price: f64,
}

#[async_trait]
impl SpotPriceProvider for HttpSpotPriceProvider {
    async fn fetch_prices(&self, regions: &[String]) -> Result<BTreeMap<String, f64>, ControllerError> {
        let mut prices = BTreeMap::new();
        for region in regions {
            let resp = self
                .client
                .get(format!("{}/prices", self.base_url.trim_end_matches('/')))
                .query(&[("region", region.as_str())])
                .send()
                .await
                .map_err(|err| ControllerError::RemoteFailure(err.to_string()))?
                .error_for_status()
                .map_err(|err| ControllerError::RemoteFailure(err.to_string()))?;
            let parsed: PriceResponse = resp
                .json()
                .await
                .map_err(|err| ControllerError::RemoteFailure(err.to_string()))?;
            prices.insert(region.clone(), parsed.price);
        }
        Ok(prices)
    }
}

/// VM provisioning, speaking a minimal `POST {base}/instances` contract
/// that returns `{"ip": "..."}`.
pub struct HttpVmProvisioner {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVmProvisioner {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpVmProvisioner {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[derive(serde::Serialize)]
struct ProvisionRequestBody<'a> {
    ami_id: &'a str,
    security_group_id: &'a str,
    key_name: &'a str,
    instance_type: &'a str,
}

#[derive(serde::Deserialize)]
struct ProvisionResponse {
    ip: String,
}

#[async_trait]
impl VmProvisioner for HttpVmProvisioner {
    async fn provision(&self, overrides: &ProvisionOverrides) -> Result<ProvisionedInstance, ControllerError> {
        overrides.require_complete()?;
        let body = ProvisionRequestBody {
            ami_id: overrides.ami_id.as_deref().unwrap_or_default(),
            security_group_id: overrides.security_group_id.as_deref().unwrap_or_default(),
            key_name: overrides.key_name.as_deref().unwrap_or_default(),
            instance_type: overrides.instance_type.as_deref().unwrap_or_default(),
        };
        let resp = self
            .client
            .post(format!("{}/instances", self.base_url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .map_err(|err| ControllerError::ProvisionFailed(err.to_string()))?
            .error_for_status()
            .map_err(|err| ControllerError::ProvisionFailed(err.to_string()))?;
        let parsed: ProvisionResponse = resp
            .json()
            .await
            .map_err(|err| ControllerError::ProvisionFailed(err.to_string()))?;
        Ok(ProvisionedInstance { ip: parsed.ip })
    }
}
