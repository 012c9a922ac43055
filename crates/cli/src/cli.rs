use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Cost-aware migration controller for preemptible cloud VM jobs, per spec
/// §6. Every flag also has an env var override (`NOMADCTL_*`), matching
/// `bbr-client`'s `clap(env = ...)` convention; file and default values sit
/// below both per the env > file > default precedence spec §6 specifies.
#[derive(Debug, Parser)]
#[command(name = "nomadctl", version, about = "Spot price migration controller")]
pub struct Cli {
    /// Single job id to manage. Required unless --multi-job is set.
    #[arg(long, env = "NOMADCTL_JOB_ID")]
    pub job_id: Option<String>,

    /// Track every job in --states instead of a single --job-id. Requires
    /// the `remote` registry backend, matching the original's restriction.
    #[arg(long, env = "NOMADCTL_MULTI_JOB", default_value_t = false)]
    pub multi_job: bool,

    /// Comma-separated job states to manage in multi-job mode.
    #[arg(long, env = "NOMADCTL_STATES", value_delimiter = ',', default_value = "RUNNING")]
    pub states: Vec<String>,

    /// Region the job currently runs in, for single-job mode.
    #[arg(long, env = "NOMADCTL_CURRENT_REGION")]
    pub current_region: Option<String>,

    /// Candidate regions to watch spot prices in.
    #[arg(long, env = "NOMADCTL_REGIONS", value_delimiter = ',')]
    pub regions: Vec<String>,

    /// Path to a policy YAML file overriding the default workload thresholds.
    #[arg(long, env = "NOMADCTL_POLICY")]
    pub policy: Option<PathBuf>,

    /// Path to `config/runtime.yaml`.
    #[arg(long, env = "NOMADCTL_CONFIG", default_value = "config/runtime.yaml")]
    pub config: PathBuf,

    #[arg(long, env = "NOMADCTL_REGISTRY_BACKEND", value_enum, default_value_t = RegistryBackendArg::File)]
    pub registry_backend: RegistryBackendArg,

    /// Path to the JSON registry file, for the `file` backend.
    #[arg(long, env = "NOMADCTL_REGISTRY_PATH", default_value = "registry.json")]
    pub registry_path: PathBuf,

    /// Base URL of the registry HTTP service, for the `remote` backend.
    #[arg(long, env = "NOMADCTL_REGISTRY_URL")]
    pub registry_url: Option<String>,

    /// Base URL of the spot price service.
    #[arg(long, env = "NOMADCTL_PRICE_URL")]
    pub price_url: Option<String>,

    /// Base URL of the VM provisioning service, required with --auto-provision.
    #[arg(long, env = "NOMADCTL_PROVISION_URL")]
    pub provision_url: Option<String>,

    /// Seconds between control loop ticks.
    #[arg(long, env = "NOMADCTL_INTERVAL", default_value_t = 60, value_parser = parse_seconds)]
    pub interval: u64,

    /// Seconds a price sample is reused before being refreshed.
    #[arg(long, env = "NOMADCTL_PRICE_CACHE_TTL", default_value_t = 30, value_parser = parse_seconds)]
    pub price_cache_ttl: u64,

    /// Seconds to wait after a migration before considering the same job again.
    #[arg(long, env = "NOMADCTL_COOLDOWN_SECONDS", default_value_t = 10_800, value_parser = parse_seconds)]
    pub cooldown_seconds: u64,

    /// Actually perform migrations. Without this, decisions are logged only.
    #[arg(long, env = "NOMADCTL_MIGRATE", default_value_t = false)]
    pub migrate: bool,

    /// Launch a replacement instance automatically instead of requiring --target-ip.
    #[arg(long, env = "NOMADCTL_AUTO_PROVISION", default_value_t = false)]
    pub auto_provision: bool,

    /// Override target placement with a specific host instead of auto-provisioning.
    #[arg(long, env = "NOMADCTL_TARGET_IP")]
    pub target_ip: Option<String>,

    #[arg(long, env = "NOMADCTL_INSTANCE_TYPE")]
    pub instance_type: Option<String>,

    #[arg(long, env = "NOMADCTL_TARGET_AMI_ID")]
    pub target_ami_id: Option<String>,

    #[arg(long, env = "NOMADCTL_TARGET_SECURITY_GROUP_ID")]
    pub target_security_group_id: Option<String>,

    #[arg(long, env = "NOMADCTL_SSH_KEY_NAME")]
    pub ssh_key_name: Option<String>,

    #[arg(long, env = "NOMADCTL_CHECKPOINT_BUCKET")]
    pub checkpoint_bucket: Option<String>,

    /// TCP port the independent health endpoint listens on.
    #[arg(long, env = "NOMADCTL_HEALTH_PORT", default_value_t = 8080)]
    pub health_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RegistryBackendArg {
    File,
    Remote,
}

fn parse_seconds(raw: &str) -> Result<u64, String> {
    raw.parse::<u64>()
        .map_err(|_| format!("{raw:?} is not a valid number of seconds"))
}

impl Cli {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn price_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.price_cache_ttl)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }
}
