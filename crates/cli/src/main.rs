mod adapters;
mod cli;
mod health;

use std::sync::Arc;

use clap::Parser;
use nomadctl_control::{ControlLoop, ControlLoopConfig};
use nomadctl_core::job::JobState;
use nomadctl_core::{Policy, RuntimeConfig};
use nomadctl_decision::DecisionEngine;
use nomadctl_migrator::{Migrator, ProvisionOverrides};
use nomadctl_registry::{FileRegistry, RemoteRegistry, Registry};
use nomadctl_watcher::PriceWatcher;

use crate::adapters::{HttpSpotPriceProvider, HttpVmProvisioner, SshConnector};
use crate::cli::{Cli, RegistryBackendArg};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    let runtime_config = RuntimeConfig::load(&cli.config)?;
    let policy = load_policy(cli.policy.as_deref())?;

    if cli.multi_job && cli.registry_backend != RegistryBackendArg::Remote {
        anyhow::bail!("--multi-job requires --registry-backend remote");
    }
    if !cli.multi_job && cli.job_id.is_none() {
        anyhow::bail!("--job-id is required unless --multi-job is set");
    }

    let registry = build_registry(&cli).await?;
    let states = parse_states(&cli.states)?;

    let candidate_regions = if cli.regions.is_empty() {
        runtime_config.candidate_regions.clone()
    } else {
        cli.regions.clone()
    };

    let price_url = cli
        .price_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("--price-url (or NOMADCTL_PRICE_URL) is required"))?;
    let watcher = PriceWatcher::new(HttpSpotPriceProvider::new(price_url));

    let provisioner: Option<Arc<dyn nomadctl_migrator::VmProvisioner>> = match &cli.provision_url {
        Some(url) => Some(Arc::new(HttpVmProvisioner::new(url.clone()))),
        None => None,
    };
    let migrator = Migrator::new(registry.clone(), Arc::new(SshConnector), provisioner);

    let checkpoint_bucket = cli
        .checkpoint_bucket
        .clone()
        .or_else(|| runtime_config.checkpoint_bucket.clone())
        .unwrap_or_default();

    let auto_provision = cli.auto_provision || runtime_config.auto_provision;

    let provision_overrides = ProvisionOverrides {
        ami_id: cli.target_ami_id.clone().or_else(|| runtime_config.target_ami_id.clone()),
        security_group_id: cli
            .target_security_group_id
            .clone()
            .or_else(|| runtime_config.target_security_group_id.clone()),
        key_name: cli.ssh_key_name.clone().or_else(|| runtime_config.ssh_key_name.clone()),
        instance_type: cli.instance_type.clone().or_else(|| runtime_config.instance_type.clone()),
    };

    let loop_config = ControlLoopConfig {
        interval: cli.interval(),
        price_cache_ttl: cli.price_cache_ttl(),
        cooldown: cli.cooldown(),
        states,
        candidate_regions,
        checkpoint_bucket,
        auto_provision,
        provision_overrides,
        target_ip: cli.target_ip.clone(),
        dry_run: !cli.migrate,
        job_id_filter: if cli.multi_job { None } else { cli.job_id.clone() },
    };

    let control_loop = ControlLoop::new(
        registry,
        watcher,
        DecisionEngine::new(policy),
        migrator,
        loop_config,
    );

    let health_port = cli.health_port;
    tokio::spawn(async move { health::serve(health_port).await });

    tracing::info!(dry_run = !cli.migrate, "control loop starting");
    control_loop.run().await;
    Ok(())
}

fn init_logging() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

fn load_policy(path: Option<&std::path::Path>) -> anyhow::Result<Policy> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            Ok(serde_yaml::from_str(&raw)?)
        }
        None => Ok(Policy::default()),
    }
}

async fn build_registry(cli: &Cli) -> anyhow::Result<Arc<dyn Registry>> {
    match cli.registry_backend {
        RegistryBackendArg::File => {
            let registry = FileRegistry::open(cli.registry_path.clone()).await?;
            Ok(Arc::new(registry))
        }
        RegistryBackendArg::Remote => {
            let url = cli
                .registry_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--registry-url is required for the remote backend"))?;
            Ok(Arc::new(RemoteRegistry::new(url)))
        }
    }
}

fn parse_states(raw: &[String]) -> anyhow::Result<Vec<JobState>> {
    raw.iter()
        .map(|s| s.parse::<JobState>().map_err(|err| anyhow::anyhow!(err.to_string())))
        .collect()
}
