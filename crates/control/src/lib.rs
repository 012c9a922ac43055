//! Polling control loop, per spec §4.5. Wires [`PriceWatcher`],
//! [`DecisionEngine`], [`Migrator`], and a [`Registry`] together the way
//! `original_source/orchestrator/main.py`'s `while True:` loop does, while
//! borrowing `client-engine::engine`'s pattern of a dedicated loop method
//! driven by `tokio::time::interval`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use nomadctl_core::{ControllerError, JobState, WorkloadType};
use nomadctl_decision::DecisionEngine;
use nomadctl_migrator::{MigrationRequest, Migrator, ProvisionOverrides};
use nomadctl_registry::Registry;
use nomadctl_watcher::{PriceWatcher, SpotPriceProvider};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Static, per-run settings that don't change tick to tick. Field names and
/// defaults mirror `main.py`'s argparse flags (spec §6).
#[derive(Debug, Clone)]
pub struct ControlLoopConfig {
    pub interval: Duration,
    pub price_cache_ttl: Duration,
    pub cooldown: Duration,
    pub states: Vec<JobState>,
    pub candidate_regions: Vec<String>,
    pub checkpoint_bucket: String,
    pub auto_provision: bool,
    pub provision_overrides: ProvisionOverrides,
    /// Mirrors `--target-ip`: overrides auto-provisioning with a specific host.
    pub target_ip: Option<String>,
    /// Mirrors `--migrate`: when false, migrations are logged but not acted on.
    pub dry_run: bool,
    /// Single-job mode: restrict ticks to this job id instead of every job
    /// in `states`. `None` means multi-job mode.
    pub job_id_filter: Option<String>,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        ControlLoopConfig {
            interval: Duration::from_secs(60),
            price_cache_ttl: Duration::from_secs(30),
            cooldown: Duration::from_secs(10_800),
            states: vec![JobState::Running],
            candidate_regions: Vec::new(),
            checkpoint_bucket: String::new(),
            auto_provision: false,
            provision_overrides: ProvisionOverrides::default(),
            target_ip: None,
            dry_run: true,
            job_id_filter: None,
        }
    }
}

struct CachedPrices {
    fetched_at: Instant,
    prices: BTreeMap<String, f64>,
}

pub struct ControlLoop<P> {
    registry: Arc<dyn Registry>,
    watcher: Mutex<PriceWatcher<P>>,
    decision: DecisionEngine,
    migrator: Migrator,
    config: ControlLoopConfig,
    price_cache: Mutex<Option<CachedPrices>>,
    last_migration: Mutex<HashMap<String, Instant>>,
}

impl<P: SpotPriceProvider> ControlLoop<P> {
    pub fn new(
        registry: Arc<dyn Registry>,
        watcher: PriceWatcher<P>,
        decision: DecisionEngine,
        migrator: Migrator,
        config: ControlLoopConfig,
    ) -> Self {
        ControlLoop {
            registry,
            watcher: Mutex::new(watcher),
            decision,
            migrator,
            config,
            price_cache: Mutex::new(None),
            last_migration: Mutex::new(HashMap::new()),
        }
    }

    /// Runs forever, sleeping `interval` between ticks. A failing tick is
    /// logged and the loop continues rather than exiting, matching the
    /// original's bare `while True:`.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            ticker.tick().await;
            if let Err(err) = self.tick().await {
                tracing::error!(%err, "control loop tick failed");
            }
        }
    }

    /// One polling iteration: refresh prices (cache-aware), enumerate
    /// eligible jobs, evaluate and (subject to cooldown and dry-run) act on
    /// each independently. One job's failure never stops the others.
    pub async fn tick(&self) -> Result<(), ControllerError> {
        let prices = self.prices().await?;
        let jobs = self.registry.list_by_state(&self.config.states).await?;

        for job in jobs {
            if let Some(only) = &self.config.job_id_filter {
                if &job.job_id != only {
                    continue;
                }
            }
            let job_id = job.job_id.clone();
            if let Err(err) = self.evaluate_and_act(&job_id, &job.region, job.workload_type, &prices).await {
                tracing::error!(job_id = %job_id, %err, "job evaluation failed, continuing with others");
            }
        }
        Ok(())
    }

    async fn evaluate_and_act(
        &self,
        job_id: &str,
        current_region: &Option<String>,
        workload_type: Option<WorkloadType>,
        prices: &BTreeMap<String, f64>,
    ) -> Result<(), ControllerError> {
        let current_region = current_region
            .as_deref()
            .ok_or_else(|| ControllerError::InvalidInput(format!("job {job_id:?} has no region on record")))?;

        let decision = self.decision.evaluate(prices, current_region, workload_type)?;

        if decision.action != nomadctl_core::job::Action::Migrate {
            tracing::debug!(%job_id, reason = decision.reason.as_str(), "staying");
            return Ok(());
        }
        let target_region = decision
            .target_region
            .clone()
            .expect("migrate decisions always carry a target region");

        if self.in_cooldown(job_id).await {
            tracing::info!(%job_id, %target_region, "migration candidate but job is in cooldown");
            return Ok(());
        }

        if self.config.dry_run {
            tracing::info!(%job_id, %target_region, "dry run: would migrate");
            return Ok(());
        }

        tracing::info!(%job_id, %target_region, "migrating");
        let job = self.registry.get(job_id).await?;
        let source_ip = job
            .public_ip
            .ok_or_else(|| ControllerError::InvalidInput(format!("job {job_id:?} has no public_ip on record")))?;

        self.migrator
            .migrate(MigrationRequest {
                job_id: job_id.to_string(),
                source_ip,
                target_region,
                target_ip: self.config.target_ip.clone(),
                checkpoint_bucket: self.config.checkpoint_bucket.clone(),
                auto_provision: self.config.auto_provision,
                provision_overrides: self.config.provision_overrides.clone(),
            })
            .await?;

        self.last_migration
            .lock()
            .await
            .insert(job_id.to_string(), Instant::now());
        Ok(())
    }

    async fn in_cooldown(&self, job_id: &str) -> bool {
        let last = self.last_migration.lock().await;
        match last.get(job_id) {
            Some(at) => at.elapsed() < self.config.cooldown,
            None => false,
        }
    }

    /// Reuses the last price sample if it's younger than `price_cache_ttl`,
    /// matching `main.py`'s `price_cache` dict.
    async fn prices(&self) -> Result<BTreeMap<String, f64>, ControllerError> {
        let mut cache = self.price_cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.fetched_at.elapsed() < self.config.price_cache_ttl {
                return Ok(cached.prices.clone());
            }
        }

        let mut watcher = self.watcher.lock().await;
        let prices = watcher.poll(&self.config.candidate_regions).await?;
        *cache = Some(CachedPrices {
            fetched_at: Instant::now(),
            prices: prices.clone(),
        });
        Ok(prices)
    }
}
