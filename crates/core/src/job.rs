use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a job, per spec §4.4. Serialized as the upper-case
/// strings used throughout the registry and the control-loop logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "CHECKPOINTING")]
    Checkpointing,
    #[serde(rename = "UPLOADING")]
    Uploading,
    #[serde(rename = "PROVISIONING")]
    Provisioning,
    #[serde(rename = "VALIDATING")]
    Validating,
    #[serde(rename = "DOWNLOADING")]
    Downloading,
    #[serde(rename = "RESTORING")]
    Restoring,
}

impl JobState {
    /// The literal string used in registry storage and `list_by_state` filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Running => "RUNNING",
            JobState::Checkpointing => "CHECKPOINTING",
            JobState::Uploading => "UPLOADING",
            JobState::Provisioning => "PROVISIONING",
            JobState::Validating => "VALIDATING",
            JobState::Downloading => "DOWNLOADING",
            JobState::Restoring => "RESTORING",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = crate::error::ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(JobState::Running),
            "CHECKPOINTING" => Ok(JobState::Checkpointing),
            "UPLOADING" => Ok(JobState::Uploading),
            "PROVISIONING" => Ok(JobState::Provisioning),
            "VALIDATING" => Ok(JobState::Validating),
            "DOWNLOADING" => Ok(JobState::Downloading),
            "RESTORING" => Ok(JobState::Restoring),
            other => Err(crate::error::ControllerError::InvalidInput(format!(
                "unknown job state {other:?}"
            ))),
        }
    }
}

/// Policy workload class, per spec §3/§4.3. `Unknown` covers an absent or
/// unrecognized `workload_type`, which falls back to the global spike
/// threshold rather than a class-specific one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadType {
    Short,
    Medium,
    Long,
    Stateful,
    Unknown,
}

impl WorkloadType {
    /// Normalizes a free-form workload type string to lower case, per spec
    /// §4.3 step 5 ("normalize `workload_type` to lower case").
    pub fn parse(raw: &str) -> WorkloadType {
        match raw.to_ascii_lowercase().as_str() {
            "short" => WorkloadType::Short,
            "medium" => WorkloadType::Medium,
            "long" => WorkloadType::Long,
            "stateful" => WorkloadType::Stateful,
            _ => WorkloadType::Unknown,
        }
    }
}

/// Authoritative per-job record held by the registry. Matches spec §3's
/// field list exactly; `extra` is the open-attribute escape hatch noted in
/// spec §9 for remote-backend attributes the core never interprets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub state: JobState,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub public_ip: Option<String>,
    #[serde(default)]
    pub pid: Option<u64>,
    #[serde(default)]
    pub workload_type: Option<WorkloadType>,
    pub version: u64,
    pub last_updated: DateTime<Utc>,
    #[serde(flatten, default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Attributes supplied to `Registry::create`/`Registry::update`. All fields
/// are optional so a caller can patch only what changed, matching the
/// original's `**attrs` kwargs merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobAttrs {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub public_ip: Option<String>,
    #[serde(default)]
    pub pid: Option<u64>,
    #[serde(default)]
    pub workload_type: Option<WorkloadType>,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Action a `DecisionEngine` returns for a job, per spec §3/§4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Stay,
    Migrate,
}

/// Why a `Decision` was reached; the four reasons enumerated in spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    AlreadyCheapest,
    WorkloadShortNoMigrate,
    WithinThreshold,
    PriceSpike,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::AlreadyCheapest => "already_cheapest",
            DecisionReason::WorkloadShortNoMigrate => "workload_short_no_migrate",
            DecisionReason::WithinThreshold => "within_threshold",
            DecisionReason::PriceSpike => "price_spike",
        }
    }
}

/// Ephemeral output of `DecisionEngine::evaluate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    pub target_region: Option<String>,
    pub reason: DecisionReason,
}

impl Decision {
    pub fn stay(reason: DecisionReason) -> Self {
        Decision {
            action: Action::Stay,
            target_region: None,
            reason,
        }
    }

    pub fn migrate(target_region: impl Into<String>) -> Self {
        Decision {
            action: Action::Migrate,
            target_region: Some(target_region.into()),
            reason: DecisionReason::PriceSpike,
        }
    }
}

/// Immutable, load-once migration policy, per spec §3. Deserializable
/// directly from the same YAML shape
/// `original_source/orchestrator/decision_engine.py` loads, so the policy
/// file on disk is unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default = "default_price_spike_threshold")]
    pub price_spike_threshold: f64,
    /// `None` for a class means "never migrate" (only meaningful for `short`,
    /// which §4.3 treats as a hard opt-out regardless of this map).
    #[serde(default = "default_workload_thresholds")]
    pub workload_thresholds: BTreeMap<WorkloadType, Option<f64>>,
}

fn default_price_spike_threshold() -> f64 {
    0.01
}

fn default_workload_thresholds() -> BTreeMap<WorkloadType, Option<f64>> {
    let mut workload_thresholds = BTreeMap::new();
    workload_thresholds.insert(WorkloadType::Short, None);
    workload_thresholds.insert(WorkloadType::Medium, Some(0.25));
    workload_thresholds.insert(WorkloadType::Long, Some(0.12));
    workload_thresholds.insert(WorkloadType::Stateful, Some(0.40));
    workload_thresholds
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            price_spike_threshold: default_price_spike_threshold(),
            workload_thresholds: default_workload_thresholds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn job_state_round_trips_through_its_string_form() {
        for state in [
            JobState::Running,
            JobState::Checkpointing,
            JobState::Uploading,
            JobState::Provisioning,
            JobState::Validating,
            JobState::Downloading,
            JobState::Restoring,
        ] {
            assert_eq!(JobState::from_str(state.as_str()).unwrap(), state);
        }
    }

    #[test]
    fn job_state_from_str_rejects_unknown_values() {
        assert!(JobState::from_str("BOGUS").is_err());
    }

    #[test]
    fn workload_type_parse_normalizes_case() {
        assert_eq!(WorkloadType::parse("SHORT"), WorkloadType::Short);
        assert_eq!(WorkloadType::parse("Medium"), WorkloadType::Medium);
        assert_eq!(WorkloadType::parse("not-a-real-class"), WorkloadType::Unknown);
    }

    #[test]
    fn policy_default_matches_spec_thresholds() {
        let policy = Policy::default();
        assert_eq!(policy.price_spike_threshold, 0.01);
        assert_eq!(policy.workload_thresholds.get(&WorkloadType::Short), Some(&None));
        assert_eq!(
            policy.workload_thresholds.get(&WorkloadType::Medium),
            Some(&Some(0.25))
        );
        assert_eq!(policy.workload_thresholds.get(&WorkloadType::Long), Some(&Some(0.12)));
        assert_eq!(
            policy.workload_thresholds.get(&WorkloadType::Stateful),
            Some(&Some(0.40))
        );
    }
}
