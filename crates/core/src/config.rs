use std::path::Path;

use serde::Deserialize;

use crate::error::ControllerError;

/// Registry backend selector, per spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackendKind {
    File,
    Remote,
}

/// The subset of `config/runtime.yaml` this controller understands. Field
/// names match spec §6 and `original_source/orchestrator/config_loader.py`
/// exactly so the same YAML file works unmodified.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFileConfig {
    pub checkpoint_bucket: Option<String>,
    pub source_region: Option<String>,
    pub target_region: Option<String>,
    #[serde(default)]
    pub candidate_regions: Vec<String>,
    pub instance_type: Option<String>,
    pub target_ami_id: Option<String>,
    pub target_security_group_id: Option<String>,
    pub ssh_key_name: Option<String>,
    pub max_spot_price: Option<String>,
    pub registry_backend: Option<RegistryBackendKind>,
    pub remote_table: Option<String>,
    pub remote_region: Option<String>,
    pub auto_provision: Option<bool>,
}

/// Fully resolved runtime configuration, after the env > file > default
/// precedence spec §6 specifies.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub checkpoint_bucket: Option<String>,
    pub source_region: Option<String>,
    pub target_region: Option<String>,
    pub candidate_regions: Vec<String>,
    pub instance_type: Option<String>,
    pub target_ami_id: Option<String>,
    pub target_security_group_id: Option<String>,
    pub ssh_key_name: Option<String>,
    pub max_spot_price: Option<String>,
    pub registry_backend: Option<RegistryBackendKind>,
    pub remote_table: Option<String>,
    pub remote_region: Option<String>,
    pub auto_provision: bool,
}

fn env_bool_truthy(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

impl RuntimeConfig {
    /// Loads `config/runtime.yaml` (if present) then overlays environment
    /// variables, matching `load_runtime_config` in the original Python:
    /// env vars always win over the file.
    pub fn load(path: &Path) -> Result<Self, ControllerError> {
        let file_cfg = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|err| {
                ControllerError::ConfigMissing(format!("reading {}: {err}", path.display()))
            })?;
            serde_yaml::from_str(&raw).map_err(|err| {
                ControllerError::ConfigMissing(format!("parsing {}: {err}", path.display()))
            })?
        } else {
            RawFileConfig::default()
        };

        Ok(Self::merge_env(file_cfg))
    }

    fn merge_env(file_cfg: RawFileConfig) -> Self {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        let candidate_regions = env("CANDIDATE_REGIONS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or(file_cfg.candidate_regions);

        let auto_provision = match env("AUTO_PROVISION") {
            Some(raw) => env_bool_truthy(&raw),
            None => file_cfg.auto_provision.unwrap_or(false),
        };

        RuntimeConfig {
            checkpoint_bucket: env("CHECKPOINT_BUCKET").or(file_cfg.checkpoint_bucket),
            source_region: env("SOURCE_REGION").or(file_cfg.source_region),
            target_region: env("TARGET_REGION").or(file_cfg.target_region),
            candidate_regions,
            instance_type: env("INSTANCE_TYPE").or(file_cfg.instance_type),
            target_ami_id: env("TARGET_AMI_ID").or(file_cfg.target_ami_id),
            target_security_group_id: env("TARGET_SECURITY_GROUP_ID")
                .or(file_cfg.target_security_group_id),
            ssh_key_name: env("SSH_KEY_NAME").or(file_cfg.ssh_key_name),
            max_spot_price: env("MAX_SPOT_PRICE").or(file_cfg.max_spot_price),
            registry_backend: match env("REGISTRY_BACKEND").as_deref() {
                Some("file") => Some(RegistryBackendKind::File),
                Some("remote") => Some(RegistryBackendKind::Remote),
                Some(_) | None => file_cfg.registry_backend,
            },
            remote_table: env("REMOTE_TABLE").or(file_cfg.remote_table),
            remote_region: env("REMOTE_REGION")
                .or(file_cfg.remote_region)
                .or_else(|| env("SOURCE_REGION")),
            auto_provision,
        }
    }

    /// `checkpoint_bucket` is required at migration time (spec §6), not at
    /// startup, so this is a separate fallible accessor rather than a
    /// load-time failure.
    pub fn require_checkpoint_bucket(&self) -> Result<&str, ControllerError> {
        self.checkpoint_bucket.as_deref().ok_or_else(|| {
            ControllerError::ConfigMissing("checkpoint_bucket".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_provision_accepts_case_insensitive_truthy_values() {
        for v in ["1", "true", "TRUE", "yes", "Yes"] {
            assert!(env_bool_truthy(v), "{v:?} should be truthy");
        }
        for v in ["0", "false", "no", "", "maybe"] {
            assert!(!env_bool_truthy(v), "{v:?} should not be truthy");
        }
    }

    #[test]
    fn merge_env_falls_back_to_file_when_env_absent() {
        // SAFETY: no other test in this process touches these keys concurrently.
        unsafe {
            std::env::remove_var("CHECKPOINT_BUCKET");
            std::env::remove_var("CANDIDATE_REGIONS");
            std::env::remove_var("AUTO_PROVISION");
        }
        let file_cfg = RawFileConfig {
            checkpoint_bucket: Some("from-file".to_string()),
            candidate_regions: vec!["us-east-1".to_string()],
            auto_provision: Some(true),
            ..Default::default()
        };
        let cfg = RuntimeConfig::merge_env(file_cfg);
        assert_eq!(cfg.checkpoint_bucket.as_deref(), Some("from-file"));
        assert_eq!(cfg.candidate_regions, vec!["us-east-1".to_string()]);
        assert!(cfg.auto_provision);
    }
}
