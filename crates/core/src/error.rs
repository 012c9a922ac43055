/// Error taxonomy from spec §7. Callers branch on variant rather than
/// catching a broad exception, per spec §9 ("Exception-for-control-flow
/// patterns in the source ... are mapped to explicit error kinds").
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("job {0:?} not found")]
    NotFound(String),

    #[error("job {0:?} already exists")]
    AlreadyExists(String),

    #[error("concurrency conflict updating job {0:?}")]
    ConcurrencyConflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("remote command failed: {0}")]
    RemoteFailure(String),

    #[error("remote command timed out after {0:?}")]
    RemoteTimeout(std::time::Duration),

    #[error("provisioning failed: {0}")]
    ProvisionFailed(String),

    #[error("checkpoint invalid: missing {0:?}")]
    CheckpointInvalid(String),

    #[error("required configuration value missing: {0}")]
    ConfigMissing(String),
}
