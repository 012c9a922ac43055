//! Checkpoint and object-store operations, invoked as remote commands over
//! a [`RemoteSession`] rather than as separate transports, per spec §6.
//! Command strings are grounded in
//! `original_source/orchestrator/migrator.py`'s literal shell invocations.

use nomadctl_core::ControllerError;

use crate::session::RemoteSession;

pub async fn checkpoint_dump(session: &mut dyn RemoteSession, pid: u64) -> Result<(), ControllerError> {
    session
        .run_command(&format!("sudo bash /opt/nomadctl/criu_wrapper.sh dump {pid}"))
        .await
        .map(|_| ())
}

/// Images a dump must produce before it's trusted for upload or restore,
/// grounded in `examples/original_source/checkpoint/validate_checkpoint.py`.
const REQUIRED_CHECKPOINT_IMAGES: [&str; 2] = ["core-1.img", "inventory.img"];

/// Checks that the checkpoint workspace for `job_id` contains every required
/// image file, per spec §6's pre-restore validator. Raises `CheckpointInvalid`
/// naming the first missing file rather than proceeding with a truncated or
/// failed dump.
pub async fn validate_checkpoint_images(session: &mut dyn RemoteSession, job_id: &str) -> Result<(), ControllerError> {
    let workspace = format!("/opt/nomadctl/checkpoint/{job_id}");
    for image in REQUIRED_CHECKPOINT_IMAGES {
        let path = format!("{workspace}/{image}");
        if session.run_command(&format!("test -f {path}")).await.is_err() {
            return Err(ControllerError::CheckpointInvalid(path));
        }
    }
    Ok(())
}

pub async fn checkpoint_restore(session: &mut dyn RemoteSession, job_id: &str) -> Result<(), ControllerError> {
    session
        .run_command(&format!(
            "sudo bash /opt/nomadctl/criu_wrapper.sh restore {job_id}"
        ))
        .await
        .map(|_| ())
}

pub async fn checkpoint_tool_version(session: &mut dyn RemoteSession) -> Result<(), ControllerError> {
    session.run_command("criu --version").await.map(|_| ())
}

pub async fn checkpoint_tool_check(session: &mut dyn RemoteSession) -> Result<(), ControllerError> {
    session.run_command("sudo criu check").await.map(|_| ())
}

pub async fn upload_checkpoint(
    session: &mut dyn RemoteSession,
    bucket: &str,
    job_id: &str,
) -> Result<(), ControllerError> {
    session
        .run_command(&format!(
            "python3 /opt/nomadctl/s3_manager.py upload {bucket} {job_id}"
        ))
        .await
        .map(|_| ())
}

pub async fn download_checkpoint(
    session: &mut dyn RemoteSession,
    bucket: &str,
    job_id: &str,
) -> Result<(), ControllerError> {
    session
        .run_command(&format!(
            "python3 /opt/nomadctl/s3_manager.py download {bucket} {job_id}"
        ))
        .await
        .map(|_| ())
}

/// Unconditional, unretried fence kill: spec §4.4 and the original both run
/// this exactly once regardless of outcome, since by this point the
/// checkpoint is already durably uploaded and a failed kill just means a
/// stale process keeps running on a host about to be abandoned.
pub async fn fence_kill(session: &mut dyn RemoteSession, pid: u64) -> Result<(), ControllerError> {
    session.run_command(&format!("sudo kill -9 {pid}")).await.map(|_| ())
}
