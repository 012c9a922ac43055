use async_trait::async_trait;
use nomadctl_core::job::JobAttrs;
use nomadctl_core::{ControllerError, JobRecord, JobState};
use reqwest::StatusCode;

use crate::Registry;

/// HTTP keyed-store registry backend, grounded in `client-engine::backend`'s
/// `reqwest`-based calls. Deliberately speaks a generic conditional-write
/// protocol (`PUT` + `If-Match: <version>`, `412 Precondition Failed` on
/// mismatch) rather than any specific cloud database's API, per spec §1's
/// non-goal that no cloud-provider semantics live in the core.
pub struct RemoteRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteRegistry {
    pub fn new(base_url: impl Into<String>) -> Self {
        RemoteRegistry {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn job_url(&self, job_id: &str) -> String {
        format!("{}/jobs/{job_id}", self.base_url.trim_end_matches('/'))
    }

    async fn error_body(resp: reqwest::Response) -> String {
        resp.text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string())
    }
}

#[derive(serde::Serialize)]
struct UpdateBody {
    state: JobState,
    #[serde(flatten)]
    attrs: JobAttrs,
}

#[async_trait]
impl Registry for RemoteRegistry {
    async fn get(&self, job_id: &str) -> Result<JobRecord, ControllerError> {
        let resp = self
            .client
            .get(self.job_url(job_id))
            .send()
            .await
            .map_err(|err| ControllerError::RemoteFailure(err.to_string()))?;

        match resp.status() {
            StatusCode::OK => resp
                .json::<JobRecord>()
                .await
                .map_err(|err| ControllerError::RemoteFailure(err.to_string())),
            StatusCode::NOT_FOUND => Err(ControllerError::NotFound(job_id.to_string())),
            _ => Err(ControllerError::RemoteFailure(Self::error_body(resp).await)),
        }
    }

    async fn create(&self, job_id: &str, attrs: JobAttrs) -> Result<JobRecord, ControllerError> {
        let resp = self
            .client
            .post(self.job_url(job_id))
            .json(&attrs)
            .send()
            .await
            .map_err(|err| ControllerError::RemoteFailure(err.to_string()))?;

        match resp.status() {
            StatusCode::OK | StatusCode::CREATED => resp
                .json::<JobRecord>()
                .await
                .map_err(|err| ControllerError::RemoteFailure(err.to_string())),
            StatusCode::CONFLICT => Err(ControllerError::AlreadyExists(job_id.to_string())),
            _ => Err(ControllerError::RemoteFailure(Self::error_body(resp).await)),
        }
    }

    async fn update(
        &self,
        job_id: &str,
        state: JobState,
        attrs: JobAttrs,
        expected_version: Option<u64>,
    ) -> Result<JobRecord, ControllerError> {
        // Every write is conditional, per spec §4.1: when the caller doesn't
        // pin a version, read the current one and CAS against that, rather
        // than sending an unconditional PUT. Mirrors
        // `storage/dynamo_registry.py`'s `_current_version` read-then-CAS.
        let version = match expected_version {
            Some(v) => v,
            None => self.get(job_id).await?.version,
        };

        let resp = self
            .client
            .put(self.job_url(job_id))
            .header("If-Match", version.to_string())
            .json(&UpdateBody { state, attrs })
            .send()
            .await
            .map_err(|err| ControllerError::RemoteFailure(err.to_string()))?;

        match resp.status() {
            StatusCode::OK => resp
                .json::<JobRecord>()
                .await
                .map_err(|err| ControllerError::RemoteFailure(err.to_string())),
            StatusCode::NOT_FOUND => Err(ControllerError::NotFound(job_id.to_string())),
            StatusCode::PRECONDITION_FAILED => {
                Err(ControllerError::ConcurrencyConflict(job_id.to_string()))
            }
            _ => Err(ControllerError::RemoteFailure(Self::error_body(resp).await)),
        }
    }

    async fn list_by_state(&self, states: &[JobState]) -> Result<Vec<JobRecord>, ControllerError> {
        let query: Vec<(&str, &str)> = states.iter().map(|s| ("state", s.as_str())).collect();
        let resp = self
            .client
            .get(format!("{}/jobs", self.base_url.trim_end_matches('/')))
            .query(&query)
            .send()
            .await
            .map_err(|err| ControllerError::RemoteFailure(err.to_string()))?;

        match resp.status() {
            StatusCode::OK => resp
                .json::<Vec<JobRecord>>()
                .await
                .map_err(|err| ControllerError::RemoteFailure(err.to_string())),
            _ => Err(ControllerError::RemoteFailure(Self::error_body(resp).await)),
        }
    }
}
