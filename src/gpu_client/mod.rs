use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::timeout;

use crate::blob_store::{BlobStore, BlobStoreError};
use crate::error::sanitize;

/// Errors surfaced by `RemoteGpuClient`. Every variant's `Display` is
/// already sanitized so it can flow straight into `DriverError::RemoteGpu`
/// and from there onto the job row.
#[derive(Debug, Error)]
pub enum GpuClientError {
    #[error("remote GPU service unreachable: {0}")]
    Transport(String),
    #[error("remote GPU service rejected the job: {0}")]
    RemoteFailure(String),
    #[error("remote GPU operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("blob store error: {0}")]
    BlobStore(#[from] BlobStoreError),
}

impl From<reqwest::Error> for GpuClientError {
    fn from(err: reqwest::Error) -> Self {
        GpuClientError::Transport(sanitize(&err.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    kind: &'a str,
    input_keys: &'a [String],
    description: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    remote_job_id: String,
}

#[derive(Debug, Deserialize)]
struct RemoteStatus {
    state: RemoteState,
    percent: Option<u8>,
    phase: Option<String>,
    message: Option<String>,
    output_key: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum RemoteState {
    Queued,
    Running,
    Complete,
    Error,
}

/// Remote progress translated into the driver's `progress_cb` shape.
pub struct RemoteProgress {
    pub percent: u8,
    pub phase: String,
    pub message: String,
}

/// Adapts a driver's input/output contract to a remote compute service, per
/// §4.7: upload, submit, poll-to-terminal, download. Every phase has its
/// own timeout; on timeout the client attempts a best-effort remote cancel
/// before raising.
pub struct RemoteGpuClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    phase_timeout: Duration,
    poll_interval: Duration,
}

impl RemoteGpuClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            phase_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(2),
        }
    }

    /// Upload local blob-store bytes to the remote service and return the
    /// keys the remote service now holds, in input order.
    pub async fn upload_inputs(
        &self,
        blob_store: &dyn BlobStore,
        local_keys: &[String],
    ) -> Result<Vec<String>, GpuClientError> {
        let mut remote_keys = Vec::with_capacity(local_keys.len());
        for key in local_keys {
            let bytes = blob_store.get(key).await?;
            let remote_key = timeout(self.phase_timeout, self.upload_one(key, bytes))
                .await
                .map_err(|_| GpuClientError::Timeout(self.phase_timeout))??;
            remote_keys.push(remote_key);
        }
        Ok(remote_keys)
    }

    async fn upload_one(&self, local_key: &str, bytes: Vec<u8>) -> Result<String, GpuClientError> {
        let response = self
            .http
            .put(format!("{}/blobs/{}", self.base_url, local_key))
            .bearer_auth(&self.api_key)
            .body(bytes)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| GpuClientError::Transport(sanitize(&e.to_string())))?;
        let body: serde_json::Value = response.json().await?;
        body.get("remote_key")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| GpuClientError::RemoteFailure("missing remote_key in upload response".into()))
    }

    pub async fn submit(
        &self,
        kind: &str,
        input_keys: &[String],
        description: serde_json::Value,
    ) -> Result<String, GpuClientError> {
        let request = SubmitRequest { kind, input_keys, description };
        let response = timeout(
            self.phase_timeout,
            self.http
                .post(format!("{}/jobs", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&request)
                .send(),
        )
        .await
        .map_err(|_| GpuClientError::Timeout(self.phase_timeout))??
        .error_for_status()
        .map_err(|e| GpuClientError::Transport(sanitize(&e.to_string())))?;
        let body: SubmitResponse = response.json().await?;
        Ok(body.remote_job_id)
    }

    /// Poll until the remote job reaches a terminal state, invoking
    /// `on_progress` for each intermediate status. Returns the remote
    /// output key on success.
    pub async fn poll_until_terminal(
        &self,
        remote_job_id: &str,
        mut cancel_signal: impl FnMut() -> bool,
        mut on_progress: impl FnMut(RemoteProgress),
    ) -> Result<String, GpuClientError> {
        loop {
            if cancel_signal() {
                let _ = self.cancel_best_effort(remote_job_id).await;
                return Err(GpuClientError::RemoteFailure("cancelled".to_string()));
            }
            let status = self.fetch_status(remote_job_id).await?;
            match status.state {
                RemoteState::Queued | RemoteState::Running => {
                    on_progress(RemoteProgress {
                        percent: status.percent.unwrap_or(0).min(100),
                        phase: status.phase.unwrap_or_else(|| "remote".to_string()),
                        message: status.message.unwrap_or_default(),
                    });
                    tokio::time::sleep(self.poll_interval).await;
                }
                RemoteState::Complete => {
                    return status
                        .output_key
                        .ok_or_else(|| GpuClientError::RemoteFailure("complete with no output_key".into()));
                }
                RemoteState::Error => {
                    return Err(GpuClientError::RemoteFailure(
                        status.error.unwrap_or_else(|| "remote job failed".to_string()),
                    ));
                }
            }
        }
    }

    async fn fetch_status(&self, remote_job_id: &str) -> Result<RemoteStatus, GpuClientError> {
        let response = timeout(
            self.phase_timeout,
            self.http
                .get(format!("{}/jobs/{}", self.base_url, remote_job_id))
                .bearer_auth(&self.api_key)
                .send(),
        )
        .await
        .map_err(|_| GpuClientError::Timeout(self.phase_timeout))??
        .error_for_status()
        .map_err(|e| GpuClientError::Transport(sanitize(&e.to_string())))?;
        Ok(response.json().await?)
    }

    async fn cancel_best_effort(&self, remote_job_id: &str) -> Result<(), GpuClientError> {
        let _ = self
            .http
            .delete(format!("{}/jobs/{}", self.base_url, remote_job_id))
            .bearer_auth(&self.api_key)
            .send()
            .await;
        Ok(())
    }

    pub async fn download_output(
        &self,
        blob_store: &dyn BlobStore,
        remote_output_key: &str,
    ) -> Result<String, GpuClientError> {
        let response = timeout(
            self.phase_timeout,
            self.http
                .get(format!("{}/blobs/{}", self.base_url, remote_output_key))
                .bearer_auth(&self.api_key)
                .send(),
        )
        .await
        .map_err(|_| GpuClientError::Timeout(self.phase_timeout))??
        .error_for_status()
        .map_err(|e| GpuClientError::Transport(sanitize(&e.to_string())))?;
        let bytes = response.bytes().await?.to_vec();
        Ok(blob_store.put(bytes).await?)
    }
}

/// Bridges `RemoteGpuClient` to the `Encoder` contract so a driver's
/// `backend_mode = remote-gpu` path reuses the exact same framing/overlay/
/// multi-clip logic as the local path — only the encode step differs.
pub struct RemoteGpuEncoder {
    client: Arc<RemoteGpuClient>,
    blob_store: Arc<dyn BlobStore>,
}

impl RemoteGpuEncoder {
    pub fn new(client: Arc<RemoteGpuClient>, blob_store: Arc<dyn BlobStore>) -> Self {
        Self { client, blob_store }
    }
}

#[async_trait::async_trait]
impl crate::drivers::encoder::Encoder for RemoteGpuEncoder {
    async fn encode(
        &self,
        request: crate::drivers::encoder::EncodeRequest,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<Vec<u8>, crate::error::DriverError> {
        let description = serde_json::json!({
            "duration_seconds": request.duration_seconds,
            "frame_rate": request.frame_rate,
            "aspect_ratio": {"width": request.aspect_ratio.width, "height": request.aspect_ratio.height},
            "include_audio": request.include_audio,
        });
        let remote_job_id = self
            .client
            .submit("encode", &[], description)
            .await
            .map_err(crate::error::DriverError::RemoteGpu)?;
        let output_key = self
            .client
            .poll_until_terminal(&remote_job_id, || false, |progress| on_progress(progress.percent))
            .await
            .map_err(crate::error::DriverError::RemoteGpu)?;
        let local_key = self
            .client
            .download_output(self.blob_store.as_ref(), &output_key)
            .await
            .map_err(crate::error::DriverError::RemoteGpu)?;
        self.blob_store
            .get(&local_key)
            .await
            .map_err(crate::error::DriverError::BlobStore)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_sanitized() {
        let err = GpuClientError::Transport(sanitize("connect to /etc/secrets/gpu.key failed"));
        assert_eq!(err.to_string(), "remote GPU service unreachable: connect to <path> failed");
    }
}
