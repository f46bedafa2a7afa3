use serde::{Deserialize, Serialize};

use super::job::JobStatus;

/// Ephemeral progress signal. Never persisted; purely a UX channel fanned
/// out by `crate::progress_hub`. Correctness of job completion never
/// depends on any subscriber having observed one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: String,
    pub seq: u64,
    pub status: JobStatus,
    /// Only populated while `status == Processing`.
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub phase: Option<String>,
    pub output_ref: Option<String>,
    pub output_filename: Option<String>,
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn processing(job_id: impl Into<String>, seq: u64, percent: u8, message: impl Into<String>, phase: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            seq,
            status: JobStatus::Processing,
            progress: Some(percent.min(100)),
            message: Some(message.into()),
            phase: Some(phase.into()),
            output_ref: None,
            output_filename: None,
            error: None,
        }
    }

    pub fn complete(job_id: impl Into<String>, seq: u64, output_ref: impl Into<String>, output_filename: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            seq,
            status: JobStatus::Complete,
            progress: None,
            message: None,
            phase: None,
            output_ref: Some(output_ref.into()),
            output_filename: Some(output_filename.into()),
            error: None,
        }
    }

    pub fn error(job_id: impl Into<String>, seq: u64, error: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            seq,
            status: JobStatus::Error,
            progress: None,
            message: None,
            phase: None,
            output_ref: None,
            output_filename: None,
            error: Some(error.into()),
        }
    }

    pub fn cancelled(job_id: impl Into<String>, seq: u64) -> Self {
        Self {
            job_id: job_id.into(),
            seq,
            status: JobStatus::Cancelled,
            progress: None,
            message: None,
            phase: None,
            output_ref: None,
            output_filename: None,
            error: None,
        }
    }

    pub fn pending(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            seq: 0,
            status: JobStatus::Pending,
            progress: None,
            message: None,
            phase: None,
            output_ref: None,
            output_filename: None,
            error: None,
        }
    }
}
