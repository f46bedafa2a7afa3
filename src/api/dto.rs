use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ExportJob, ExportParams};
use crate::error::ApiError;

/// `POST /exports` body. `kind` is a sibling of `params` on the wire
/// (§6.1); internally the two are merged into the tagged `ExportParams`
/// enum before validation.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub project_ref: String,
    pub kind: String,
    pub params: serde_json::Value,
}

pub fn parse_export_params(kind: &str, params: serde_json::Value) -> Result<ExportParams, ApiError> {
    let mut object = match params {
        serde_json::Value::Object(map) => map,
        _ => {
            return Err(ApiError::Validation {
                field: "params".to_string(),
                reason: "params must be a JSON object".to_string(),
            });
        }
    };
    object.insert("kind".to_string(), serde_json::Value::String(kind.to_string()));
    serde_json::from_value(serde_json::Value::Object(object)).map_err(|e| ApiError::Validation {
        field: "params".to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub project_ref: String,
    pub kind: &'static str,
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output_ref: Option<String>,
    pub output_filename: Option<String>,
    pub error: Option<String>,
    /// Diagnostic only; not part of the contractual response shape in
    /// §6.1 but present on the persisted row (SPEC_FULL.md §10.3).
    pub worker_id: Option<String>,
}

impl From<&ExportJob> for JobSnapshot {
    fn from(job: &ExportJob) -> Self {
        Self {
            job_id: job.id.clone(),
            project_ref: job.project_ref.clone(),
            kind: job.kind.as_str(),
            status: job.status.as_str(),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            output_ref: job.output_ref.clone(),
            output_filename: job.output_filename.clone(),
            error: job.error.clone(),
            worker_id: job.worker_id.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub status: Option<String>,
    pub since: Option<DateTime<Utc>>,
}
