use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::domain::ParamsValidationError;

/// Errors raised by `crate::store`. Write operations that violate a
/// precondition (e.g. `mark_complete` on a job that is not `processing`)
/// return `PreconditionFailed` rather than panicking; callers treat this as
/// a lost race and reconcile by re-reading state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(String),
    #[error("job {0} already exists")]
    AlreadyExists(String),
    #[error("precondition failed for job {job_id}: expected status {expected}, found {found}")]
    PreconditionFailed {
        job_id: String,
        expected: &'static str,
        found: String,
    },
    #[error("job store unreachable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

/// Errors surfaced by a `crate::drivers::PipelineDriver`. `Cancelled` is
/// not really a failure — the scheduler maps it to a `Cancelled` terminal
/// state rather than `Error` — but it still needs to unwind through the
/// same `Result` the rest of driver execution uses.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("cancelled")]
    Cancelled,
    #[error("{0}")]
    Failed(String),
    #[error("remote GPU service error: {0}")]
    RemoteGpu(#[from] crate::gpu_client::GpuClientError),
    #[error("blob store error: {0}")]
    BlobStore(#[from] crate::blob_store::BlobStoreError),
}

impl DriverError {
    /// Scrub a raw error into the short, path- and credential-free string
    /// that is safe to persist on the job row and show to a client.
    pub fn sanitized_message(&self) -> String {
        match self {
            DriverError::Cancelled => "cancelled".to_string(),
            other => sanitize(&other.to_string()),
        }
    }
}

/// Strip anything that looks like a filesystem path or a credential out of
/// an error message before it is persisted or shown to a caller.
pub fn sanitize(message: &str) -> String {
    static PATH_RE: once_cell::sync::Lazy<regex::Regex> = once_cell::sync::Lazy::new(|| {
        regex::Regex::new(r#"(?:[A-Za-z]:\\|/)[^\s'\"]+"#).expect("static regex")
    });
    static CRED_RE: once_cell::sync::Lazy<regex::Regex> = once_cell::sync::Lazy::new(|| {
        regex::Regex::new(r#"(?i)(key|token|secret|password)=\S+"#).expect("static regex")
    });
    let scrubbed = PATH_RE.replace_all(message, "<path>");
    let scrubbed = CRED_RE.replace_all(&scrubbed, "$1=<redacted>");
    scrubbed.into_owned()
}

/// Errors surfaced directly by `crate::api` handlers, mapped to the HTTP
/// status codes in `spec.md` §4.6 / §6.1.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{field}: {reason}")]
    Validation { field: String, reason: String },
    #[error("admission denied: {0}")]
    AdmissionDenied(String),
    #[error("not found")]
    NotFound,
    #[error("job is not complete")]
    NotComplete,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("blob store error: {0}")]
    Blob(#[from] crate::blob_store::BlobStoreError),
}

impl From<ParamsValidationError> for ApiError {
    fn from(err: ParamsValidationError) -> Self {
        ApiError::Validation {
            field: "params".to_string(),
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    field: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, field) = match &self {
            ApiError::Validation { field, .. } => (StatusCode::BAD_REQUEST, Some(field.clone())),
            ApiError::AdmissionDenied(_) => (StatusCode::PAYMENT_REQUIRED, None),
            ApiError::NotFound => (StatusCode::NOT_FOUND, None),
            ApiError::NotComplete => (StatusCode::CONFLICT, None),
            ApiError::Store(StoreError::NotFound(_)) => (StatusCode::NOT_FOUND, None),
            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
            ApiError::Blob(crate::blob_store::BlobStoreError::NotFound(_)) => (StatusCode::NOT_FOUND, None),
            ApiError::Blob(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal error handling request");
        }
        let body = ErrorBody {
            error: sanitize(&self.to_string()),
            field,
        };
        (status, Json(body)).into_response()
    }
}
