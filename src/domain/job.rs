use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::params::ExportParams;

/// The kind of export an [`ExportJob`] performs. Drives which pipeline
/// driver the scheduler resolves for a job (see `crate::drivers`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    Framing,
    Overlay,
    MultiClip,
    AnnotateExtract,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Framing => "framing",
            JobKind::Overlay => "overlay",
            JobKind::MultiClip => "multi-clip",
            JobKind::AnnotateExtract => "annotate-extract",
        }
    }

    /// Inverse of `as_str`. The Job Store persists the TEXT form; this
    /// reconstructs the enum when reading a row back.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "framing" => Some(JobKind::Framing),
            "overlay" => Some(JobKind::Overlay),
            "multi-clip" => Some(JobKind::MultiClip),
            "annotate-extract" => Some(JobKind::AnnotateExtract),
            _ => None,
        }
    }
}

/// Job lifecycle state. `Complete`, `Error`, and `Cancelled` are terminal.
///
/// A distinct `Cancelled` variant is used rather than folding cancellation
/// into `Error(message="cancelled")`: the wire schema (`/ws/exports/{id}`)
/// already enumerates `cancelled` as its own `status` value, so the internal
/// state machine follows that choice rather than inventing a second one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Complete,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::Error | JobStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "complete" => Some(JobStatus::Complete),
            "error" => Some(JobStatus::Error),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

/// The central entity: a durable request to produce a derived video
/// artifact from project inputs.
///
/// Invariants (enforced by `crate::store`, never by callers):
/// - `status` only ever advances through the graph in `spec.md` §4.2.
/// - `output_ref` is `Some` iff `status == Complete`.
/// - `error` is `Some` iff `status == Error`.
/// - `input parameters are immutable after `create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportJob {
    pub id: String,
    pub owner: String,
    pub project_ref: String,
    pub kind: JobKind,
    pub params: ExportParams,
    pub status: JobStatus,
    pub output_ref: Option<String>,
    pub output_filename: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub cancel_requested: bool,
    pub attempts: i64,
}

impl ExportJob {
    /// Build a freshly-submitted job in the `Pending` state. `id` is
    /// generated by the caller (the API layer) so it can be returned to the
    /// client without waiting on a store round-trip.
    pub fn new(id: String, owner: String, project_ref: String, params: ExportParams) -> Self {
        Self {
            id,
            owner,
            project_ref,
            kind: params.kind(),
            params,
            status: JobStatus::Pending,
            output_ref: None,
            output_filename: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            worker_id: None,
            cancel_requested: false,
            attempts: 0,
        }
    }
}

/// Filter accepted by `JobStore::list`.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub project_ref: Option<String>,
    pub owner: Option<String>,
    pub status: Option<JobStatus>,
    pub since: Option<DateTime<Utc>>,
}
