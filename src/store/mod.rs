mod sqlite;

pub use sqlite::SqliteJobStore;

use async_trait::async_trait;

use crate::domain::{ExportJob, JobFilter};
use crate::error::StoreError;

/// Durable single source of truth for job existence and state transitions.
/// All other components treat an implementation of this trait as the
/// arbiter; see `spec.md` §4.1.
///
/// `claim_next` is the one operation that must be linearizable: under K
/// concurrent callers racing for the same pending job, exactly one may
/// receive it.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: &ExportJob) -> Result<(), StoreError>;

    async fn claim_next(
        &self,
        worker_id: &str,
        kinds: &[crate::domain::JobKind],
    ) -> Result<Option<ExportJob>, StoreError>;

    async fn mark_complete(
        &self,
        job_id: &str,
        output_ref: &str,
        output_filename: &str,
    ) -> Result<ExportJob, StoreError>;

    async fn mark_error(&self, job_id: &str, message: &str) -> Result<ExportJob, StoreError>;

    async fn mark_cancelled(&self, job_id: &str) -> Result<ExportJob, StoreError>;

    /// Request cancellation. `Pending` jobs are cancelled immediately;
    /// `Processing` jobs have their `cancel_requested` flag set for the
    /// driver to observe. Terminal jobs are a no-op (idempotent).
    async fn request_cancel(&self, job_id: &str) -> Result<ExportJob, StoreError>;

    async fn is_cancel_requested(&self, job_id: &str) -> Result<bool, StoreError>;

    async fn get(&self, job_id: &str) -> Result<ExportJob, StoreError>;

    async fn list(&self, filter: &JobFilter) -> Result<Vec<ExportJob>, StoreError>;

    async fn list_active_for_owner(&self, owner: &str) -> Result<Vec<ExportJob>, StoreError>;

    /// Jobs left in `Processing` with no live worker claim — the condition
    /// `crate::recovery` reconciles at startup.
    async fn list_orphaned(&self) -> Result<Vec<ExportJob>, StoreError>;
}
