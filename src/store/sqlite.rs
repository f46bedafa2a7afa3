use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Row};

use crate::domain::{ExportJob, ExportParams, JobFilter, JobKind, JobStatus};
use crate::error::StoreError;

use super::JobStore;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS exports (
    id TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    project_ref TEXT NOT NULL,
    kind TEXT NOT NULL,
    status TEXT NOT NULL,
    params TEXT NOT NULL,
    output_ref TEXT,
    output_filename TEXT,
    error TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    worker_id TEXT,
    cancel_requested INTEGER NOT NULL DEFAULT 0,
    attempts INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_exports_status_created ON exports(status, created_at);
CREATE INDEX IF NOT EXISTS idx_exports_owner_status ON exports(owner, status);
CREATE INDEX IF NOT EXISTS idx_exports_project_created ON exports(project_ref, created_at DESC);
"#;

#[derive(FromRow)]
struct ExportRow {
    id: String,
    owner: String,
    project_ref: String,
    kind: String,
    status: String,
    params: String,
    output_ref: Option<String>,
    output_filename: Option<String>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    worker_id: Option<String>,
    cancel_requested: bool,
    attempts: i64,
}

impl ExportRow {
    fn into_job(self) -> Result<ExportJob, StoreError> {
        let kind = JobKind::from_str(&self.kind)
            .ok_or_else(|| StoreError::Unavailable(sqlx::Error::Decode(
                format!("unknown job kind {}", self.kind).into(),
            )))?;
        let status = JobStatus::from_str(&self.status)
            .ok_or_else(|| StoreError::Unavailable(sqlx::Error::Decode(
                format!("unknown job status {}", self.status).into(),
            )))?;
        let params: ExportParams = serde_json::from_str(&self.params).map_err(|e| {
            StoreError::Unavailable(sqlx::Error::Decode(
                format!("malformed params for job {}: {e}", self.id).into(),
            ))
        })?;
        Ok(ExportJob {
            id: self.id,
            owner: self.owner,
            project_ref: self.project_ref,
            kind,
            params,
            status,
            output_ref: self.output_ref,
            output_filename: self.output_filename,
            error: self.error,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            worker_id: self.worker_id,
            cancel_requested: self.cancel_requested,
            attempts: self.attempts,
        })
    }
}

/// `JobStore` backed by a single SQLite database. `claim_next` is a single
/// `UPDATE ... WHERE id = (SELECT ...) RETURNING *` statement: SQLite's
/// single-writer model gives this the linearizability `spec.md` §4.1
/// demands without an explicit application-level lock.
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn in_memory() -> Self {
        Self::connect("sqlite::memory:").await.expect("in-memory sqlite store")
    }

    async fn fetch_one(&self, job_id: &str) -> Result<ExportJob, StoreError> {
        let row = sqlx::query_as::<_, ExportRow>("SELECT * FROM exports WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        row.into_job()
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(&self, job: &ExportJob) -> Result<(), StoreError> {
        let params = serde_json::to_string(&job.params).expect("ExportParams is always serializable");
        let result = sqlx::query(
            r#"INSERT INTO exports
                (id, owner, project_ref, kind, status, params, created_at, cancel_requested, attempts)
               VALUES (?, ?, ?, ?, ?, ?, ?, 0, 0)"#,
        )
        .bind(&job.id)
        .bind(&job.owner)
        .bind(&job.project_ref)
        .bind(job.kind.as_str())
        .bind(job.status.as_str())
        .bind(params)
        .bind(job.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::AlreadyExists(job.id.clone()))
            }
            Err(e) => Err(StoreError::Unavailable(e)),
        }
    }

    async fn claim_next(
        &self,
        worker_id: &str,
        kinds: &[JobKind],
    ) -> Result<Option<ExportJob>, StoreError> {
        if kinds.is_empty() {
            return Ok(None);
        }
        let kind_list = kinds.iter().map(|k| format!("'{}'", k.as_str())).collect::<Vec<_>>().join(",");
        let sql = format!(
            r#"UPDATE exports
               SET status = 'processing', started_at = ?, worker_id = ?, attempts = attempts + 1
               WHERE id = (
                   SELECT id FROM exports
                   WHERE status = 'pending' AND kind IN ({kind_list})
                   ORDER BY created_at, id
                   LIMIT 1
               )
               RETURNING *"#
        );
        let row = sqlx::query_as::<_, ExportRow>(&sql)
            .bind(Utc::now())
            .bind(worker_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ExportRow::into_job).transpose()
    }

    async fn mark_complete(
        &self,
        job_id: &str,
        output_ref: &str,
        output_filename: &str,
    ) -> Result<ExportJob, StoreError> {
        let result = sqlx::query(
            r#"UPDATE exports
               SET status = 'complete', output_ref = ?, output_filename = ?, completed_at = ?
               WHERE id = ? AND status = 'processing'"#,
        )
        .bind(output_ref)
        .bind(output_filename)
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        self.ensure_transition_applied(job_id, result.rows_affected(), "processing").await?;
        self.fetch_one(job_id).await
    }

    async fn mark_error(&self, job_id: &str, message: &str) -> Result<ExportJob, StoreError> {
        let result = sqlx::query(
            r#"UPDATE exports
               SET status = 'error', error = ?, completed_at = ?
               WHERE id = ? AND status = 'processing'"#,
        )
        .bind(message)
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        self.ensure_transition_applied(job_id, result.rows_affected(), "processing").await?;
        self.fetch_one(job_id).await
    }

    async fn mark_cancelled(&self, job_id: &str) -> Result<ExportJob, StoreError> {
        let result = sqlx::query(
            r#"UPDATE exports
               SET status = 'cancelled', completed_at = ?
               WHERE id = ? AND status IN ('pending', 'processing')"#,
        )
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        self.ensure_transition_applied(job_id, result.rows_affected(), "pending or processing").await?;
        self.fetch_one(job_id).await
    }

    async fn request_cancel(&self, job_id: &str) -> Result<ExportJob, StoreError> {
        let job = self.fetch_one(job_id).await?;
        match job.status {
            JobStatus::Pending => self.mark_cancelled(job_id).await,
            JobStatus::Processing => {
                sqlx::query("UPDATE exports SET cancel_requested = 1 WHERE id = ? AND status = 'processing'")
                    .bind(job_id)
                    .execute(&self.pool)
                    .await?;
                self.fetch_one(job_id).await
            }
            // Terminal: no-op, idempotent.
            JobStatus::Complete | JobStatus::Error | JobStatus::Cancelled => Ok(job),
        }
    }

    async fn is_cancel_requested(&self, job_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT cancel_requested FROM exports WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        Ok(row.try_get::<bool, _>("cancel_requested")?)
    }

    async fn get(&self, job_id: &str) -> Result<ExportJob, StoreError> {
        self.fetch_one(job_id).await
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<ExportJob>, StoreError> {
        let mut sql = "SELECT * FROM exports WHERE 1 = 1".to_string();
        if filter.project_ref.is_some() {
            sql.push_str(" AND project_ref = ?");
        }
        if filter.owner.is_some() {
            sql.push_str(" AND owner = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.since.is_some() {
            sql.push_str(" AND created_at >= ?");
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut query = sqlx::query_as::<_, ExportRow>(&sql);
        if let Some(project_ref) = &filter.project_ref {
            query = query.bind(project_ref);
        }
        if let Some(owner) = &filter.owner {
            query = query.bind(owner);
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(since) = filter.since {
            query = query.bind(since);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(ExportRow::into_job).collect()
    }

    async fn list_active_for_owner(&self, owner: &str) -> Result<Vec<ExportJob>, StoreError> {
        let rows = sqlx::query_as::<_, ExportRow>(
            "SELECT * FROM exports WHERE owner = ? AND status IN ('pending', 'processing') ORDER BY created_at",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ExportRow::into_job).collect()
    }

    async fn list_orphaned(&self) -> Result<Vec<ExportJob>, StoreError> {
        let rows = sqlx::query_as::<_, ExportRow>("SELECT * FROM exports WHERE status = 'processing'")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ExportRow::into_job).collect()
    }
}

impl SqliteJobStore {
    async fn ensure_transition_applied(
        &self,
        job_id: &str,
        rows_affected: u64,
        expected: &'static str,
    ) -> Result<(), StoreError> {
        if rows_affected == 1 {
            return Ok(());
        }
        let current = self.fetch_one(job_id).await?;
        Err(StoreError::PreconditionFailed {
            job_id: job_id.to_string(),
            expected,
            found: current.status.as_str().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AspectRatio, CropKeyframe, ExportParams, FramingParams, Rect};

    fn sample_params() -> ExportParams {
        ExportParams::Framing(FramingParams {
            source_ref: "blob://src".into(),
            crop_keyframes: vec![CropKeyframe {
                source_time: 0.0,
                rect: Rect { x: 0.0, y: 0.0, width: 10.0, height: 10.0 },
            }],
            segments: vec![],
            target_aspect_ratio: AspectRatio { width: 9, height: 16 },
            target_frame_rate: 30.0,
            audio_include: false,
        })
    }

    fn sample_job(id: &str) -> ExportJob {
        ExportJob::new(id.to_string(), "alice".into(), "proj-1".into(), sample_params())
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = SqliteJobStore::in_memory().await;
        let job = sample_job("job-1");
        store.create(&job).await.unwrap();
        let fetched = store.get("job-1").await.unwrap();
        assert_eq!(fetched.id, "job-1");
        assert_eq!(fetched.status, JobStatus::Pending);
        assert_eq!(fetched.params, job.params);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_id() {
        let store = SqliteJobStore::in_memory().await;
        let job = sample_job("dup");
        store.create(&job).await.unwrap();
        let err = store.create(&job).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn claim_next_is_fifo_and_exclusive() {
        let store = SqliteJobStore::in_memory().await;
        for i in 0..3 {
            let mut job = sample_job(&format!("job-{i}"));
            job.created_at = job.created_at + chrono::Duration::seconds(i);
            store.create(&job).await.unwrap();
        }

        let first = store
            .claim_next("worker-a", &[JobKind::Framing])
            .await
            .unwrap()
            .expect("a job should be claimed");
        assert_eq!(first.id, "job-0");
        assert_eq!(first.status, JobStatus::Processing);

        let second = store
            .claim_next("worker-b", &[JobKind::Framing])
            .await
            .unwrap()
            .expect("a second job should be claimed");
        assert_eq!(second.id, "job-1");
        assert_ne!(second.id, first.id);
    }

    #[tokio::test]
    async fn mark_complete_requires_processing() {
        let store = SqliteJobStore::in_memory().await;
        let job = sample_job("job-x");
        store.create(&job).await.unwrap();
        let err = store.mark_complete("job-x", "blob://out", "out.mp4").await.unwrap_err();
        assert!(matches!(err, StoreError::PreconditionFailed { .. }));
    }

    #[tokio::test]
    async fn cancel_pending_job_is_immediate_and_idempotent() {
        let store = SqliteJobStore::in_memory().await;
        let job = sample_job("job-c");
        store.create(&job).await.unwrap();
        let cancelled = store.request_cancel("job-c").await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        // Second call is a no-op, not an error.
        let again = store.request_cancel("job-c").await.unwrap();
        assert_eq!(again.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_processing_job_sets_flag_without_transitioning() {
        let store = SqliteJobStore::in_memory().await;
        let job = sample_job("job-p");
        store.create(&job).await.unwrap();
        store.claim_next("worker-a", &[JobKind::Framing]).await.unwrap();
        let snapshot = store.request_cancel("job-p").await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Processing);
        assert!(store.is_cancel_requested("job-p").await.unwrap());
    }

    #[tokio::test]
    async fn list_orphaned_finds_processing_jobs() {
        let store = SqliteJobStore::in_memory().await;
        let job = sample_job("job-o");
        store.create(&job).await.unwrap();
        store.claim_next("worker-a", &[JobKind::Framing]).await.unwrap();
        let orphans = store.list_orphaned().await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].id, "job-o");
    }
}
