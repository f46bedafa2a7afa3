use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::domain::{ExportJob, JobFilter, JobStatus, ProgressEvent};
use crate::error::ApiError;

use super::dto::{parse_export_params, JobSnapshot, ListQuery, SubmitRequest, SubmitResponse};
use super::state::AppState;
use super::ws::ws_handler;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/exports", post(submit))
        .route("/exports/active", get(list_active))
        .route("/exports/:job_id", get(get_job))
        .route("/exports/:job_id", delete(cancel))
        .route("/exports/:job_id/download", get(download))
        .route("/projects/:project_ref/exports", get(list_for_project))
        .route("/ws/exports/:job_id", get(ws_handler))
        .with_state(state)
}

const OWNER_HEADER: &str = "x-owner-id";

fn owner_from_headers(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Validation {
            field: OWNER_HEADER.to_string(),
            reason: "missing caller identity header".to_string(),
        })
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list(&JobFilter::default()).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::error!(error = %e, "readyz check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = owner_from_headers(&headers)?;
    let params = parse_export_params(&body.kind, body.params)?;
    params.validate()?;

    state
        .admission
        .check(&owner, &params)
        .await
        .map_err(ApiError::AdmissionDenied)?;

    let job = ExportJob::new(Uuid::new_v4().to_string(), owner, body.project_ref, params);
    state.store.create(&job).await?;
    tracing::info!(job_id = %job.id, kind = job.kind.as_str(), "job submitted");

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse { job_id: job.id, status: "pending", created_at: job.created_at }),
    ))
}

async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobSnapshot>, ApiError> {
    let job = state.store.get(&job_id).await?;
    Ok(Json(JobSnapshot::from(&job)))
}

async fn list_for_project(
    State(state): State<AppState>,
    Path(project_ref): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<JobSnapshot>>, ApiError> {
    let status = parse_status_filter(query.status)?;
    let filter = JobFilter { project_ref: Some(project_ref), status, since: query.since, owner: None };
    let jobs = state.store.list(&filter).await?;
    Ok(Json(jobs.iter().map(JobSnapshot::from).collect()))
}

async fn list_active(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<JobSnapshot>>, ApiError> {
    let owner = owner_from_headers(&headers)?;
    let jobs = state.store.list_active_for_owner(&owner).await?;
    Ok(Json(jobs.iter().map(JobSnapshot::from).collect()))
}

async fn cancel(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobSnapshot>, ApiError> {
    let job = state.store.request_cancel(&job_id).await?;
    if job.status == JobStatus::Cancelled {
        // Only a pending-job cancel transitions synchronously here; a
        // processing job's cancellation is observed and published by the
        // scheduler once the driver unwinds.
        state.hub.publish(&job_id, ProgressEvent::cancelled(job_id.clone(), 0));
    }
    Ok(Json(JobSnapshot::from(&job)))
}

async fn download(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let job = state.store.get(&job_id).await?;
    if job.status != JobStatus::Complete {
        return Err(ApiError::NotComplete);
    }
    let output_ref = job.output_ref.clone().unwrap_or_default();

    if let Some(url) = state.blob_store.presigned_url(&output_ref).await? {
        return Ok(Redirect::temporary(&url).into_response());
    }

    let bytes = state.blob_store.get(&output_ref).await?;
    let filename = job.output_filename.clone().unwrap_or_else(|| "export.bin".to_string());
    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
    ];
    Ok((headers, bytes).into_response())
}

fn parse_status_filter(raw: Option<String>) -> Result<Option<JobStatus>, ApiError> {
    match raw {
        None => Ok(None),
        Some(s) => JobStatus::from_str(&s)
            .ok_or_else(|| ApiError::Validation {
                field: "status".to_string(),
                reason: format!("unknown status {s}"),
            })
            .map(Some),
    }
}
