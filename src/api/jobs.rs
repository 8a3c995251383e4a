//! Job application endpoints. Every route requires a bearer access token.
//!
//! - GET `/jobs` - List the caller's jobs
//! - POST `/jobs` - Create a job
//! - PUT `/jobs` - Replace a job (body carries `id`)
//! - DELETE `/jobs` - Delete a job (body `{id}`)

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;

use super::error::{ApiError, ResultExt};
use crate::auth::{Auth, require_auth};
use crate::db::{Database, Job, JobFields};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;

#[derive(Clone)]
pub struct JobsState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
}

impl_has_auth_backend!(JobsState);

pub fn router(state: JobsState) -> Router {
    Router::new()
        .route(
            "/jobs",
            get(list_jobs)
                .post(create_job)
                .put(update_job)
                .delete(delete_job),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth::<JobsState>,
        ))
        .with_state(state)
}

#[derive(Deserialize)]
struct UpdateJobRequest {
    id: Option<i64>,
    #[serde(flatten)]
    fields: JobFields,
}

#[derive(Deserialize)]
struct DeleteJobRequest {
    id: Option<i64>,
}

fn validate(fields: &JobFields) -> Result<(), ApiError> {
    if fields.company.trim().is_empty() {
        return Err(ApiError::missing_field("Company is required."));
    }
    Ok(())
}

async fn list_jobs(
    State(state): State<JobsState>,
    Auth(auth): Auth,
) -> Result<Json<Vec<Job>>, ApiError> {
    let jobs = state
        .db
        .jobs()
        .list_by_user(auth.user_id())
        .await
        .db_err("Failed to list jobs")?;
    Ok(Json(jobs))
}

async fn create_job(
    State(state): State<JobsState>,
    Auth(auth): Auth,
    fields: Result<Json<JobFields>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(fields) = fields?;
    validate(&fields)?;

    let job = state
        .db
        .jobs()
        .create(auth.user_id(), &fields)
        .await
        .db_err("Failed to create job")?;

    Ok((StatusCode::CREATED, Json(job)))
}

async fn update_job(
    State(state): State<JobsState>,
    Auth(auth): Auth,
    payload: Result<Json<UpdateJobRequest>, JsonRejection>,
) -> Result<Json<Job>, ApiError> {
    let Json(payload) = payload?;
    let id = payload
        .id
        .ok_or_else(|| ApiError::missing_field("Job id is required."))?;
    validate(&payload.fields)?;

    let updated = state
        .db
        .jobs()
        .update(auth.user_id(), id, &payload.fields)
        .await
        .db_err("Failed to update job")?;
    if !updated {
        return Err(ApiError::not_found("Job not found"));
    }

    state
        .db
        .jobs()
        .get(auth.user_id(), id)
        .await
        .db_err("Failed to get job")?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Job not found"))
}

async fn delete_job(
    State(state): State<JobsState>,
    Auth(auth): Auth,
    payload: Result<Json<DeleteJobRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(payload) = payload?;
    let id = payload
        .id
        .ok_or_else(|| ApiError::missing_field("Job id is required."))?;

    let deleted = state
        .db
        .jobs()
        .delete(auth.user_id(), id)
        .await
        .db_err("Failed to delete job")?;
    if !deleted {
        return Err(ApiError::not_found("Job not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}
