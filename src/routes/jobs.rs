use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

use crate::{
    error::AppError,
    routes::finance::{run, FinanceAction},
    schemas::JobInput,
    state::AppState,
    tenancy::parse_id,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/businesses/{business_id}/jobs", post(enqueue_job))
        .route("/businesses/{business_id}/jobs/{job_id}", get(get_job))
}

async fn enqueue_job(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
    body: Option<Json<Value>>,
) -> Response {
    let action = match body {
        Some(Json(value)) => FinanceAction::parse("enqueue_job", value),
        None => Err(AppError::BadRequest(
            "Request body must name a job.".to_string(),
        )),
    };
    run(&state, "enqueue_job", &business_id, action).await
}

async fn get_job(
    State(state): State<AppState>,
    Path((business_id, job_id)): Path<(String, String)>,
) -> Response {
    let action =
        parse_id(&job_id, "job_id").map(|job_id| FinanceAction::GetJob(JobInput { job_id }));
    run(&state, "get_job", &business_id, action).await
}
