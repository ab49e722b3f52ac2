use crate::app_state::models::AppState;
use crate::services::scheduler::{JobType, SchedulerState};
use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct JobStatus {
    pub job_type: JobType,
    pub running: bool,
}

#[derive(Debug, Serialize)]
pub struct JobsOverview {
    pub scheduler_running: bool,
    pub jobs: Vec<JobStatus>,
}

pub async fn list_jobs(Extension(app_state): Extension<Arc<AppState>>) -> Json<JobsOverview> {
    let scheduler = &app_state.scheduler;
    Json(JobsOverview {
        scheduler_running: scheduler.state() == SchedulerState::Running,
        jobs: JobType::ALL
            .into_iter()
            .map(|job_type| JobStatus {
                job_type,
                running: scheduler.runner().is_running(job_type),
            })
            .collect(),
    })
}

/// 202 - запуск принят, 409 - задача уже выполняется, 404 - неизвестный тип
pub async fn trigger_job(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(job_type): Path<String>,
) -> (StatusCode, Json<Value>) {
    let job = match job_type.parse::<JobType>() {
        Ok(job) => job,
        Err(e) => return (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))),
    };

    // Слот занят до ответа: 202 - прогон начат
    if !app_state.scheduler.trigger(job) {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "job_type": job, "status": "already_running" })),
        );
    }

    info!("Manual trigger of {}", job);
    (
        StatusCode::ACCEPTED,
        Json(json!({ "job_type": job, "status": "accepted" })),
    )
}
