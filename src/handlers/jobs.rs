// src/handlers/jobs.rs

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;

use crate::{config::AppState, models::reminders::ReminderRunSummary};

// POST /api/cron/reminders
#[utoipa::path(
    post,
    path = "/api/cron/reminders",
    tag = "Jobs",
    responses(
        (status = 200, description = "Resumo das quatro varreduras", body = ReminderRunSummary),
        (status = 401, description = "CRON_SECRET ausente ou inválido")
    ),
    security(
        ("cron_secret" = [])
    )
)]
pub async fn run_reminders(State(app_state): State<AppState>) -> impl IntoResponse {
    let summary = app_state.reminder_service.run_all_reminder_jobs(Utc::now()).await;
    (StatusCode::OK, Json(summary))
}
