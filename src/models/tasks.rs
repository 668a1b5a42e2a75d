// src/models/tasks.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "task_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    // Mesmo filtro de tarefa aberta do SQL; usado pelo store em memória
    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    #[schema(example = "Enviar BL original ao despachante")]
    pub title: String,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub project_id: Option<Uuid>,
    pub shipment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Tarefa candidata a lembrete + todos os responsáveis (task_assignees).
#[derive(Debug, Clone)]
pub struct TaskReminderCandidate {
    pub task: Task,
    pub due_date: DateTime<Utc>,
    pub assignee_ids: Vec<Uuid>,
}
