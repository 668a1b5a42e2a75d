// src/db/task_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::tasks::{Task, TaskReminderCandidate},
};

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Tarefas abertas (PENDING / IN_PROGRESS) com prazo em [from, to] e pelo
    /// menos um responsável.
    async fn find_open_tasks_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TaskReminderCandidate>, AppError>;

    /// Tarefas abertas com prazo já vencido (< now) e pelo menos um responsável.
    async fn find_open_tasks_overdue(&self, now: DateTime<Utc>) -> Result<Vec<TaskReminderCandidate>, AppError>;
}

#[derive(FromRow)]
struct TaskWithAssignees {
    #[sqlx(flatten)]
    task: Task,
    assignee_ids: Vec<Uuid>,
}

impl TaskWithAssignees {
    fn into_candidate(self) -> Option<TaskReminderCandidate> {
        let due_date = self.task.due_date?;
        Some(TaskReminderCandidate { task: self.task, due_date, assignee_ids: self.assignee_ids })
    }
}

#[derive(Clone)]
pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_candidates(
        &self,
        from: Option<DateTime<Utc>>,
        to: DateTime<Utc>,
        inclusive_end: bool,
    ) -> Result<Vec<TaskReminderCandidate>, AppError> {
        // O JOIN com task_assignees já descarta tarefas sem responsável
        let rows = sqlx::query_as::<_, TaskWithAssignees>(
            r#"
            SELECT
                t.id, t.title, t.status, t.due_date, t.project_id, t.shipment_id, t.created_at,
                ARRAY_AGG(ta.user_id) AS assignee_ids
            FROM tasks t
            JOIN task_assignees ta ON ta.task_id = t.id
            WHERE t.status IN ('PENDING', 'IN_PROGRESS')
              AND t.due_date IS NOT NULL
              AND ($1::timestamptz IS NULL OR t.due_date >= $1)
              AND (CASE WHEN $3 THEN t.due_date <= $2 ELSE t.due_date < $2 END)
            GROUP BY t.id
            ORDER BY t.due_date ASC
            "#,
        )
            .bind(from)
            .bind(to)
            .bind(inclusive_end)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().filter_map(TaskWithAssignees::into_candidate).collect())
    }
}

#[async_trait]
impl TaskStore for TaskRepository {
    async fn find_open_tasks_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TaskReminderCandidate>, AppError> {
        self.fetch_candidates(Some(from), to, true).await
    }

    async fn find_open_tasks_overdue(&self, now: DateTime<Utc>) -> Result<Vec<TaskReminderCandidate>, AppError> {
        self.fetch_candidates(None, now, false).await
    }
}
