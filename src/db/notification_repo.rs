// src/db/notification_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::notification::{DedupKey, NewNotification, Notification, NotificationStatus, Recipient, Subject},
};

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, notification: NewNotification) -> Result<Notification, AppError>;

    async fn update_status(
        &self,
        notification_id: Uuid,
        status: NotificationStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError>;

    /// Já existe notificação com a mesma chave criada desde `since`?
    /// Leitura simples, sem lock: duas varreduras simultâneas podem passar juntas.
    async fn exists_recent(&self, key: &DedupKey, since: DateTime<Utc>) -> Result<bool, AppError>;
}

#[derive(Clone)]
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for NotificationRepository {
    async fn create(&self, notification: NewNotification) -> Result<Notification, AppError> {
        let t = notification.targets;
        let created = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (
                notification_type, title, message, channel, status,
                user_id, client_id, task_id, shipment_id, invoice_id, project_id,
                metadata
            )
            VALUES ($1, $2, $3, $4, 'PENDING', $5, $6, $7, $8, $9, $10, $11)
            RETURNING
                id, notification_type, title, message, channel, status,
                user_id, client_id, task_id, shipment_id, invoice_id, project_id,
                metadata, sent_at, created_at
            "#,
        )
            .bind(notification.notification_type)
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(notification.channel)
            .bind(t.user_id)
            .bind(t.client_id)
            .bind(t.task_id)
            .bind(t.shipment_id)
            .bind(t.invoice_id)
            .bind(t.project_id)
            .bind(&notification.metadata)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::from_db(e, "notificação já registrada"))?;

        Ok(created)
    }

    async fn update_status(
        &self,
        notification_id: Uuid,
        status: NotificationStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE notifications SET status = $2, sent_at = $3 WHERE id = $1")
            .bind(notification_id)
            .bind(status)
            .bind(sent_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn exists_recent(&self, key: &DedupKey, since: DateTime<Utc>) -> Result<bool, AppError> {
        let (user_id, client_id) = match key.recipient {
            Recipient::User(id) => (Some(id), None),
            Recipient::Client(id) => (None, Some(id)),
        };
        let (task_id, invoice_id, shipment_id) = match key.subject {
            Subject::Task(id) => (Some(id), None, None),
            Subject::Invoice(id) => (None, Some(id), None),
            Subject::Shipment(id) => (None, None, Some(id)),
        };

        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM notifications
                WHERE notification_type = $1
                  AND ($2::uuid IS NULL OR user_id = $2)
                  AND ($3::uuid IS NULL OR client_id = $3)
                  AND ($4::uuid IS NULL OR task_id = $4)
                  AND ($5::uuid IS NULL OR invoice_id = $5)
                  AND ($6::uuid IS NULL OR shipment_id = $6)
                  AND ($7::text IS NULL OR metadata->>'stageType' = $7)
                  AND created_at >= $8
            )
            "#,
        )
            .bind(key.notification_type)
            .bind(user_id)
            .bind(client_id)
            .bind(task_id)
            .bind(invoice_id)
            .bind(shipment_id)
            .bind(key.stage_type.map(|t| t.as_str()))
            .bind(since)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }
}
