// src/db/whatsapp_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{
    common::error::AppError,
    models::whatsapp::{DeliveryStatusUpdate, NewOutboundMessage, OutboundMessage, OutboundMessageStatus},
};

#[async_trait]
pub trait OutboundMessageStore: Send + Sync {
    async fn record(&self, message: NewOutboundMessage) -> Result<OutboundMessage, AppError>;

    /// Aplica o status a todas as linhas com o mesmo id externo, desde que
    /// avance o ciclo de entrega. Retorna quantas linhas mudaram.
    async fn apply_delivery_status(&self, update: &DeliveryStatusUpdate) -> Result<u64, AppError>;
}

#[derive(Clone)]
pub struct WhatsAppRepository {
    pool: PgPool,
}

impl WhatsAppRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboundMessageStore for WhatsAppRepository {
    async fn record(&self, message: NewOutboundMessage) -> Result<OutboundMessage, AppError> {
        let row = sqlx::query_as::<_, OutboundMessage>(
            r#"
            INSERT INTO whatsapp_messages (
                notification_id, phone_number, template_name, status,
                external_message_id, sent_at, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING
                id, notification_id, phone_number, template_name, status,
                external_message_id, sent_at, delivered_at, read_at, metadata, created_at
            "#,
        )
            .bind(message.notification_id)
            .bind(&message.phone_number)
            .bind(&message.template_name)
            .bind(message.status)
            .bind(&message.external_message_id)
            .bind(message.sent_at)
            .bind(&message.metadata)
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    async fn apply_delivery_status(&self, update: &DeliveryStatusUpdate) -> Result<u64, AppError> {
        // READ implica entregue: preenche delivered_at se ainda estiver vazio
        let (delivered_at, read_at) = match update.status {
            OutboundMessageStatus::Delivered => (Some(update.timestamp), None),
            OutboundMessageStatus::Read => (Some(update.timestamp), Some(update.timestamp)),
            _ => (None, None),
        };

        // Fora de ordem (ex.: DELIVERED depois de READ) não retrocede a linha
        let advancing_from: Vec<String> = OutboundMessageStatus::advancing_to(update.status)
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let result = sqlx::query(
            r#"
            UPDATE whatsapp_messages
            SET status = $2,
                delivered_at = COALESCE(delivered_at, $3),
                read_at = COALESCE($4, read_at),
                metadata = CASE
                    WHEN $5::text IS NULL THEN metadata
                    ELSE metadata || jsonb_build_object('error', $5::text)
                END
            WHERE external_message_id = $1
              AND status::text = ANY($6)
            "#,
        )
            .bind(&update.external_message_id)
            .bind(update.status)
            .bind(delivered_at)
            .bind(read_at)
            .bind(&update.error)
            .bind(&advancing_from)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
