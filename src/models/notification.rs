// src/models/notification.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::tracking::StageType;

// --- Enums (Mapeando o Postgres) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "notification_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    TaskDueSoon,
    TaskOverdue,
    StageAttentionNeeded,
    PaymentOverdue,
    ShipmentMilestone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "notification_channel", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationChannel {
    InApp,
    Whatsapp,
    Email,
    Sms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "notification_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

// --- Registro persistido ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    // Canal "principal": o primeiro da lista pedida
    pub channel: NotificationChannel,
    pub status: NotificationStatus,

    // Vínculos
    pub user_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub shipment_id: Option<Uuid>,
    pub invoice_id: Option<Uuid>,
    pub project_id: Option<Uuid>,

    // Mapa aberto no banco; a forma tipada é NotificationMetadata
    #[schema(value_type = Object)]
    pub metadata: Value,

    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationTargets {
    pub user_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub shipment_id: Option<Uuid>,
    pub invoice_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
}

/// Linha a inserir (status sempre começa PENDING).
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub channel: NotificationChannel,
    pub targets: NotificationTargets,
    pub metadata: Value,
}

// =============================================================================
//  METADATA TIPADO (uma variante por tipo de notificação)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDueSoonMetadata {
    pub task_title: String,
    pub due_date: DateTime<Utc>,
    pub hours_until_due: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOverdueMetadata {
    pub task_title: String,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageAttentionMetadata {
    // Chave extra da deduplicação (metadata->>'stageType')
    pub stage_type: StageType,
    pub stage_name: String,
    pub shipment_reference: String,
    pub started_at: DateTime<Utc>,
    pub hours_in_progress: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOverdueMetadata {
    pub invoice_number: String,
    pub total_amount: Decimal,
    pub currency: String,
    pub due_date: NaiveDate,
    pub days_overdue: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentMilestoneMetadata {
    pub stage_type: StageType,
    pub stage_name: String,
    pub shipment_reference: String,
    pub progress_percentage: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationMetadata {
    TaskDueSoon(TaskDueSoonMetadata),
    TaskOverdue(TaskOverdueMetadata),
    StageAttentionNeeded(StageAttentionMetadata),
    PaymentOverdue(PaymentOverdueMetadata),
    ShipmentMilestone(ShipmentMilestoneMetadata),
}

impl NotificationMetadata {
    pub fn notification_type(&self) -> NotificationType {
        match self {
            NotificationMetadata::TaskDueSoon(_) => NotificationType::TaskDueSoon,
            NotificationMetadata::TaskOverdue(_) => NotificationType::TaskOverdue,
            NotificationMetadata::StageAttentionNeeded(_) => NotificationType::StageAttentionNeeded,
            NotificationMetadata::PaymentOverdue(_) => NotificationType::PaymentOverdue,
            NotificationMetadata::ShipmentMilestone(_) => NotificationType::ShipmentMilestone,
        }
    }

    pub fn stage_type(&self) -> Option<StageType> {
        match self {
            NotificationMetadata::StageAttentionNeeded(m) => Some(m.stage_type),
            NotificationMetadata::ShipmentMilestone(m) => Some(m.stage_type),
            _ => None,
        }
    }

    /// Forma aberta gravada na coluna JSONB. O tipo já vai na coluna
    /// `notification_type`, então o objeto não carrega tag.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            NotificationMetadata::TaskDueSoon(m) => serde_json::to_value(m),
            NotificationMetadata::TaskOverdue(m) => serde_json::to_value(m),
            NotificationMetadata::StageAttentionNeeded(m) => serde_json::to_value(m),
            NotificationMetadata::PaymentOverdue(m) => serde_json::to_value(m),
            NotificationMetadata::ShipmentMilestone(m) => serde_json::to_value(m),
        }
    }

    #[cfg(test)]
    pub fn from_stored(kind: NotificationType, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            NotificationType::TaskDueSoon => NotificationMetadata::TaskDueSoon(serde_json::from_value(value)?),
            NotificationType::TaskOverdue => NotificationMetadata::TaskOverdue(serde_json::from_value(value)?),
            NotificationType::StageAttentionNeeded => {
                NotificationMetadata::StageAttentionNeeded(serde_json::from_value(value)?)
            }
            NotificationType::PaymentOverdue => NotificationMetadata::PaymentOverdue(serde_json::from_value(value)?),
            NotificationType::ShipmentMilestone => {
                NotificationMetadata::ShipmentMilestone(serde_json::from_value(value)?)
            }
        })
    }
}

// =============================================================================
//  PEDIDO DE NOTIFICAÇÃO & RESULTADO
// =============================================================================

#[derive(Debug, Clone, Validate)]
pub struct NotificationRequest {
    #[validate(length(min = 1, message = "required"))]
    pub title: String,
    #[validate(length(min = 1, message = "required"))]
    pub message: String,
    #[validate(length(min = 1, message = "at least one channel"))]
    pub channels: Vec<NotificationChannel>,
    pub targets: NotificationTargets,
    pub metadata: NotificationMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelDeliveryStatus {
    Sent,
    Failed,
    // Aceito mas ainda sem envio real (EMAIL/SMS)
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChannelOutcome {
    pub channel: NotificationChannel,
    pub status: ChannelDeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChannelOutcome {
    pub fn sent(channel: NotificationChannel) -> Self {
        Self { channel, status: ChannelDeliveryStatus::Sent, error: None }
    }

    pub fn pending(channel: NotificationChannel) -> Self {
        Self { channel, status: ChannelDeliveryStatus::Pending, error: None }
    }

    pub fn failed(channel: NotificationChannel, error: impl Into<String>) -> Self {
        Self { channel, status: ChannelDeliveryStatus::Failed, error: Some(error.into()) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub id: Uuid,
    pub status: NotificationStatus,
    pub channels: Vec<ChannelOutcome>,
}

// =============================================================================
//  CHAVE DE DEDUPLICAÇÃO
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    User(Uuid),
    Client(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    Task(Uuid),
    Invoice(Uuid),
    Shipment(Uuid),
}

/// (destinatário, assunto, tipo[, etapa]) dentro da janela.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupKey {
    pub notification_type: NotificationType,
    pub recipient: Recipient,
    pub subject: Subject,
    pub stage_type: Option<StageType>,
}
