// src/models/whatsapp.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "outbound_message_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundMessageStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl OutboundMessageStatus {
    pub const ALL: [OutboundMessageStatus; 5] = [
        OutboundMessageStatus::Pending,
        OutboundMessageStatus::Sent,
        OutboundMessageStatus::Delivered,
        OutboundMessageStatus::Read,
        OutboundMessageStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutboundMessageStatus::Pending => "PENDING",
            OutboundMessageStatus::Sent => "SENT",
            OutboundMessageStatus::Delivered => "DELIVERED",
            OutboundMessageStatus::Read => "READ",
            OutboundMessageStatus::Failed => "FAILED",
        }
    }

    // FAILED fica fora da escada
    fn rank(&self) -> Option<u8> {
        match self {
            OutboundMessageStatus::Pending => Some(0),
            OutboundMessageStatus::Sent => Some(1),
            OutboundMessageStatus::Delivered => Some(2),
            OutboundMessageStatus::Read => Some(3),
            OutboundMessageStatus::Failed => None,
        }
    }

    /// O status só avança (PENDING < SENT < DELIVERED < READ). FAILED só entra
    /// antes da entrega e é terminal. Webhooks da Meta chegam fora de ordem.
    pub fn can_advance_to(&self, next: OutboundMessageStatus) -> bool {
        match (self.rank(), next.rank()) {
            (None, _) => false,
            (Some(current), None) => current < 2,
            (Some(current), Some(target)) => target > current,
        }
    }

    /// Status a partir dos quais `next` ainda pode ser aplicado.
    pub fn advancing_to(next: OutboundMessageStatus) -> Vec<OutboundMessageStatus> {
        Self::ALL.into_iter().filter(|s| s.can_advance_to(next)).collect()
    }
}

// Log de cada tentativa de envio ao gateway
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub id: Uuid,
    pub notification_id: Option<Uuid>,
    #[schema(example = "249912345678")]
    pub phone_number: String,
    // Nome do template ou "text" para mensagem livre
    #[schema(example = "task_due_reminder")]
    pub template_name: String,
    pub status: OutboundMessageStatus,
    pub external_message_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    // Detalhe do erro quando FAILED
    #[schema(value_type = Object)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOutboundMessage {
    pub notification_id: Option<Uuid>,
    pub phone_number: String,
    pub template_name: String,
    pub status: OutboundMessageStatus,
    pub external_message_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub metadata: Value,
}

/// Retorno de status vindo do webhook (DELIVERED / READ / FAILED).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStatusUpdate {
    pub external_message_id: String,
    pub status: OutboundMessageStatus,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::OutboundMessageStatus::*;

    #[test]
    fn status_only_moves_forward() {
        assert!(Sent.can_advance_to(Delivered));
        assert!(Delivered.can_advance_to(Read));
        assert!(Sent.can_advance_to(Read));
        assert!(!Read.can_advance_to(Delivered));
        assert!(!Delivered.can_advance_to(Delivered));
    }

    #[test]
    fn failure_only_lands_before_delivery() {
        assert!(Pending.can_advance_to(Failed));
        assert!(Sent.can_advance_to(Failed));
        assert!(!Delivered.can_advance_to(Failed));
        assert!(!Read.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Delivered));
        assert_eq!(OutboundMessageStatus::advancing_to(Read), vec![Pending, Sent, Delivered]);
        assert_eq!(OutboundMessageStatus::advancing_to(Failed), vec![Pending, Sent]);
    }
}
