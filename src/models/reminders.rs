// src/models/reminders.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::notification::{ChannelOutcome, DispatchResult, NotificationStatus};

/// Resultado de um par (candidato, destinatário) numa varredura.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReminderOutcome {
    // Tarefa, etapa ou fatura
    pub subject_id: Uuid,
    pub recipient_id: Option<Uuid>,
    pub notification_sent: bool,
    // Já notificado dentro da janela de dedup
    pub skipped: bool,
    pub notification_id: Option<Uuid>,
    pub notification_status: Option<NotificationStatus>,
    // Detalhe por canal, só para diagnóstico
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<ChannelOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReminderOutcome {
    pub fn dispatched(subject_id: Uuid, recipient_id: Option<Uuid>, result: DispatchResult) -> Self {
        Self {
            subject_id,
            recipient_id,
            notification_sent: result.status == NotificationStatus::Sent,
            skipped: false,
            notification_id: Some(result.id),
            notification_status: Some(result.status),
            channels: result.channels,
            error: None,
        }
    }

    pub fn skipped(subject_id: Uuid, recipient_id: Option<Uuid>) -> Self {
        Self {
            subject_id,
            recipient_id,
            notification_sent: false,
            skipped: true,
            notification_id: None,
            notification_status: None,
            channels: Vec::new(),
            error: None,
        }
    }

    pub fn failed(subject_id: Uuid, recipient_id: Option<Uuid>, error: impl Into<String>) -> Self {
        Self {
            subject_id,
            recipient_id,
            notification_sent: false,
            skipped: false,
            notification_id: None,
            notification_status: None,
            channels: Vec::new(),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub processed: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
    pub results: Vec<ReminderOutcome>,
    // Falha na consulta inicial: nada foi processado
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobReport {
    pub fn from_outcomes(results: Vec<ReminderOutcome>) -> Self {
        let sent = results.iter().filter(|r| r.notification_sent).count();
        let skipped = results.iter().filter(|r| r.skipped).count();
        let failed = results.iter().filter(|r| r.error.is_some()).count();
        Self { processed: results.len(), sent, skipped, failed, results, error: None }
    }

    pub fn from_error(error: impl Into<String>) -> Self {
        Self { error: Some(error.into()), ..Default::default() }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRunSummary {
    pub due_soon_reminders: JobReport,
    pub overdue_alerts: JobReport,
    pub stage_alerts: JobReport,
    pub payment_reminders: JobReport,
    pub timestamp: DateTime<Utc>,
}
