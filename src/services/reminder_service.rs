// src/services/reminder_service.rs
//
// Varreduras sob demanda: consulta candidatos → para cada (candidato,
// destinatário) → dedup → despacho → resultado. Quem agenda é o cron externo.

use std::{env, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use futures::{stream, StreamExt};
use uuid::Uuid;

use crate::{
    common::{error::AppError, format::format_amount},
    db::{InvoiceStore, TaskStore, TrackingStore},
    models::{
        notification::{
            DedupKey, NotificationChannel, NotificationMetadata, NotificationRequest, NotificationTargets,
            PaymentOverdueMetadata, Recipient, StageAttentionMetadata, Subject,
            TaskDueSoonMetadata, TaskOverdueMetadata,
        },
        reminders::{JobReport, ReminderOutcome, ReminderRunSummary},
    },
    services::{notification_service::NotificationService, stage_registry},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderConfig {
    pub due_soon_hours: i64,
    pub stalled_stage_hours: i64,
    pub dedup_window_hours: i64,
    // Envios simultâneos por varredura
    pub concurrency: usize,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self { due_soon_hours: 24, stalled_stage_hours: 48, dedup_window_hours: 24, concurrency: 5 }
    }
}

fn env_number<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} inválido ({}): {}", key, raw, e)),
        _ => Ok(default),
    }
}

impl ReminderConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let d = Self::default();
        let config = Self {
            due_soon_hours: env_number("REMINDER_DUE_SOON_HOURS", d.due_soon_hours)?,
            stalled_stage_hours: env_number("REMINDER_STALLED_STAGE_HOURS", d.stalled_stage_hours)?,
            dedup_window_hours: env_number("REMINDER_DEDUP_WINDOW_HOURS", d.dedup_window_hours)?,
            concurrency: env_number("REMINDER_CONCURRENCY", d.concurrency)?,
        };
        if config.concurrency == 0 {
            anyhow::bail!("REMINDER_CONCURRENCY deve ser maior que zero");
        }
        Ok(config)
    }
}

/// Um par (candidato, destinatário) pronto para dedup + despacho.
struct PendingReminder {
    subject_id: Uuid,
    recipient_id: Option<Uuid>,
    key: DedupKey,
    request: NotificationRequest,
}

impl PendingReminder {
    // Tipo e etapa da chave saem dos próprios metadados
    fn new(subject_id: Uuid, recipient: Recipient, subject: Subject, request: NotificationRequest) -> Self {
        let recipient_id = match recipient {
            Recipient::User(id) | Recipient::Client(id) => id,
        };
        let key = DedupKey {
            notification_type: request.metadata.notification_type(),
            recipient,
            subject,
            stage_type: request.metadata.stage_type(),
        };
        Self { subject_id, recipient_id: Some(recipient_id), key, request }
    }
}

#[derive(Clone)]
pub struct ReminderService {
    tasks: Arc<dyn TaskStore>,
    tracking: Arc<dyn TrackingStore>,
    invoices: Arc<dyn InvoiceStore>,
    notifications: NotificationService,
    config: ReminderConfig,
}

impl ReminderService {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        tracking: Arc<dyn TrackingStore>,
        invoices: Arc<dyn InvoiceStore>,
        notifications: NotificationService,
        config: ReminderConfig,
    ) -> Self {
        Self { tasks, tracking, invoices, notifications, config }
    }

    // =========================================================================
    //  1. TAREFAS QUE VENCEM EM BREVE
    // =========================================================================

    pub async fn send_due_soon_reminders(&self, now: DateTime<Utc>) -> Result<JobReport, AppError> {
        let horizon = now + Duration::hours(self.config.due_soon_hours);
        let candidates = self.tasks.find_open_tasks_due_between(now, horizon).await?;

        let pending = candidates.iter().flat_map(|c| {
            let hours_until_due = ((c.due_date - now).num_seconds() as f64 / 3600.0).round() as i64;
            c.assignee_ids.iter().map(move |&user_id| {
                PendingReminder::new(c.task.id, Recipient::User(user_id), Subject::Task(c.task.id), NotificationRequest {
                    title: "Task due soon".to_string(),
                    message: format!("Task \"{}\" is due in {} hours.", c.task.title, hours_until_due),
                    channels: vec![NotificationChannel::InApp, NotificationChannel::Whatsapp],
                    targets: NotificationTargets {
                        user_id: Some(user_id),
                        task_id: Some(c.task.id),
                        project_id: c.task.project_id,
                        shipment_id: c.task.shipment_id,
                        ..Default::default()
                    },
                    metadata: NotificationMetadata::TaskDueSoon(TaskDueSoonMetadata {
                        task_title: c.task.title.clone(),
                        due_date: c.due_date,
                        hours_until_due,
                    }),
                })
            })
        });
        let pending: Vec<PendingReminder> = pending.collect();

        let report = self.run_pairs(pending, now).await;
        tracing::info!(processed = report.processed, sent = report.sent, skipped = report.skipped, "⏰ Lembretes de vencimento");
        Ok(report)
    }

    // =========================================================================
    //  2. TAREFAS ATRASADAS
    // =========================================================================

    pub async fn send_overdue_alerts(&self, now: DateTime<Utc>) -> Result<JobReport, AppError> {
        let candidates = self.tasks.find_open_tasks_overdue(now).await?;

        let pending: Vec<PendingReminder> = candidates
            .iter()
            .flat_map(|c| {
                c.assignee_ids.iter().map(move |&user_id| {
                    PendingReminder::new(c.task.id, Recipient::User(user_id), Subject::Task(c.task.id), NotificationRequest {
                        title: "Task overdue".to_string(),
                        message: format!(
                            "Task \"{}\" is overdue (was due {}).",
                            c.task.title,
                            c.due_date.format("%Y-%m-%d %H:%M UTC")
                        ),
                        channels: vec![NotificationChannel::InApp, NotificationChannel::Whatsapp],
                        targets: NotificationTargets {
                            user_id: Some(user_id),
                            task_id: Some(c.task.id),
                            project_id: c.task.project_id,
                            shipment_id: c.task.shipment_id,
                            ..Default::default()
                        },
                        metadata: NotificationMetadata::TaskOverdue(TaskOverdueMetadata {
                            task_title: c.task.title.clone(),
                            due_date: c.due_date,
                        }),
                    })
                })
            })
            .collect();

        let report = self.run_pairs(pending, now).await;
        tracing::info!(processed = report.processed, sent = report.sent, skipped = report.skipped, "🚨 Alertas de atraso");
        Ok(report)
    }

    // =========================================================================
    //  3. ETAPAS PARADAS
    // =========================================================================

    pub async fn check_stalled_stages(&self, now: DateTime<Utc>) -> Result<JobReport, AppError> {
        let threshold = now - Duration::hours(self.config.stalled_stage_hours);
        let stalled = self.tracking.find_stalled_stages(threshold).await?;

        let mut orphans = Vec::new();
        let mut pending = Vec::with_capacity(stalled.len());

        for s in stalled {
            let stage = &s.stage;
            // Sem dono no projeto não há a quem avisar
            let (Some(owner_id), Some(started_at)) = (s.owner_user_id, stage.started_at) else {
                tracing::debug!(stage_id = %stage.id, "Etapa parada sem responsável");
                orphans.push(ReminderOutcome::failed(stage.id, None, "shipment has no project owner"));
                continue;
            };

            let stage_name = stage_registry::stage_name(stage.stage_type);
            let hours_in_progress = (now - started_at).num_hours();

            let subject = Subject::Shipment(stage.shipment_id);
            pending.push(PendingReminder::new(stage.id, Recipient::User(owner_id), subject, NotificationRequest {
                title: "Stage needs attention".to_string(),
                message: format!(
                    "{} for shipment {} has been in progress for {} hours.",
                    stage_name, s.shipment_reference, hours_in_progress
                ),
                channels: vec![NotificationChannel::InApp],
                targets: NotificationTargets {
                    user_id: Some(owner_id),
                    shipment_id: Some(stage.shipment_id),
                    ..Default::default()
                },
                metadata: NotificationMetadata::StageAttentionNeeded(StageAttentionMetadata {
                    stage_type: stage.stage_type,
                    stage_name: stage_name.to_string(),
                    shipment_reference: s.shipment_reference.clone(),
                    started_at,
                    hours_in_progress,
                }),
            }));
        }

        let mut report = self.run_pairs(pending, now).await;
        if !orphans.is_empty() {
            let mut results = std::mem::take(&mut report.results);
            results.extend(orphans);
            report = JobReport::from_outcomes(results);
        }
        tracing::info!(processed = report.processed, sent = report.sent, skipped = report.skipped, "🐢 Etapas paradas");
        Ok(report)
    }

    // =========================================================================
    //  4. FATURAS VENCIDAS
    // =========================================================================

    pub async fn send_payment_reminders(&self, now: DateTime<Utc>) -> Result<JobReport, AppError> {
        let today = now.date_naive();
        let invoices = self.invoices.find_overdue_invoices(today).await?;

        let pending: Vec<PendingReminder> = invoices
            .iter()
            .filter_map(|invoice| {
                let client_id = invoice.client_id?;
                let days_overdue = (today - invoice.due_date).num_days();
                let amount = format_amount(invoice.total_amount, &invoice.currency);

                let subject = Subject::Invoice(invoice.id);
                Some(PendingReminder::new(invoice.id, Recipient::Client(client_id), subject, NotificationRequest {
                    title: "Payment overdue".to_string(),
                    message: format!(
                        "Invoice {} for {} is {} days overdue.",
                        invoice.invoice_number, amount, days_overdue
                    ),
                    channels: vec![NotificationChannel::InApp, NotificationChannel::Whatsapp],
                    targets: NotificationTargets {
                        client_id: Some(client_id),
                        invoice_id: Some(invoice.id),
                        shipment_id: invoice.shipment_id,
                        ..Default::default()
                    },
                    metadata: NotificationMetadata::PaymentOverdue(PaymentOverdueMetadata {
                        invoice_number: invoice.invoice_number.clone(),
                        total_amount: invoice.total_amount,
                        currency: invoice.currency.clone(),
                        due_date: invoice.due_date,
                        days_overdue,
                    }),
                }))
            })
            .collect();

        let report = self.run_pairs(pending, now).await;
        tracing::info!(processed = report.processed, sent = report.sent, skipped = report.skipped, "💰 Cobranças vencidas");
        Ok(report)
    }

    // =========================================================================
    //  ORQUESTRADOR
    // =========================================================================

    /// Roda as quatro varreduras em paralelo. Erro de uma não derruba as outras.
    pub async fn run_all_reminder_jobs(&self, now: DateTime<Utc>) -> ReminderRunSummary {
        tracing::info!("🔄 Iniciando varredura de lembretes");

        let (due_soon, overdue, stages, payments) = tokio::join!(
            self.send_due_soon_reminders(now),
            self.send_overdue_alerts(now),
            self.check_stalled_stages(now),
            self.send_payment_reminders(now),
        );

        let summary = ReminderRunSummary {
            due_soon_reminders: settle("due_soon_reminders", due_soon),
            overdue_alerts: settle("overdue_alerts", overdue),
            stage_alerts: settle("stage_alerts", stages),
            payment_reminders: settle("payment_reminders", payments),
            timestamp: Utc::now(),
        };

        tracing::info!(
            due_soon = summary.due_soon_reminders.sent,
            overdue = summary.overdue_alerts.sent,
            stages = summary.stage_alerts.sent,
            payments = summary.payment_reminders.sent,
            "✅ Varredura concluída"
        );
        summary
    }

    // =========================================================================
    //  PIPELINE COMUM
    // =========================================================================

    async fn run_pairs(&self, pending: Vec<PendingReminder>, now: DateTime<Utc>) -> JobReport {
        let since = now - Duration::hours(self.config.dedup_window_hours);
        let service = self.clone();
        let outcomes: Vec<ReminderOutcome> = stream::iter(pending)
            .map(move |p| {
                let svc = service.clone();
                async move { svc.dispatch_pair(p, since).await }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;
        JobReport::from_outcomes(outcomes)
    }

    async fn dispatch_pair(&self, pending: PendingReminder, since: DateTime<Utc>) -> ReminderOutcome {
        let PendingReminder { subject_id, recipient_id, key, request } = pending;

        match self.notifications.store().exists_recent(&key, since).await {
            Ok(true) => {
                tracing::debug!(subject_id = %subject_id, kind = ?key.notification_type, "Já notificado na janela");
                return ReminderOutcome::skipped(subject_id, recipient_id);
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(subject_id = %subject_id, error = %e, "Falha na checagem de dedup");
                return ReminderOutcome::failed(subject_id, recipient_id, e.to_string());
            }
        }

        match self.notifications.create_notification(request).await {
            Ok(result) => ReminderOutcome::dispatched(subject_id, recipient_id, result),
            // Restrição única no banco: outra varredura chegou primeiro
            Err(AppError::UniqueConstraintViolation(_)) => ReminderOutcome::skipped(subject_id, recipient_id),
            Err(e) => {
                tracing::error!(subject_id = %subject_id, error = %e, "Falha ao despachar lembrete");
                ReminderOutcome::failed(subject_id, recipient_id, e.to_string())
            }
        }
    }
}

fn settle(job: &str, result: Result<JobReport, AppError>) -> JobReport {
    result.unwrap_or_else(|e| {
        tracing::error!(job = job, error = %e, "🔥 Varredura abortada na consulta inicial");
        JobReport::from_error(e.to_string())
    })
}
