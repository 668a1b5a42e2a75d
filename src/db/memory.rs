// src/db/memory.rs
//
// Implementação em memória de todos os repositórios, só para testes.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex, MutexGuard,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{ContactStore, InvoiceStore, NotificationStore, OutboundMessageStore, TaskStore, TrackingStore},
    models::{
        crm::{ClientContact, UserContact},
        finance::{Invoice, InvoiceStatus},
        notification::{DedupKey, NewNotification, Notification, NotificationStatus, Recipient, Subject},
        tasks::{Task, TaskReminderCandidate, TaskStatus},
        tracking::{Shipment, StageStatus, StageType, StalledStage, TrackingStage},
        whatsapp::{DeliveryStatusUpdate, NewOutboundMessage, OutboundMessage, OutboundMessageStatus},
    },
};

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, UserContact>,
    clients: HashMap<Uuid, ClientContact>,
    // projeto → dono
    projects: HashMap<Uuid, Uuid>,
    shipments: HashMap<Uuid, Shipment>,
    stages: Vec<TrackingStage>,
    tasks: Vec<(Task, Vec<Uuid>)>,
    invoices: Vec<Invoice>,
    notifications: Vec<Notification>,
    outbound: Vec<OutboundMessage>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
    pub fail_invoice_queries: AtomicBool,
    pub fail_outbound_log: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // --- Montagem dos cenários ---

    pub fn add_user(&self, phone: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().users.insert(id, UserContact { id, name: "Operador".into(), phone: phone.map(String::from) });
        id
    }

    pub fn add_client(&self, whatsapp_number: Option<&str>, phone: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().clients.insert(
            id,
            ClientContact {
                id,
                name: "Cliente".into(),
                whatsapp_number: whatsapp_number.map(String::from),
                phone: phone.map(String::from),
            },
        );
        id
    }

    pub fn add_project(&self, owner_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().projects.insert(id, owner_id);
        id
    }

    pub fn add_shipment(
        &self,
        client_id: Option<Uuid>,
        project_id: Option<Uuid>,
        vessel_arrival_date: Option<DateTime<Utc>>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().shipments.insert(
            id,
            Shipment {
                id,
                reference: format!("BL-{}", &id.simple().to_string()[..6]),
                client_id,
                project_id,
                vessel_arrival_date,
                created_at: Utc::now(),
            },
        );
        id
    }

    pub fn add_stage(
        &self,
        shipment_id: Uuid,
        stage_type: StageType,
        status: StageStatus,
        started_at: Option<DateTime<Utc>>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.lock().stages.push(TrackingStage {
            id,
            shipment_id,
            stage_type,
            status,
            started_at,
            completed_at: None,
            estimated_at: None,
            created_at: now,
            updated_at: now,
        });
        id
    }

    pub fn add_task(&self, title: &str, status: TaskStatus, due_date: DateTime<Utc>, assignees: Vec<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        let task = Task {
            id,
            title: title.to_string(),
            status,
            due_date: Some(due_date),
            project_id: None,
            shipment_id: None,
            created_at: Utc::now(),
        };
        self.lock().tasks.push((task, assignees));
        id
    }

    pub fn add_invoice(
        &self,
        client_id: Option<Uuid>,
        status: InvoiceStatus,
        total_amount: Decimal,
        due_date: NaiveDate,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().invoices.push(Invoice {
            id,
            invoice_number: format!("INV-{}", &id.simple().to_string()[..4]),
            client_id,
            shipment_id: None,
            status,
            total_amount,
            currency: "USD".into(),
            due_date,
            created_at: Utc::now(),
        });
        id
    }

    // --- Inspeção ---

    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.clone()
    }

    pub fn outbound_messages(&self) -> Vec<OutboundMessage> {
        self.lock().outbound.clone()
    }

    pub fn stages_of(&self, shipment_id: Uuid) -> Vec<TrackingStage> {
        self.lock().stages.iter().filter(|s| s.shipment_id == shipment_id).cloned().collect()
    }

    fn task_candidates(&self, keep: impl Fn(DateTime<Utc>) -> bool) -> Vec<TaskReminderCandidate> {
        let mut out: Vec<TaskReminderCandidate> = self
            .lock()
            .tasks
            .iter()
            .filter(|(task, assignees)| task.status.is_open() && !assignees.is_empty())
            .filter_map(|(task, assignees)| {
                let due_date = task.due_date?;
                keep(due_date).then(|| TaskReminderCandidate {
                    task: task.clone(),
                    due_date,
                    assignee_ids: assignees.clone(),
                })
            })
            .collect();
        out.sort_by_key(|c| c.due_date);
        out
    }
}

#[async_trait]
impl TrackingStore for InMemoryStore {
    async fn find_shipment(&self, shipment_id: Uuid) -> Result<Option<Shipment>, AppError> {
        Ok(self.lock().shipments.get(&shipment_id).cloned())
    }

    async fn list_stages(&self, shipment_id: Uuid) -> Result<Vec<TrackingStage>, AppError> {
        Ok(self.stages_of(shipment_id))
    }

    async fn insert_missing_stages(
        &self,
        shipment_id: Uuid,
        stages: &[(StageType, DateTime<Utc>)],
    ) -> Result<u64, AppError> {
        let mut state = self.lock();
        let mut inserted = 0;
        for (stage_type, eta) in stages {
            let exists = state.stages.iter().any(|s| s.shipment_id == shipment_id && s.stage_type == *stage_type);
            if exists {
                continue;
            }
            let now = Utc::now();
            state.stages.push(TrackingStage {
                id: Uuid::new_v4(),
                shipment_id,
                stage_type: *stage_type,
                status: StageStatus::Pending,
                started_at: None,
                completed_at: None,
                estimated_at: Some(*eta),
                created_at: now,
                updated_at: now,
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn update_stage(
        &self,
        shipment_id: Uuid,
        stage_type: StageType,
        status: StageStatus,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Option<TrackingStage>, AppError> {
        let mut state = self.lock();
        let Some(stage) = state
            .stages
            .iter_mut()
            .find(|s| s.shipment_id == shipment_id && s.stage_type == stage_type)
        else {
            return Ok(None);
        };
        stage.status = status;
        stage.started_at = started_at;
        stage.completed_at = completed_at;
        stage.updated_at = Utc::now();
        Ok(Some(stage.clone()))
    }

    async fn find_stalled_stages(&self, started_before: DateTime<Utc>) -> Result<Vec<StalledStage>, AppError> {
        let state = self.lock();
        let stalled = state
            .stages
            .iter()
            .filter(|s| s.status == StageStatus::InProgress && s.started_at.is_some_and(|at| at < started_before))
            .filter_map(|s| {
                let shipment = state.shipments.get(&s.shipment_id)?;
                let owner_user_id = shipment.project_id.and_then(|p| state.projects.get(&p).copied());
                Some(StalledStage {
                    stage: s.clone(),
                    shipment_reference: shipment.reference.clone(),
                    owner_user_id,
                })
            })
            .collect();
        Ok(stalled)
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn find_open_tasks_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TaskReminderCandidate>, AppError> {
        Ok(self.task_candidates(|due| due >= from && due <= to))
    }

    async fn find_open_tasks_overdue(&self, now: DateTime<Utc>) -> Result<Vec<TaskReminderCandidate>, AppError> {
        Ok(self.task_candidates(|due| due < now))
    }
}

#[async_trait]
impl InvoiceStore for InMemoryStore {
    async fn find_overdue_invoices(&self, today: NaiveDate) -> Result<Vec<Invoice>, AppError> {
        if self.fail_invoice_queries.load(Ordering::SeqCst) {
            return Err(AppError::InternalServerError(anyhow::anyhow!("banco indisponível")));
        }
        Ok(self
            .lock()
            .invoices
            .iter()
            .filter(|i| i.status.is_collectable() && i.due_date < today && i.client_id.is_some())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NotificationStore for InMemoryStore {
    async fn create(&self, n: NewNotification) -> Result<Notification, AppError> {
        let t = n.targets;
        let notification = Notification {
            id: Uuid::new_v4(),
            notification_type: n.notification_type,
            title: n.title,
            message: n.message,
            channel: n.channel,
            status: NotificationStatus::Pending,
            user_id: t.user_id,
            client_id: t.client_id,
            task_id: t.task_id,
            shipment_id: t.shipment_id,
            invoice_id: t.invoice_id,
            project_id: t.project_id,
            metadata: n.metadata,
            sent_at: None,
            created_at: Utc::now(),
        };
        self.lock().notifications.push(notification.clone());
        Ok(notification)
    }

    async fn update_status(
        &self,
        notification_id: Uuid,
        status: NotificationStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        let mut state = self.lock();
        let notification = state
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id)
            .ok_or_else(|| AppError::NotFound("Notificação".into()))?;
        notification.status = status;
        notification.sent_at = sent_at;
        Ok(())
    }

    async fn exists_recent(&self, key: &DedupKey, since: DateTime<Utc>) -> Result<bool, AppError> {
        let matches_key = |n: &Notification| {
            let recipient_ok = match key.recipient {
                Recipient::User(id) => n.user_id == Some(id),
                Recipient::Client(id) => n.client_id == Some(id),
            };
            let subject_ok = match key.subject {
                Subject::Task(id) => n.task_id == Some(id),
                Subject::Invoice(id) => n.invoice_id == Some(id),
                Subject::Shipment(id) => n.shipment_id == Some(id),
            };
            let stage_ok = key
                .stage_type
                .is_none_or(|t| n.metadata.get("stageType").and_then(|v| v.as_str()) == Some(t.as_str()));
            n.notification_type == key.notification_type && recipient_ok && subject_ok && stage_ok && n.created_at >= since
        };
        Ok(self.lock().notifications.iter().any(matches_key))
    }
}

#[async_trait]
impl ContactStore for InMemoryStore {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserContact>, AppError> {
        Ok(self.lock().users.get(&user_id).cloned())
    }

    async fn find_client(&self, client_id: Uuid) -> Result<Option<ClientContact>, AppError> {
        Ok(self.lock().clients.get(&client_id).cloned())
    }
}

#[async_trait]
impl OutboundMessageStore for InMemoryStore {
    async fn record(&self, m: NewOutboundMessage) -> Result<OutboundMessage, AppError> {
        if self.fail_outbound_log.load(Ordering::SeqCst) {
            return Err(AppError::InternalServerError(anyhow::anyhow!("log indisponível")));
        }
        let row = OutboundMessage {
            id: Uuid::new_v4(),
            notification_id: m.notification_id,
            phone_number: m.phone_number,
            template_name: m.template_name,
            status: m.status,
            external_message_id: m.external_message_id,
            sent_at: m.sent_at,
            delivered_at: None,
            read_at: None,
            metadata: m.metadata,
            created_at: Utc::now(),
        };
        self.lock().outbound.push(row.clone());
        Ok(row)
    }

    async fn apply_delivery_status(&self, update: &DeliveryStatusUpdate) -> Result<u64, AppError> {
        let mut state = self.lock();
        let mut changed = 0;
        for row in state
            .outbound
            .iter_mut()
            .filter(|r| r.external_message_id.as_deref() == Some(update.external_message_id.as_str()))
            .filter(|r| r.status.can_advance_to(update.status))
        {
            row.status = update.status;
            match update.status {
                OutboundMessageStatus::Delivered => {
                    row.delivered_at.get_or_insert(update.timestamp);
                }
                OutboundMessageStatus::Read => {
                    row.delivered_at.get_or_insert(update.timestamp);
                    row.read_at = Some(update.timestamp);
                }
                _ => {}
            }
            if let (Some(error), Some(map)) = (&update.error, row.metadata.as_object_mut()) {
                map.insert("error".into(), serde_json::Value::String(error.clone()));
            }
            changed += 1;
        }
        Ok(changed)
    }
}
