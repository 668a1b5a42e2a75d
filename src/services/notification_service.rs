// src/services/notification_service.rs

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use validator::Validate;

use crate::{
    common::error::AppError,
    db::{ContactStore, NotificationStore},
    models::notification::{
        ChannelDeliveryStatus, ChannelOutcome, DispatchResult, NewNotification, Notification,
        NotificationChannel, NotificationRequest, NotificationStatus, NotificationTargets,
    },
    services::whatsapp_service::{template_for, MessagingGateway, OutboundContent},
};

pub const NO_PHONE_ERROR: &str = "no phone number on file";

// =============================================================================
//  CANAIS
// =============================================================================

/// Um meio de entrega. Novos canais entram no mapa do dispatcher sem mexer
/// no laço principal.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> NotificationChannel;

    /// Nunca retorna erro: qualquer falha vira `ChannelOutcome::failed`.
    async fn deliver(&self, notification: &Notification, request: &NotificationRequest) -> ChannelOutcome;
}

/// A própria linha persistida é a entrega in-app.
pub struct InAppChannel;

#[async_trait]
impl ChannelSender for InAppChannel {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::InApp
    }

    async fn deliver(&self, _notification: &Notification, _request: &NotificationRequest) -> ChannelOutcome {
        ChannelOutcome::sent(NotificationChannel::InApp)
    }
}

pub struct WhatsAppChannel {
    gateway: Arc<dyn MessagingGateway>,
    contacts: Arc<dyn ContactStore>,
}

impl WhatsAppChannel {
    pub fn new(gateway: Arc<dyn MessagingGateway>, contacts: Arc<dyn ContactStore>) -> Self {
        Self { gateway, contacts }
    }

    // Ordem: telefone do usuário → whatsapp do cliente → telefone do cliente
    async fn resolve_phone(&self, targets: &NotificationTargets) -> Result<Option<String>, AppError> {
        if let Some(user_id) = targets.user_id {
            let phone = self.contacts.find_user(user_id).await?.and_then(|u| u.phone);
            if let Some(phone) = phone.filter(|p| !p.trim().is_empty()) {
                return Ok(Some(phone));
            }
        }

        if let Some(client_id) = targets.client_id {
            if let Some(client) = self.contacts.find_client(client_id).await? {
                let phone = [client.whatsapp_number, client.phone]
                    .into_iter()
                    .flatten()
                    .find(|p| !p.trim().is_empty());
                return Ok(phone);
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl ChannelSender for WhatsAppChannel {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Whatsapp
    }

    async fn deliver(&self, notification: &Notification, request: &NotificationRequest) -> ChannelOutcome {
        let phone = match self.resolve_phone(&request.targets).await {
            Ok(Some(phone)) => phone,
            Ok(None) => return ChannelOutcome::failed(NotificationChannel::Whatsapp, NO_PHONE_ERROR),
            Err(e) => {
                tracing::warn!(notification_id = %notification.id, error = %e, "Falha ao buscar contato");
                return ChannelOutcome::failed(NotificationChannel::Whatsapp, e.to_string());
            }
        };

        let content = template_for(&request.metadata)
            .unwrap_or_else(|| OutboundContent::text(Some(&request.title), &request.message));

        let result = self.gateway.send(&phone, &content, Some(notification.id)).await;
        if result.success {
            ChannelOutcome::sent(NotificationChannel::Whatsapp)
        } else {
            ChannelOutcome::failed(
                NotificationChannel::Whatsapp,
                result.error.unwrap_or_else(|| "send failed".to_string()),
            )
        }
    }
}

/// EMAIL / SMS: aceito, mas ainda sem envio real.
pub struct PlaceholderChannel(pub NotificationChannel);

#[async_trait]
impl ChannelSender for PlaceholderChannel {
    fn channel(&self) -> NotificationChannel {
        self.0
    }

    async fn deliver(&self, _notification: &Notification, _request: &NotificationRequest) -> ChannelOutcome {
        ChannelOutcome::pending(self.0)
    }
}

// =============================================================================
//  DISPATCHER
// =============================================================================

#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    senders: HashMap<NotificationChannel, Arc<dyn ChannelSender>>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn NotificationStore>, senders: Vec<Arc<dyn ChannelSender>>) -> Self {
        let senders = senders.into_iter().map(|s| (s.channel(), s)).collect();
        Self { store, senders }
    }

    /// IN_APP + WhatsApp reais, EMAIL/SMS como placeholder.
    pub fn with_default_channels(
        store: Arc<dyn NotificationStore>,
        gateway: Arc<dyn MessagingGateway>,
        contacts: Arc<dyn ContactStore>,
    ) -> Self {
        Self::new(
            store,
            vec![
                Arc::new(InAppChannel),
                Arc::new(WhatsAppChannel::new(gateway, contacts)),
                Arc::new(PlaceholderChannel(NotificationChannel::Email)),
                Arc::new(PlaceholderChannel(NotificationChannel::Sms)),
            ],
        )
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    /// Persiste PENDING, entrega canal a canal na ordem pedida e fecha o
    /// status: SENT se ao menos um canal entregou, senão FAILED.
    pub async fn create_notification(&self, request: NotificationRequest) -> Result<DispatchResult, AppError> {
        request.validate()?;

        let primary = request.channels[0];
        let notification = self
            .store
            .create(NewNotification {
                notification_type: request.metadata.notification_type(),
                title: request.title.clone(),
                message: request.message.clone(),
                channel: primary,
                targets: request.targets,
                metadata: request.metadata.to_value()?,
            })
            .await?;

        let mut channels = Vec::with_capacity(request.channels.len());
        for channel in &request.channels {
            let outcome = match self.senders.get(channel) {
                Some(sender) => sender.deliver(&notification, &request).await,
                None => ChannelOutcome::failed(*channel, "channel not available"),
            };

            if let Some(error) = &outcome.error {
                tracing::warn!(
                    notification_id = %notification.id,
                    channel = ?outcome.channel,
                    error = %error,
                    "Canal falhou"
                );
            }
            channels.push(outcome);
        }

        let any_sent = channels.iter().any(|c| c.status == ChannelDeliveryStatus::Sent);
        let (status, sent_at) = if any_sent {
            (NotificationStatus::Sent, Some(Utc::now()))
        } else {
            (NotificationStatus::Failed, None)
        };

        self.store.update_status(notification.id, status, sent_at).await?;

        tracing::info!(
            notification_id = %notification.id,
            kind = ?notification.notification_type,
            status = ?status,
            "📨 Notificação despachada"
        );

        Ok(DispatchResult { id: notification.id, status, channels })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingGateway;
    use super::*;
    use crate::db::memory::InMemoryStore;
    use crate::models::notification::{NotificationMetadata, NotificationType, StageAttentionMetadata, TaskOverdueMetadata};
    use crate::models::tracking::StageType;

    fn service(store: &Arc<InMemoryStore>, gateway: &Arc<RecordingGateway>) -> NotificationService {
        NotificationService::with_default_channels(store.clone(), gateway.clone(), store.clone())
    }

    fn overdue_request(targets: NotificationTargets, channels: Vec<NotificationChannel>) -> NotificationRequest {
        NotificationRequest {
            title: "Task overdue".into(),
            message: "Submit customs declaration is overdue".into(),
            channels,
            targets,
            metadata: NotificationMetadata::TaskOverdue(TaskOverdueMetadata {
                task_title: "Submit customs declaration".into(),
                due_date: Utc::now(),
            }),
        }
    }

    #[tokio::test]
    async fn in_app_keeps_notification_sent_when_whatsapp_has_no_phone() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(RecordingGateway::default());
        let user = store.add_user(None);

        let targets = NotificationTargets { user_id: Some(user), ..Default::default() };
        let result = service(&store, &gateway)
            .create_notification(overdue_request(
                targets,
                vec![NotificationChannel::InApp, NotificationChannel::Whatsapp],
            ))
            .await
            .unwrap();

        assert_eq!(result.status, NotificationStatus::Sent);
        assert_eq!(result.channels[0], ChannelOutcome::sent(NotificationChannel::InApp));
        assert_eq!(result.channels[1], ChannelOutcome::failed(NotificationChannel::Whatsapp, NO_PHONE_ERROR));
        assert!(gateway.sent().is_empty());

        let stored = store.notifications();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, NotificationStatus::Sent);
        assert_eq!(stored[0].channel, NotificationChannel::InApp);
        assert!(stored[0].sent_at.is_some());
    }

    #[tokio::test]
    async fn all_channels_failing_marks_notification_failed() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(RecordingGateway::failing());
        let user = store.add_user(Some("0912345678"));

        let targets = NotificationTargets { user_id: Some(user), ..Default::default() };
        let result = service(&store, &gateway)
            .create_notification(overdue_request(targets, vec![NotificationChannel::Whatsapp]))
            .await
            .unwrap();

        assert_eq!(result.status, NotificationStatus::Failed);
        assert_eq!(result.channels[0].error.as_deref(), Some("gateway timeout"));
        let stored = &store.notifications()[0];
        assert_eq!(stored.status, NotificationStatus::Failed);
        assert_eq!(stored.channel, NotificationChannel::Whatsapp);
        assert!(stored.sent_at.is_none());
    }

    #[tokio::test]
    async fn email_and_sms_are_pending_not_failed() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(RecordingGateway::default());

        let result = service(&store, &gateway)
            .create_notification(overdue_request(
                NotificationTargets::default(),
                vec![NotificationChannel::Email, NotificationChannel::Sms],
            ))
            .await
            .unwrap();

        assert!(result.channels.iter().all(|c| c.status == ChannelDeliveryStatus::Pending));
        // Nenhum canal entregou de fato
        assert_eq!(result.status, NotificationStatus::Failed);
    }

    #[tokio::test]
    async fn whatsapp_uses_template_and_links_notification() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(RecordingGateway::default());
        let user = store.add_user(Some("+249 912 345 678"));

        let targets = NotificationTargets { user_id: Some(user), ..Default::default() };
        let result = service(&store, &gateway)
            .create_notification(overdue_request(
                targets,
                vec![NotificationChannel::InApp, NotificationChannel::Whatsapp],
            ))
            .await
            .unwrap();

        let sent = gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "+249 912 345 678");
        assert!(matches!(&sent[0].1, OutboundContent::Template { name, .. } if name == "task_overdue_alert"));
        assert_eq!(sent[0].2, Some(result.id));
        assert!(result.channels.iter().all(|c| c.status == ChannelDeliveryStatus::Sent));
    }

    #[tokio::test]
    async fn falls_back_to_client_numbers_and_text_body() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(RecordingGateway::default());
        let client = store.add_client(None, Some("0911000111"));

        let request = NotificationRequest {
            title: "Stage needs attention".into(),
            message: "Inspection has been in progress for 50 hours".into(),
            channels: vec![NotificationChannel::Whatsapp],
            targets: NotificationTargets { client_id: Some(client), ..Default::default() },
            metadata: NotificationMetadata::StageAttentionNeeded(StageAttentionMetadata {
                stage_type: StageType::Inspection,
                stage_name: "Inspection".into(),
                shipment_reference: "BL-1".into(),
                started_at: Utc::now(),
                hours_in_progress: 50,
            }),
        };
        service(&store, &gateway).create_notification(request).await.unwrap();

        let sent = gateway.sent();
        assert_eq!(sent[0].0, "0911000111");
        assert_eq!(
            sent[0].1,
            OutboundContent::Text {
                body: "Stage needs attention\n\nInspection has been in progress for 50 hours".into()
            }
        );
        assert_eq!(store.notifications()[0].notification_type, NotificationType::StageAttentionNeeded);
    }

    #[tokio::test]
    async fn client_whatsapp_number_wins_over_general_phone() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(RecordingGateway::default());
        let client = store.add_client(Some("0922000222"), Some("0911000111"));

        let targets = NotificationTargets { client_id: Some(client), ..Default::default() };
        service(&store, &gateway)
            .create_notification(overdue_request(targets, vec![NotificationChannel::Whatsapp]))
            .await
            .unwrap();

        assert_eq!(gateway.sent()[0].0, "0922000222");
    }

    #[tokio::test]
    async fn rejects_requests_without_channels_or_title() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(RecordingGateway::default());
        let svc = service(&store, &gateway);

        let no_channels = overdue_request(NotificationTargets::default(), vec![]);
        assert!(matches!(svc.create_notification(no_channels).await, Err(AppError::ValidationError(_))));

        let mut no_title = overdue_request(NotificationTargets::default(), vec![NotificationChannel::InApp]);
        no_title.title.clear();
        assert!(matches!(svc.create_notification(no_title).await, Err(AppError::ValidationError(_))));

        assert!(store.notifications().is_empty());
    }

    #[tokio::test]
    async fn unregistered_channel_fails_without_aborting_others() {
        let store = Arc::new(InMemoryStore::new());
        let svc = NotificationService::new(store.clone(), vec![Arc::new(InAppChannel)]);

        let result = svc
            .create_notification(overdue_request(
                NotificationTargets::default(),
                vec![NotificationChannel::Whatsapp, NotificationChannel::InApp],
            ))
            .await
            .unwrap();

        assert_eq!(result.channels[0].status, ChannelDeliveryStatus::Failed);
        assert_eq!(result.channels[1].status, ChannelDeliveryStatus::Sent);
        assert_eq!(result.status, NotificationStatus::Sent);
    }
}
