// src/services/tracking_service.rs

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::{
    common::error::AppError,
    db::TrackingStore,
    models::{
        notification::{
            DispatchResult, NotificationChannel, NotificationMetadata, NotificationRequest, NotificationTargets,
            ShipmentMilestoneMetadata,
        },
        tracking::{
            Shipment, StageStatus, StageTransition, StageType, StageView, TrackingStage, TrackingTimeline,
            UpdateStageRequest,
        },
    },
    services::{notification_service::NotificationService, stage_registry},
};

// Tolerância de relógio para `occurredAt`
const MAX_CLOCK_SKEW_MINUTES: i64 = 5;

#[derive(Clone)]
pub struct TrackingService {
    repo: Arc<dyn TrackingStore>,
    notifications: NotificationService,
}

impl TrackingService {
    pub fn new(repo: Arc<dyn TrackingStore>, notifications: NotificationService) -> Self {
        Self { repo, notifications }
    }

    async fn shipment(&self, shipment_id: uuid::Uuid) -> Result<Shipment, AppError> {
        self.repo
            .find_shipment(shipment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Embarque".into()))
    }

    // =========================================================================
    //  LINHA DO TEMPO
    // =========================================================================

    pub async fn timeline(&self, shipment_id: uuid::Uuid) -> Result<TrackingTimeline, AppError> {
        let shipment = self.shipment(shipment_id).await?;
        let stages = self.repo.list_stages(shipment_id).await?;
        Ok(build_timeline(&shipment, &stages, Utc::now()))
    }

    /// Materializa as 11 etapas (PENDING) com a ETA de cada uma. Rodar de
    /// novo não mexe nas que já existem.
    pub async fn initialize_stages(&self, shipment_id: uuid::Uuid) -> Result<TrackingTimeline, AppError> {
        let shipment = self.shipment(shipment_id).await?;
        let now = Utc::now();
        let anchor = shipment.vessel_arrival_date.unwrap_or(now);

        let inserted = self.repo.insert_missing_stages(shipment_id, &stage_etas(anchor)).await?;
        tracing::info!(shipment_id = %shipment_id, inserted = inserted, "🚢 Etapas de rastreio inicializadas");

        let stages = self.repo.list_stages(shipment_id).await?;
        Ok(build_timeline(&shipment, &stages, now))
    }

    // =========================================================================
    //  TRANSIÇÃO DE ETAPA
    // =========================================================================

    pub async fn update_stage_status(
        &self,
        shipment_id: uuid::Uuid,
        stage_type: StageType,
        payload: UpdateStageRequest,
    ) -> Result<StageTransition, AppError> {
        let now = Utc::now();
        let at = payload.occurred_at.unwrap_or(now);
        if at > now + Duration::minutes(MAX_CLOCK_SKEW_MINUTES) {
            return Err(AppError::BadRequest("occurredAt cannot be in the future".into()));
        }

        let shipment = self.shipment(shipment_id).await?;
        let mut stages = self.repo.list_stages(shipment_id).await?;

        // Embarque antigo sem etapas: cria antes de transicionar
        if !stages.iter().any(|s| s.stage_type == stage_type) {
            let anchor = shipment.vessel_arrival_date.unwrap_or(now);
            self.repo.insert_missing_stages(shipment_id, &stage_etas(anchor)).await?;
            stages = self.repo.list_stages(shipment_id).await?;
        }

        let previous = stages
            .iter()
            .find(|s| s.stage_type == stage_type)
            .ok_or_else(|| AppError::NotFound("Etapa".into()))?;
        let previous_status = previous.status;
        let (started_at, completed_at) = transition_timestamps(previous, payload.status, at);

        let updated = self
            .repo
            .update_stage(shipment_id, stage_type, payload.status, started_at, completed_at)
            .await?
            .ok_or_else(|| AppError::NotFound("Etapa".into()))?;

        tracing::info!(
            shipment = %shipment.reference,
            stage = stage_type.as_str(),
            from = ?previous_status,
            to = ?payload.status,
            "🔁 Etapa atualizada"
        );

        if let Some(row) = stages.iter_mut().find(|s| s.stage_type == stage_type) {
            *row = updated.clone();
        }
        let progress = stage_registry::progress(&stages);

        let reached_milestone = payload.status == StageStatus::Completed
            && previous_status != StageStatus::Completed
            && stage_registry::is_milestone(stage_type);

        let milestone_notification = if reached_milestone {
            self.notify_milestone(&shipment, stage_type, progress.percentage).await
        } else {
            None
        };

        Ok(StageTransition { stage: updated, progress, milestone_notification })
    }

    // Falha aqui nunca desfaz a transição
    async fn notify_milestone(
        &self,
        shipment: &Shipment,
        stage_type: StageType,
        progress_percentage: u8,
    ) -> Option<DispatchResult> {
        let client_id = shipment.client_id?;
        let stage_name = stage_registry::stage_name(stage_type);

        let request = NotificationRequest {
            title: format!("Shipment {} update", shipment.reference),
            message: format!(
                "{} completed for shipment {}. Overall progress: {}%.",
                stage_name, shipment.reference, progress_percentage
            ),
            channels: vec![NotificationChannel::InApp, NotificationChannel::Whatsapp],
            targets: NotificationTargets {
                client_id: Some(client_id),
                shipment_id: Some(shipment.id),
                project_id: shipment.project_id,
                ..Default::default()
            },
            metadata: NotificationMetadata::ShipmentMilestone(ShipmentMilestoneMetadata {
                stage_type,
                stage_name: stage_name.to_string(),
                shipment_reference: shipment.reference.clone(),
                progress_percentage,
            }),
        };

        match self.notifications.create_notification(request).await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::error!(shipment = %shipment.reference, error = %e, "Falha ao notificar marco");
                None
            }
        }
    }
}

// ETA de cada etapa = fim da sua janela
fn stage_etas(anchor: DateTime<Utc>) -> Vec<(StageType, DateTime<Utc>)> {
    stage_registry::calculate_stage_windows(anchor)
        .into_iter()
        .map(|(stage_type, window)| (stage_type, window.end))
        .collect()
}

/// IN_PROGRESS carimba o início; COMPLETED/SKIPPED carimbam o fim (e o início,
/// se faltava); PENDING limpa os dois.
fn transition_timestamps(
    current: &TrackingStage,
    status: StageStatus,
    at: DateTime<Utc>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    match status {
        StageStatus::Pending => (None, None),
        StageStatus::InProgress => (Some(current.started_at.unwrap_or(at)), None),
        StageStatus::Completed | StageStatus::Skipped => {
            (Some(current.started_at.unwrap_or(at)), Some(current.completed_at.unwrap_or(at)))
        }
    }
}

fn build_timeline(shipment: &Shipment, stages: &[TrackingStage], now: DateTime<Utc>) -> TrackingTimeline {
    let anchor = shipment.vessel_arrival_date.unwrap_or(now);

    let views = stage_registry::ordered_stage_windows(anchor)
        .into_iter()
        .map(|(stage_type, window)| {
            let row = stages.iter().find(|s| s.stage_type == stage_type);
            StageView {
                stage_type,
                name: stage_registry::stage_name(stage_type).to_string(),
                order: stage_registry::stage_order(stage_type),
                status: row.map(|r| r.status).unwrap_or(StageStatus::Pending),
                is_milestone: stage_registry::is_milestone(stage_type),
                started_at: row.and_then(|r| r.started_at),
                completed_at: row.and_then(|r| r.completed_at),
                estimated_start: window.start,
                estimated_end: window.end,
            }
        })
        .collect();

    let current_stage = stage_registry::current_stage(stages);

    TrackingTimeline {
        shipment_id: shipment.id,
        reference: shipment.reference.clone(),
        stages: views,
        progress: stage_registry::progress(stages),
        current_stage,
        next_stage: current_stage.and_then(stage_registry::next_stage),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use uuid::Uuid;

    use super::*;
    use crate::db::memory::InMemoryStore;
    use crate::models::notification::{NotificationStatus, NotificationType};
    use crate::services::notification_service::testing::RecordingGateway;
    use crate::services::whatsapp_service::OutboundContent;

    fn service(store: &Arc<InMemoryStore>, gateway: &Arc<RecordingGateway>) -> TrackingService {
        let notifications = NotificationService::with_default_channels(store.clone(), gateway.clone(), store.clone());
        TrackingService::new(store.clone(), notifications)
    }

    fn to(status: StageStatus) -> UpdateStageRequest {
        UpdateStageRequest { status, occurred_at: None }
    }

    #[tokio::test]
    async fn initialize_creates_all_stages_with_chained_etas() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(RecordingGateway::default());
        let arrival = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let shipment = store.add_shipment(None, None, Some(arrival));
        let svc = service(&store, &gateway);

        let timeline = svc.initialize_stages(shipment).await.unwrap();

        assert_eq!(timeline.stages.len(), 11);
        assert_eq!(timeline.progress.percentage, 0);
        assert_eq!(timeline.current_stage, Some(StageType::VesselArrival));
        assert_eq!(timeline.next_stage, Some(StageType::DocumentsReceived));

        let rows = store.stages_of(shipment);
        assert_eq!(rows.len(), 11);
        let declaration = rows.iter().find(|s| s.stage_type == StageType::CustomsDeclaration).unwrap();
        // 0 + 24 + 24 + 48
        assert_eq!(declaration.estimated_at, Some(arrival + Duration::hours(96)));

        // Idempotente
        svc.initialize_stages(shipment).await.unwrap();
        assert_eq!(store.stages_of(shipment).len(), 11);
    }

    #[tokio::test]
    async fn timeline_fills_missing_rows_as_pending() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(RecordingGateway::default());
        let shipment = store.add_shipment(None, None, None);
        store.add_stage(shipment, StageType::VesselArrival, StageStatus::Completed, None);
        store.add_stage(shipment, StageType::DocumentsReceived, StageStatus::Skipped, None);
        store.add_stage(shipment, StageType::ManifestSubmitted, StageStatus::InProgress, Some(Utc::now()));

        let timeline = service(&store, &gateway).timeline(shipment).await.unwrap();

        assert_eq!(timeline.stages.len(), 11);
        assert_eq!(timeline.stages[10].status, StageStatus::Pending);
        assert_eq!(timeline.progress.completed, 2);
        assert_eq!(timeline.progress.percentage, 18);
        assert_eq!(timeline.current_stage, Some(StageType::ManifestSubmitted));
        assert_eq!(timeline.next_stage, Some(StageType::CustomsDeclaration));
        assert!(timeline.stages.windows(2).all(|w| w[0].estimated_end == w[1].estimated_start));
    }

    #[tokio::test]
    async fn unknown_shipment_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(RecordingGateway::default());

        let result = service(&store, &gateway).timeline(Uuid::new_v4()).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn transitions_stamp_and_clear_timestamps() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(RecordingGateway::default());
        let shipment = store.add_shipment(None, None, None);
        let svc = service(&store, &gateway);
        svc.initialize_stages(shipment).await.unwrap();

        let started = svc
            .update_stage_status(shipment, StageType::Inspection, to(StageStatus::InProgress))
            .await
            .unwrap();
        let started_at = started.stage.started_at.unwrap();
        assert!(started.stage.completed_at.is_none());

        let done = svc
            .update_stage_status(shipment, StageType::Inspection, to(StageStatus::Completed))
            .await
            .unwrap();
        assert_eq!(done.stage.started_at, Some(started_at));
        assert!(done.stage.completed_at.is_some());
        assert_eq!(done.progress.completed, 1);
        // Inspeção não é marco
        assert!(done.milestone_notification.is_none());

        let reset = svc
            .update_stage_status(shipment, StageType::Inspection, to(StageStatus::Pending))
            .await
            .unwrap();
        assert!(reset.stage.started_at.is_none());
        assert!(reset.stage.completed_at.is_none());
        assert_eq!(reset.progress.completed, 0);
    }

    #[tokio::test]
    async fn completing_a_milestone_notifies_the_client() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(RecordingGateway::default());
        let client = store.add_client(Some("0912345678"), None);
        let shipment = store.add_shipment(Some(client), None, None);
        let svc = service(&store, &gateway);
        svc.initialize_stages(shipment).await.unwrap();

        let transition = svc
            .update_stage_status(shipment, StageType::VesselArrival, to(StageStatus::Completed))
            .await
            .unwrap();

        let dispatch = transition.milestone_notification.expect("marco deveria notificar");
        assert_eq!(dispatch.status, NotificationStatus::Sent);

        let stored = store.notifications();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].notification_type, NotificationType::ShipmentMilestone);
        assert_eq!(stored[0].client_id, Some(client));
        assert_eq!(stored[0].metadata["progressPercentage"], 9);

        let sent = gateway.sent();
        assert!(matches!(&sent[0].1, OutboundContent::Template { name, .. } if name == "shipment_update"));

        // Completar de novo não repete o aviso
        let again = svc
            .update_stage_status(shipment, StageType::VesselArrival, to(StageStatus::Completed))
            .await
            .unwrap();
        assert!(again.milestone_notification.is_none());
        assert_eq!(store.notifications().len(), 1);
    }

    #[tokio::test]
    async fn milestone_without_client_still_transitions() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(RecordingGateway::default());
        let shipment = store.add_shipment(None, None, None);

        // Sem initialize: as etapas são criadas na hora
        let transition = service(&store, &gateway)
            .update_stage_status(shipment, StageType::Delivered, to(StageStatus::Completed))
            .await
            .unwrap();

        assert_eq!(transition.stage.status, StageStatus::Completed);
        assert!(transition.milestone_notification.is_none());
        assert_eq!(store.stages_of(shipment).len(), 11);
    }

    #[tokio::test]
    async fn future_occurred_at_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(RecordingGateway::default());
        let shipment = store.add_shipment(None, None, None);

        let result = service(&store, &gateway)
            .update_stage_status(
                shipment,
                StageType::Inspection,
                UpdateStageRequest {
                    status: StageStatus::InProgress,
                    occurred_at: Some(Utc::now() + Duration::hours(3)),
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
