// src/docs.rs

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::OpenApi;

use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Tracking ---
        handlers::tracking::get_tracking,
        handlers::tracking::initialize_tracking,
        handlers::tracking::update_stage,

        // --- Jobs ---
        handlers::jobs::run_reminders,

        // --- Webhooks ---
        handlers::webhooks::verify_subscription,
        handlers::webhooks::receive_status,
    ),
    components(
        schemas(
            // --- Tracking ---
            models::tracking::StageType,
            models::tracking::StageStatus,
            models::tracking::Shipment,
            models::tracking::TrackingStage,
            models::tracking::StageWindow,
            models::tracking::StageProgress,
            models::tracking::StageView,
            models::tracking::TrackingTimeline,
            models::tracking::UpdateStageRequest,
            models::tracking::StageTransition,

            // --- Notificações ---
            models::notification::NotificationType,
            models::notification::NotificationChannel,
            models::notification::NotificationStatus,
            models::notification::Notification,
            models::notification::NotificationTargets,
            models::notification::ChannelDeliveryStatus,
            models::notification::ChannelOutcome,
            models::notification::DispatchResult,

            // --- Lembretes ---
            models::reminders::ReminderOutcome,
            models::reminders::JobReport,
            models::reminders::ReminderRunSummary,

            // --- WhatsApp ---
            models::whatsapp::OutboundMessageStatus,
            models::whatsapp::OutboundMessage,
            models::whatsapp::DeliveryStatusUpdate,
            handlers::webhooks::WebhookAck,
        )
    ),
    tags(
        (name = "Tracking", description = "Etapas do desembaraço, ETA e progresso"),
        (name = "Jobs", description = "Varreduras de lembretes disparadas pelo cron"),
        (name = "Webhooks", description = "Retorno de status do WhatsApp Cloud API")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme("cron_secret", SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.as_str() == "/api/shipments/{id}/tracking"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/shipments/{id}/stages/{stageType}"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/cron/reminders"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/webhooks/whatsapp"));
    }
}
