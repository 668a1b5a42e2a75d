// src/models/tracking.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Enums (Mapeando o Postgres) ---

// As 11 etapas do desembaraço. A ordem oficial fica no registro
// (services::stage_registry), não na ordem de declaração.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "stage_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageType {
    VesselArrival,
    DocumentsReceived,
    ManifestSubmitted,
    CustomsDeclaration,
    DutyPayment,
    Inspection,
    CustomsRelease,
    PortClearance,
    TransportArranged,
    InTransit,
    Delivered,
}

impl StageType {
    /// Mesmo texto usado no Postgres e no metadata das notificações.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageType::VesselArrival => "VESSEL_ARRIVAL",
            StageType::DocumentsReceived => "DOCUMENTS_RECEIVED",
            StageType::ManifestSubmitted => "MANIFEST_SUBMITTED",
            StageType::CustomsDeclaration => "CUSTOMS_DECLARATION",
            StageType::DutyPayment => "DUTY_PAYMENT",
            StageType::Inspection => "INSPECTION",
            StageType::CustomsRelease => "CUSTOMS_RELEASE",
            StageType::PortClearance => "PORT_CLEARANCE",
            StageType::TransportArranged => "TRANSPORT_ARRANGED",
            StageType::InTransit => "IN_TRANSIT",
            StageType::Delivered => "DELIVERED",
        }
    }
}

impl std::str::FromStr for StageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        crate::services::stage_registry::STAGES
            .iter()
            .map(|def| def.stage_type)
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("Etapa desconhecida: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "stage_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
}

impl StageStatus {
    // SKIPPED conta como resolvida (mesmo estilo visual de COMPLETED)
    pub fn is_resolved(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Skipped)
    }
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    pub id: Uuid,
    #[schema(example = "BL-2024-00123")]
    pub reference: String,
    pub client_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    // Âncora do cálculo de ETA. Sem data, usamos "agora".
    pub vessel_arrival_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackingStage {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub stage_type: StageType,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Etapa parada em IN_PROGRESS, já com o dono do projeto resolvido
/// (etapa → embarque → projeto → usuário).
#[derive(Debug, Clone, FromRow)]
pub struct StalledStage {
    #[sqlx(flatten)]
    pub stage: TrackingStage,
    pub shipment_reference: String,
    pub owner_user_id: Option<Uuid>,
}

// --- Estruturas derivadas (não persistidas) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StageWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StageProgress {
    pub completed: usize,
    pub total: usize,
    #[schema(example = 45)]
    pub percentage: u8,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StageView {
    pub stage_type: StageType,
    #[schema(example = "Customs Declaration")]
    pub name: String,
    pub order: u8,
    pub status: StageStatus,
    pub is_milestone: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_start: DateTime<Utc>,
    pub estimated_end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackingTimeline {
    pub shipment_id: Uuid,
    pub reference: String,
    pub stages: Vec<StageView>,
    pub progress: StageProgress,
    pub current_stage: Option<StageType>,
    pub next_stage: Option<StageType>,
}

// --- Payloads ---

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStageRequest {
    pub status: StageStatus,
    // Momento real da transição; padrão é agora
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StageTransition {
    pub stage: TrackingStage,
    pub progress: StageProgress,
    // Só quando um marco foi concluído e o embarque tem cliente
    pub milestone_notification: Option<crate::models::notification::DispatchResult>,
}
