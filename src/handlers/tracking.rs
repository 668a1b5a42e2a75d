// src/handlers/tracking.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::AppState,
    models::tracking::{StageTransition, StageType, TrackingTimeline, UpdateStageRequest},
};

// GET /api/shipments/{id}/tracking
#[utoipa::path(
    get,
    path = "/api/shipments/{id}/tracking",
    tag = "Tracking",
    params(
        ("id" = Uuid, Path, description = "ID do Embarque")
    ),
    responses(
        (status = 200, description = "Linha do tempo com ETA e progresso", body = TrackingTimeline),
        (status = 404, description = "Embarque não encontrado")
    )
)]
pub async fn get_tracking(
    State(app_state): State<AppState>,
    Path(shipment_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let timeline = app_state.tracking_service.timeline(shipment_id).await?;
    Ok((StatusCode::OK, Json(timeline)))
}

// POST /api/shipments/{id}/tracking
#[utoipa::path(
    post,
    path = "/api/shipments/{id}/tracking",
    tag = "Tracking",
    params(
        ("id" = Uuid, Path, description = "ID do Embarque")
    ),
    responses(
        (status = 201, description = "Etapas criadas (as existentes são mantidas)", body = TrackingTimeline),
        (status = 404, description = "Embarque não encontrado")
    )
)]
pub async fn initialize_tracking(
    State(app_state): State<AppState>,
    Path(shipment_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let timeline = app_state.tracking_service.initialize_stages(shipment_id).await?;
    Ok((StatusCode::CREATED, Json(timeline)))
}

// PATCH /api/shipments/{id}/stages/{stageType}
#[utoipa::path(
    patch,
    path = "/api/shipments/{id}/stages/{stageType}",
    tag = "Tracking",
    request_body = UpdateStageRequest,
    params(
        ("id" = Uuid, Path, description = "ID do Embarque"),
        ("stageType" = StageType, Path, description = "Etapa (ex: CUSTOMS_RELEASE ou customs-release)")
    ),
    responses(
        (status = 200, description = "Etapa atualizada", body = StageTransition),
        (status = 400, description = "Etapa desconhecida ou data futura"),
        (status = 404, description = "Embarque não encontrado")
    )
)]
pub async fn update_stage(
    State(app_state): State<AppState>,
    Path((shipment_id, stage)): Path<(Uuid, String)>,
    Json(payload): Json<UpdateStageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let stage_type: StageType = stage.parse().map_err(AppError::BadRequest)?;

    let transition = app_state
        .tracking_service
        .update_stage_status(shipment_id, stage_type, payload)
        .await?;

    Ok((StatusCode::OK, Json(transition)))
}
