// src/handlers/webhooks.rs

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::{common::error::AppError, config::AppState, services::whatsapp_service::parse_status_webhook};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: usize,
    pub updated: u64,
}

// GET /api/webhooks/whatsapp
#[utoipa::path(
    get,
    path = "/api/webhooks/whatsapp",
    tag = "Webhooks",
    params(VerifyParams),
    responses(
        (status = 200, description = "Assinatura confirmada: devolve o hub.challenge", body = String),
        (status = 403, description = "Token de verificação não confere")
    )
)]
pub async fn verify_subscription(
    State(app_state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Response {
    let expected = app_state.whatsapp_config.verify_token.as_deref();

    match (params.mode.as_deref(), params.verify_token.as_deref(), params.challenge) {
        (Some("subscribe"), Some(token), Some(challenge)) if Some(token) == expected => {
            tracing::info!("✅ Webhook do WhatsApp verificado");
            (StatusCode::OK, challenge).into_response()
        }
        _ => {
            tracing::warn!("Tentativa de verificação de webhook recusada");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

// POST /api/webhooks/whatsapp
#[utoipa::path(
    post,
    path = "/api/webhooks/whatsapp",
    tag = "Webhooks",
    request_body(content = Object, description = "Payload de status da Meta (entry[].changes[].value.statuses[])"),
    params(
        ("X-Hub-Signature-256" = String, Header, description = "sha256=<hex> do HMAC do corpo")
    ),
    responses(
        (status = 200, description = "Status aplicados", body = WebhookAck),
        (status = 401, description = "Assinatura inválida")
    )
)]
pub async fn receive_status(
    State(app_state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let updates = parse_status_webhook(&payload);

    let mut updated = 0;
    for update in &updates {
        updated += app_state.whatsapp.apply_delivery_status(update).await?;
    }

    Ok((StatusCode::OK, Json(WebhookAck { received: updates.len(), updated })))
}
