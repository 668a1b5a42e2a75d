// src/middleware/cron_auth.rs

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::{common::error::AppError, config::AppState};

// Só o agendador externo pode disparar as varreduras
pub async fn cron_guard(
    State(app_state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Sem CRON_SECRET configurado a rota fica fechada
    let Some(expected) = app_state.cron_secret.as_deref() else {
        tracing::warn!("CRON_SECRET não definido: disparo recusado");
        return Err(AppError::Unauthorized);
    };

    match bearer {
        Some(TypedHeader(auth)) if auth.token() == expected => Ok(next.run(request).await),
        _ => Err(AppError::Unauthorized),
    }
}
