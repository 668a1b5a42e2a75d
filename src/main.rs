// src/main.rs

use axum::{
    handler::Handler,
    middleware as axum_middleware,
    routing::{get, patch, post},
    Router,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod middleware;
mod models;
mod services;

use crate::config::AppState;
use crate::docs::ApiDoc;
use crate::middleware::{cron_auth::cron_guard, webhook_signature::webhook_signature_guard};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    // Se a configuração falhar, a aplicação não deve iniciar.
    let app_state = AppState::new().await?;

    sqlx::migrate!().run(&app_state.db_pool).await?;
    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    let app = router(app_state);

    let addr = std::env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

fn router(app_state: AppState) -> Router {
    // Rastreio (rotas internas; autenticação fica no gateway da API)
    let tracking_routes = Router::new()
        .route(
            "/{id}/tracking",
            get(handlers::tracking::get_tracking).post(handlers::tracking::initialize_tracking),
        )
        .route("/{id}/stages/{stage_type}", patch(handlers::tracking::update_stage));

    // Disparo das varreduras pelo agendador externo
    let cron_routes = Router::new()
        .route("/reminders", post(handlers::jobs::run_reminders))
        .layer(axum_middleware::from_fn_with_state(app_state.clone(), cron_guard));

    // O handshake (GET) não é assinado; só o POST passa pelo HMAC
    let signed_status = handlers::webhooks::receive_status
        .layer(axum_middleware::from_fn_with_state(app_state.clone(), webhook_signature_guard));
    let webhook_routes = Router::new().route(
        "/whatsapp",
        get(handlers::webhooks::verify_subscription).post(signed_status),
    );

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/shipments", tracking_routes)
        .nest("/api/cron", cron_routes)
        .nest("/api/webhooks", webhook_routes)
        .with_state(app_state)
}
