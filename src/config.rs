// src/config.rs

use std::{env, sync::Arc, time::Duration};

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::{CrmRepository, FinanceRepository, NotificationRepository, TaskRepository, TrackingRepository, WhatsAppRepository},
    services::{
        notification_service::NotificationService,
        reminder_service::{ReminderConfig, ReminderService},
        tracking_service::TrackingService,
        whatsapp_service::{WhatsAppClient, WhatsAppConfig},
    },
};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub cron_secret: Option<String>,
    pub whatsapp_config: WhatsAppConfig,
    pub whatsapp: Arc<WhatsAppClient>,
    pub reminder_service: ReminderService,
    pub tracking_service: TrackingService,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL deve ser definida"))?;
        let cron_secret = env::var("CRON_SECRET").ok().filter(|s| !s.trim().is_empty());
        let whatsapp_config = WhatsAppConfig::from_env()?;
        let reminder_config = ReminderConfig::from_env()?;

        let db_pool = PgPoolOptions::new()
            // Varreduras concorrentes + API
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        // --- Monta o gráfico de dependências ---
        let tracking_repo = Arc::new(TrackingRepository::new(db_pool.clone()));
        let task_repo = Arc::new(TaskRepository::new(db_pool.clone()));
        let finance_repo = Arc::new(FinanceRepository::new(db_pool.clone()));
        let notification_repo = Arc::new(NotificationRepository::new(db_pool.clone()));
        let crm_repo = Arc::new(CrmRepository::new(db_pool.clone()));
        let whatsapp_repo = Arc::new(WhatsAppRepository::new(db_pool.clone()));

        let whatsapp = Arc::new(WhatsAppClient::new(whatsapp_config.clone(), whatsapp_repo)?);

        let notification_service =
            NotificationService::with_default_channels(notification_repo, whatsapp.clone(), crm_repo);
        let reminder_service = ReminderService::new(
            task_repo,
            tracking_repo.clone(),
            finance_repo,
            notification_service.clone(),
            reminder_config,
        );
        let tracking_service = TrackingService::new(tracking_repo, notification_service);

        if cron_secret.is_none() {
            tracing::warn!("⚠️ CRON_SECRET não definido: /api/cron/reminders ficará fechado.");
        }

        Ok(Self {
            db_pool,
            cron_secret,
            whatsapp_config,
            whatsapp,
            reminder_service,
            tracking_service,
        })
    }
}

#[cfg(test)]
impl AppState {
    /// Estado completo sobre o repositório em memória. O pool é preguiçoso e
    /// nunca chega a conectar.
    pub fn for_tests(
        store: Arc<crate::db::memory::InMemoryStore>,
        whatsapp_config: WhatsAppConfig,
        cron_secret: Option<&str>,
    ) -> Self {
        let db_pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .expect("URL de teste válida");
        let whatsapp = Arc::new(WhatsAppClient::new(whatsapp_config.clone(), store.clone()).expect("cliente http"));
        let notification_service =
            NotificationService::with_default_channels(store.clone(), whatsapp.clone(), store.clone());

        Self {
            db_pool,
            cron_secret: cron_secret.map(String::from),
            whatsapp_config,
            whatsapp,
            reminder_service: ReminderService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                notification_service.clone(),
                ReminderConfig::default(),
            ),
            tracking_service: TrackingService::new(store, notification_service),
        }
    }
}
