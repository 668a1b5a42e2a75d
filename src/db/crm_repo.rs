// src/db/crm_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::crm::{ClientContact, UserContact},
};

// Busca de contatos para o canal de mensagens
#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserContact>, AppError>;

    async fn find_client(&self, client_id: Uuid) -> Result<Option<ClientContact>, AppError>;
}

#[derive(Clone)]
pub struct CrmRepository {
    pool: PgPool,
}

impl CrmRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactStore for CrmRepository {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserContact>, AppError> {
        let user = sqlx::query_as::<_, UserContact>("SELECT id, name, phone FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn find_client(&self, client_id: Uuid) -> Result<Option<ClientContact>, AppError> {
        let client = sqlx::query_as::<_, ClientContact>(
            "SELECT id, name, whatsapp_number, phone FROM clients WHERE id = $1",
        )
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(client)
    }
}
