// src/models/crm.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// Só os campos de contato: o resto do cadastro não interessa aqui.

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserContact {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ClientContact {
    pub id: Uuid,
    pub name: String,
    // Número dedicado ao WhatsApp, quando o cliente informa
    pub whatsapp_number: Option<String>,
    pub phone: Option<String>,
}
