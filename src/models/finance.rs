// src/models/finance.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Enums (Mapeando o Postgres) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "invoice_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,     // Rascunho
    Sent,      // Enviada ao cliente
    Paid,      // Quitada
    Cancelled, // Cancelada
}

impl InvoiceStatus {
    // Ainda aguardando pagamento (espelha o filtro do SQL)
    #[cfg(test)]
    pub fn is_collectable(&self) -> bool {
        matches!(self, InvoiceStatus::Draft | InvoiceStatus::Sent)
    }
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: Uuid,

    #[schema(example = "INV-2024-0042")]
    pub invoice_number: String,

    // Vínculos
    pub client_id: Option<Uuid>,
    pub shipment_id: Option<Uuid>,

    pub status: InvoiceStatus,

    // Valores
    #[schema(example = "1500.00")]
    pub total_amount: Decimal,
    #[schema(example = "USD")]
    pub currency: String,

    #[schema(value_type = String, format = Date, example = "2024-12-31")]
    pub due_date: NaiveDate,

    pub created_at: DateTime<Utc>,
}
