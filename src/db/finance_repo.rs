// src/db/finance_repo.rs

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;

use crate::{common::error::AppError, models::finance::Invoice};

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Faturas DRAFT/SENT vencidas (due_date < hoje) e com cliente vinculado.
    async fn find_overdue_invoices(&self, today: NaiveDate) -> Result<Vec<Invoice>, AppError>;
}

#[derive(Clone)]
pub struct FinanceRepository {
    pool: PgPool,
}

impl FinanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InvoiceStore for FinanceRepository {
    async fn find_overdue_invoices(&self, today: NaiveDate) -> Result<Vec<Invoice>, AppError> {
        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT
                id, invoice_number, client_id, shipment_id, status,
                total_amount, currency, due_date, created_at
            FROM invoices
            WHERE status IN ('DRAFT', 'SENT')
              AND due_date < $1
              AND client_id IS NOT NULL
            ORDER BY due_date ASC
            "#,
        )
            .bind(today)
            .fetch_all(&self.pool)
            .await?;

        Ok(invoices)
    }
}
