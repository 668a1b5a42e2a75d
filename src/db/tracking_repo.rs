// src/db/tracking_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::tracking::{Shipment, StageStatus, StageType, StalledStage, TrackingStage},
};

const STAGE_COLUMNS: &str = "id, shipment_id, stage_type, status, started_at, completed_at, estimated_at, created_at, updated_at";

#[async_trait]
pub trait TrackingStore: Send + Sync {
    async fn find_shipment(&self, shipment_id: Uuid) -> Result<Option<Shipment>, AppError>;

    async fn list_stages(&self, shipment_id: Uuid) -> Result<Vec<TrackingStage>, AppError>;

    /// Cria as etapas que faltam (PENDING). As existentes ficam intactas.
    async fn insert_missing_stages(
        &self,
        shipment_id: Uuid,
        stages: &[(StageType, DateTime<Utc>)],
    ) -> Result<u64, AppError>;

    async fn update_stage(
        &self,
        shipment_id: Uuid,
        stage_type: StageType,
        status: StageStatus,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Option<TrackingStage>, AppError>;

    /// Etapas IN_PROGRESS iniciadas antes do corte.
    async fn find_stalled_stages(&self, started_before: DateTime<Utc>) -> Result<Vec<StalledStage>, AppError>;
}

#[derive(Clone)]
pub struct TrackingRepository {
    pool: PgPool,
}

impl TrackingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrackingStore for TrackingRepository {
    async fn find_shipment(&self, shipment_id: Uuid) -> Result<Option<Shipment>, AppError> {
        let shipment = sqlx::query_as::<_, Shipment>(
            "SELECT id, reference, client_id, project_id, vessel_arrival_date, created_at FROM shipments WHERE id = $1",
        )
            .bind(shipment_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(shipment)
    }

    async fn list_stages(&self, shipment_id: Uuid) -> Result<Vec<TrackingStage>, AppError> {
        let stages = sqlx::query_as::<_, TrackingStage>(&format!(
            "SELECT {STAGE_COLUMNS} FROM tracking_stages WHERE shipment_id = $1"
        ))
            .bind(shipment_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(stages)
    }

    async fn insert_missing_stages(
        &self,
        shipment_id: Uuid,
        stages: &[(StageType, DateTime<Utc>)],
    ) -> Result<u64, AppError> {
        let stage_types: Vec<StageType> = stages.iter().map(|(t, _)| *t).collect();
        let estimates: Vec<DateTime<Utc>> = stages.iter().map(|(_, eta)| *eta).collect();

        // UNNEST insere tudo de uma vez; a UNIQUE (shipment_id, stage_type)
        // garante uma linha por etapa.
        let result = sqlx::query(
            r#"
            INSERT INTO tracking_stages (shipment_id, stage_type, status, estimated_at)
            SELECT $1, t.stage_type, 'PENDING', t.estimated_at
            FROM UNNEST($2::stage_type[], $3::timestamptz[]) AS t(stage_type, estimated_at)
            ON CONFLICT (shipment_id, stage_type) DO NOTHING
            "#,
        )
            .bind(shipment_id)
            .bind(&stage_types)
            .bind(&estimates)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn update_stage(
        &self,
        shipment_id: Uuid,
        stage_type: StageType,
        status: StageStatus,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Option<TrackingStage>, AppError> {
        let stage = sqlx::query_as::<_, TrackingStage>(&format!(
            r#"
            UPDATE tracking_stages
            SET status = $3, started_at = $4, completed_at = $5, updated_at = NOW()
            WHERE shipment_id = $1 AND stage_type = $2
            RETURNING {STAGE_COLUMNS}
            "#
        ))
            .bind(shipment_id)
            .bind(stage_type)
            .bind(status)
            .bind(started_at)
            .bind(completed_at)
            .fetch_optional(&self.pool)
            .await?;

        Ok(stage)
    }

    async fn find_stalled_stages(&self, started_before: DateTime<Utc>) -> Result<Vec<StalledStage>, AppError> {
        // Etapa → embarque → projeto → dono. Sem projeto, owner_user_id vem NULL.
        let stages = sqlx::query_as::<_, StalledStage>(
            r#"
            SELECT
                s.id, s.shipment_id, s.stage_type, s.status,
                s.started_at, s.completed_at, s.estimated_at, s.created_at, s.updated_at,
                sh.reference AS shipment_reference,
                p.owner_id AS owner_user_id
            FROM tracking_stages s
            JOIN shipments sh ON sh.id = s.shipment_id
            LEFT JOIN projects p ON p.id = sh.project_id
            WHERE s.status = 'IN_PROGRESS' AND s.started_at < $1
            ORDER BY s.started_at ASC
            "#,
        )
            .bind(started_before)
            .fetch_all(&self.pool)
            .await?;

        Ok(stages)
    }
}
