// src/services/stage_registry.rs

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};

use crate::models::tracking::{StageProgress, StageStatus, StageType, StageWindow, TrackingStage};

pub struct StageDefinition {
    pub stage_type: StageType,
    pub order: u8,
    pub estimated_hours: u32,
    pub name: &'static str,
    pub is_milestone: bool,
}

// Ciclo fixo do desembaraço, já em ordem (order 1..=11, sem buracos).
pub const STAGES: [StageDefinition; 11] = [
    StageDefinition { stage_type: StageType::VesselArrival, order: 1, estimated_hours: 0, name: "Vessel Arrival", is_milestone: true },
    StageDefinition { stage_type: StageType::DocumentsReceived, order: 2, estimated_hours: 24, name: "Documents Received", is_milestone: false },
    StageDefinition { stage_type: StageType::ManifestSubmitted, order: 3, estimated_hours: 24, name: "Manifest Submitted", is_milestone: false },
    StageDefinition { stage_type: StageType::CustomsDeclaration, order: 4, estimated_hours: 48, name: "Customs Declaration", is_milestone: true },
    StageDefinition { stage_type: StageType::DutyPayment, order: 5, estimated_hours: 24, name: "Duty Payment", is_milestone: false },
    StageDefinition { stage_type: StageType::Inspection, order: 6, estimated_hours: 48, name: "Inspection", is_milestone: false },
    StageDefinition { stage_type: StageType::CustomsRelease, order: 7, estimated_hours: 24, name: "Customs Release", is_milestone: true },
    StageDefinition { stage_type: StageType::PortClearance, order: 8, estimated_hours: 24, name: "Port Clearance", is_milestone: false },
    StageDefinition { stage_type: StageType::TransportArranged, order: 9, estimated_hours: 12, name: "Transport Arranged", is_milestone: false },
    StageDefinition { stage_type: StageType::InTransit, order: 10, estimated_hours: 48, name: "In Transit", is_milestone: false },
    StageDefinition { stage_type: StageType::Delivered, order: 11, estimated_hours: 0, name: "Delivered", is_milestone: true },
];

pub const TOTAL_STAGES: usize = STAGES.len();

fn index_of(stage_type: StageType) -> usize {
    match stage_type {
        StageType::VesselArrival => 0,
        StageType::DocumentsReceived => 1,
        StageType::ManifestSubmitted => 2,
        StageType::CustomsDeclaration => 3,
        StageType::DutyPayment => 4,
        StageType::Inspection => 5,
        StageType::CustomsRelease => 6,
        StageType::PortClearance => 7,
        StageType::TransportArranged => 8,
        StageType::InTransit => 9,
        StageType::Delivered => 10,
    }
}

pub fn definition(stage_type: StageType) -> &'static StageDefinition {
    &STAGES[index_of(stage_type)]
}

pub fn stage_order(stage_type: StageType) -> u8 {
    definition(stage_type).order
}

pub fn estimated_hours(stage_type: StageType) -> u32 {
    definition(stage_type).estimated_hours
}

pub fn stage_name(stage_type: StageType) -> &'static str {
    definition(stage_type).name
}

/// Marcos que justificam aviso ao cliente. Aqui só respondemos; quem notifica
/// é o chamador.
pub fn is_milestone(stage_type: StageType) -> bool {
    definition(stage_type).is_milestone
}

pub fn next_stage(current: StageType) -> Option<StageType> {
    STAGES.get(index_of(current) + 1).map(|def| def.stage_type)
}

/// Janelas encadeadas a partir da âncora: cada etapa começa onde a anterior
/// terminou. Etapas com 0h não avançam o cursor.
pub fn calculate_stage_windows(anchor: DateTime<Utc>) -> HashMap<StageType, StageWindow> {
    ordered_stage_windows(anchor).into_iter().collect()
}

pub fn ordered_stage_windows(anchor: DateTime<Utc>) -> Vec<(StageType, StageWindow)> {
    let mut cursor = anchor;
    STAGES
        .iter()
        .map(|def| {
            let start = cursor;
            let end = start + Duration::hours(i64::from(estimated_hours(def.stage_type)));
            cursor = end;
            (def.stage_type, StageWindow { start, end })
        })
        .collect()
}

/// Progresso sempre sobre as 11 etapas do registro. Linhas que não existem
/// contam como PENDING; SKIPPED conta como concluída.
pub fn progress(stages: &[TrackingStage]) -> StageProgress {
    let resolved: HashSet<StageType> = stages
        .iter()
        .filter(|s| s.status.is_resolved())
        .map(|s| s.stage_type)
        .collect();

    let completed = resolved.len();
    let percentage = (100.0 * completed as f64 / TOTAL_STAGES as f64).round() as u8;

    StageProgress { completed, total: TOTAL_STAGES, percentage }
}

/// Primeira etapa em andamento; sem nenhuma, a primeira ainda pendente.
pub fn current_stage(stages: &[TrackingStage]) -> Option<StageType> {
    let status_of = |t: StageType| {
        stages
            .iter()
            .find(|s| s.stage_type == t)
            .map(|s| s.status)
            .unwrap_or(StageStatus::Pending)
    };

    STAGES
        .iter()
        .map(|def| def.stage_type)
        .find(|t| status_of(*t) == StageStatus::InProgress)
        .or_else(|| {
            STAGES
                .iter()
                .map(|def| def.stage_type)
                .find(|t| status_of(*t) == StageStatus::Pending)
        })
}
