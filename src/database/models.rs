// src/database/models.rs
use chrono::{DateTime, Utc};
use sqlx::types::Json;

use crate::{
    errors::MoonExtractionsError,
    models::{ExtractionRecord, MoonMaterial},
};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ExtractionRow {
    id: i64,
    structure_id: i64,
    structure_name: String,
    corporation_id: i64,
    corporation_name: String,
    system_id: Option<i64>,
    system_name: String,
    region_id: Option<i64>,
    region_name: String,
    moon_id: Option<i64>,
    extraction_start_time: DateTime<Utc>,
    chunk_arrival_time: DateTime<Utc>,
    natural_decay_time: DateTime<Utc>,
    moon_materials: Option<Json<Vec<MoonMaterial>>>,
    moon_value: Option<f64>,
    status: String, // Stored as text, checked by constraint
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ExtractionRow> for ExtractionRecord {
    type Error = MoonExtractionsError;

    fn try_from(row: ExtractionRow) -> Result<Self, Self::Error> {
        Ok(ExtractionRecord {
            id: row.id,
            structure_id: row.structure_id,
            structure_name: row.structure_name,
            corporation_id: row.corporation_id,
            corporation_name: row.corporation_name,
            system_id: row.system_id,
            system_name: row.system_name,
            region_id: row.region_id,
            region_name: row.region_name,
            moon_id: row.moon_id,
            extraction_start_time: row.extraction_start_time,
            chunk_arrival_time: row.chunk_arrival_time,
            natural_decay_time: row.natural_decay_time,
            moon_materials: row.moon_materials.map(|Json(materials)| materials),
            moon_value: row.moon_value,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Statistics row computed in SQL
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct StatisticsRow {
    pub total_extractions: i64,
    pub active_extractions: i64,
    pub completed_extractions: i64,
    pub cancelled_extractions: i64,
    pub upcoming: i64,
    pub total_estimated_value: Option<f64>,
}
