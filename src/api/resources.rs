//! JSON representations returned by the read API

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{
    ExtractionRecord, ExtractionStatistics, ExtractionStatus, MoonMaterial, Page,
};

const CURRENCY: &str = "ISK";

#[derive(Debug, Serialize)]
pub struct Named {
    pub id: Option<i64>,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct Location {
    pub system: Named,
    pub region: Named,
}

#[derive(Debug, Serialize)]
pub struct ExtractionTimers {
    pub start_time: DateTime<Utc>,
    pub chunk_arrival_time: DateTime<Utc>,
    pub natural_decay_time: DateTime<Utc>,
    pub status: ExtractionStatus,
    pub is_active: bool,
    pub time_to_arrival_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct EstimatedValue {
    pub amount: Option<f64>,
    pub currency: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Timestamps {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ExtractionResource {
    pub id: i64,
    pub structure_id: i64,
    pub structure_name: String,
    pub corporation: Named,
    pub location: Location,
    pub extraction: ExtractionTimers,
    pub moon_materials: Option<Vec<MoonMaterial>>,
    pub estimated_value: EstimatedValue,
    pub timestamps: Timestamps,
}

impl ExtractionResource {
    pub fn new(record: ExtractionRecord, now: DateTime<Utc>) -> Self {
        let is_active = record.is_active_at(now);
        let time_to_arrival_seconds = record.seconds_to_arrival(now);

        Self {
            id: record.id,
            structure_id: record.structure_id,
            structure_name: record.structure_name,
            corporation: Named {
                id: Some(record.corporation_id),
                name: record.corporation_name,
            },
            location: Location {
                system: Named {
                    id: record.system_id,
                    name: record.system_name,
                },
                region: Named {
                    id: record.region_id,
                    name: record.region_name,
                },
            },
            extraction: ExtractionTimers {
                start_time: record.extraction_start_time,
                chunk_arrival_time: record.chunk_arrival_time,
                natural_decay_time: record.natural_decay_time,
                status: record.status,
                is_active,
                time_to_arrival_seconds,
            },
            moon_materials: record.moon_materials,
            estimated_value: EstimatedValue {
                amount: record.moon_value,
                currency: CURRENCY,
            },
            timestamps: Timestamps {
                created_at: record.created_at,
                updated_at: record.updated_at,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Links {
    #[serde(rename = "self")]
    pub self_link: String,
}

#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub count: usize,
    pub total: u64,
    pub current_page: u32,
    pub last_page: u64,
    pub from: Option<u64>,
    pub to: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ExtractionCollection {
    pub data: Vec<ExtractionResource>,
    pub links: Links,
    pub meta: PageMeta,
}

impl ExtractionCollection {
    pub fn new(page: Page<ExtractionRecord>, self_link: String, now: DateTime<Utc>) -> Self {
        let meta = PageMeta {
            count: page.items.len(),
            total: page.total,
            current_page: page.request.page,
            last_page: page.last_page(),
            from: page.from(),
            to: page.to(),
        };

        Self {
            data: page
                .items
                .into_iter()
                .map(|record| ExtractionResource::new(record, now))
                .collect(),
            links: Links { self_link },
            meta,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatisticsResource {
    pub total_extractions: u64,
    pub active_extractions: u64,
    pub completed_extractions: u64,
    pub cancelled_extractions: u64,
    pub upcoming_24h: u64,
    pub total_estimated_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corporation_id: Option<i64>,
}

impl StatisticsResource {
    pub fn new(stats: ExtractionStatistics, corporation_id: Option<i64>) -> Self {
        Self {
            total_extractions: stats.total_extractions,
            active_extractions: stats.active_extractions,
            completed_extractions: stats.completed_extractions,
            cancelled_extractions: stats.cancelled_extractions,
            upcoming_24h: stats.upcoming,
            total_estimated_value: stats.total_estimated_value,
            corporation_id,
        }
    }
}

/// `{"data": ...}` envelope
#[derive(Debug, Serialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}
