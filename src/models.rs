//! Data models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::MoonExtractionsError;

pub const UNKNOWN_STRUCTURE: &str = "Unknown Structure";
pub const UNKNOWN_SYSTEM: &str = "Unknown System";
pub const UNKNOWN_REGION: &str = "Unknown Region";

/// Lifecycle state of an extraction
///
/// `Scheduled` and `Active` are the non-terminal states. `Cancelled` is
/// never derived from the timers, only set when an extraction is
/// superseded before its chunk decays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    Scheduled,
    Active,
    Completed,
    Cancelled,
}

impl ExtractionStatus {
    /// Derive status from the extraction timers at instant `now`.
    ///
    /// - before chunk arrival (laser running or not yet started): scheduled
    /// - between chunk arrival and natural decay: active
    /// - at or after natural decay: completed
    pub fn derive(
        now: DateTime<Utc>,
        chunk_arrival_time: DateTime<Utc>,
        natural_decay_time: DateTime<Utc>,
    ) -> Self {
        if now < chunk_arrival_time {
            ExtractionStatus::Scheduled
        } else if now < natural_decay_time {
            ExtractionStatus::Active
        } else {
            ExtractionStatus::Completed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStatus::Scheduled => "scheduled",
            ExtractionStatus::Active => "active",
            ExtractionStatus::Completed => "completed",
            ExtractionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExtractionStatus::Completed | ExtractionStatus::Cancelled
        )
    }
}

impl fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionStatus {
    type Err = MoonExtractionsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(ExtractionStatus::Scheduled),
            "active" => Ok(ExtractionStatus::Active),
            "completed" => Ok(ExtractionStatus::Completed),
            "cancelled" => Ok(ExtractionStatus::Cancelled),
            _ => Err(MoonExtractionsError::InvalidStatus(value.to_string())),
        }
    }
}

/// One ore in a moon's composition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoonMaterial {
    pub material: String,
    /// Volume per unit in m3
    pub volume: f64,
    /// Share of the moon's composition, 0..1
    pub rate: f64,
}

/// Extraction timer as reported by the external API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawExtraction {
    pub structure_id: i64,
    pub moon_id: Option<i64>,
    pub extraction_start_time: DateTime<Utc>,
    pub chunk_arrival_time: DateTime<Utc>,
    pub natural_decay_time: DateTime<Utc>,
}

impl RawExtraction {
    /// Check `extraction_start_time <= chunk_arrival_time <= natural_decay_time`
    pub fn validate(&self) -> Result<(), MoonExtractionsError> {
        if self.extraction_start_time <= self.chunk_arrival_time
            && self.chunk_arrival_time <= self.natural_decay_time
        {
            Ok(())
        } else {
            Err(MoonExtractionsError::InvalidTimers {
                structure_id: self.structure_id,
            })
        }
    }
}

/// Composed extraction, ready to be upserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewExtraction {
    pub structure_id: i64,
    pub structure_name: String,
    pub corporation_id: i64,
    pub corporation_name: String,
    pub system_id: Option<i64>,
    pub system_name: String,
    pub region_id: Option<i64>,
    pub region_name: String,
    pub moon_id: Option<i64>,
    pub extraction_start_time: DateTime<Utc>,
    pub chunk_arrival_time: DateTime<Utc>,
    pub natural_decay_time: DateTime<Utc>,
    pub moon_materials: Option<Vec<MoonMaterial>>,
    pub moon_value: Option<f64>,
    pub status: ExtractionStatus,
}

/// Stored extraction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionRecord {
    pub id: i64,
    pub structure_id: i64,
    pub structure_name: String,
    pub corporation_id: i64,
    pub corporation_name: String,
    pub system_id: Option<i64>,
    pub system_name: String,
    pub region_id: Option<i64>,
    pub region_name: String,
    pub moon_id: Option<i64>,
    pub extraction_start_time: DateTime<Utc>,
    pub chunk_arrival_time: DateTime<Utc>,
    pub natural_decay_time: DateTime<Utc>,
    pub moon_materials: Option<Vec<MoonMaterial>>,
    pub moon_value: Option<f64>,
    pub status: ExtractionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExtractionRecord {
    /// Chunk is available: arrived, not yet decayed, not cancelled
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status != ExtractionStatus::Cancelled
            && self.chunk_arrival_time <= now
            && now < self.natural_decay_time
    }

    /// Seconds until chunk arrival, zero once arrived
    pub fn seconds_to_arrival(&self, now: DateTime<Utc>) -> i64 {
        (self.chunk_arrival_time - now).num_seconds().max(0)
    }
}

/// Inclusive time window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window of `length` starting at `start`
    pub fn starting_at(start: DateTime<Utc>, length: Duration) -> Self {
        Self {
            start,
            end: start + length,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// Query filters over stored extractions. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionFilter {
    pub corporation_id: Option<i64>,
    pub system_id: Option<i64>,
    pub region_id: Option<i64>,
    pub status: Option<ExtractionStatus>,
    /// Chunk arrival within the window
    pub arrival_window: Option<TimeRange>,
    /// Chunk arrival at or after this instant
    pub arriving_after: Option<DateTime<Utc>>,
}

impl ExtractionFilter {
    pub fn for_corporation(corporation_id: i64) -> Self {
        Self {
            corporation_id: Some(corporation_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &ExtractionRecord) -> bool {
        self.corporation_id
            .map_or(true, |id| record.corporation_id == id)
            && self.system_id.map_or(true, |id| record.system_id == Some(id))
            && self.region_id.map_or(true, |id| record.region_id == Some(id))
            && self.status.map_or(true, |status| record.status == status)
            && self
                .arrival_window
                .map_or(true, |window| window.contains(record.chunk_arrival_time))
            && self
                .arriving_after
                .map_or(true, |after| record.chunk_arrival_time >= after)
    }
}

/// Requested page, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    /// Build a page request, clamping `per_page` to `1..=max_per_page`
    pub fn new(page: u32, per_page: u32, max_per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, max_per_page.max(1)),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }
}

/// One page of results together with the total match count
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub request: PageRequest,
}

impl<T> Page<T> {
    pub fn last_page(&self) -> u64 {
        self.total.div_ceil(u64::from(self.request.per_page)).max(1)
    }

    /// 1-based position of the first item on this page
    pub fn from(&self) -> Option<u64> {
        (!self.items.is_empty()).then(|| self.request.offset() + 1)
    }

    /// 1-based position of the last item on this page
    pub fn to(&self) -> Option<u64> {
        (!self.items.is_empty()).then(|| self.request.offset() + self.items.len() as u64)
    }
}

/// Aggregate counts over a filtered set of extractions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionStatistics {
    pub total_extractions: u64,
    pub active_extractions: u64,
    pub completed_extractions: u64,
    pub cancelled_extractions: u64,
    pub upcoming: u64,
    /// Sum of known values over non-terminal extractions, `None` when no
    /// such extraction has a value
    pub total_estimated_value: Option<f64>,
}

impl ExtractionStatistics {
    /// Compute statistics from already filtered records
    pub fn from_records<'a, I>(records: I, now: DateTime<Utc>, window: Duration) -> Self
    where
        I: IntoIterator<Item = &'a ExtractionRecord>,
    {
        let upcoming_window = TimeRange::starting_at(now, window);
        let mut stats = ExtractionStatistics {
            total_extractions: 0,
            active_extractions: 0,
            completed_extractions: 0,
            cancelled_extractions: 0,
            upcoming: 0,
            total_estimated_value: None,
        };

        for record in records {
            stats.total_extractions += 1;
            if record.is_active_at(now) {
                stats.active_extractions += 1;
            }
            match record.status {
                ExtractionStatus::Completed => stats.completed_extractions += 1,
                ExtractionStatus::Cancelled => stats.cancelled_extractions += 1,
                _ => {}
            }
            if record.status != ExtractionStatus::Cancelled
                && upcoming_window.contains(record.chunk_arrival_time)
            {
                stats.upcoming += 1;
            }
            if let (false, Some(value)) = (record.status.is_terminal(), record.moon_value) {
                *stats.total_estimated_value.get_or_insert(0.0) += value;
            }
        }

        stats
    }
}
