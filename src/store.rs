//! Extraction record store

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

pub use memory::MemoryStore;

use crate::{
    errors::MoonExtractionsError,
    models::{
        ExtractionFilter, ExtractionRecord, ExtractionStatistics, ExtractionStatus, NewExtraction,
        Page, PageRequest,
    },
};

/// Durable storage and query surface for extraction records.
///
/// Rows are unique per `(structure_id, extraction_start_time)` and at most
/// one non-terminal row exists per structure. Implementations must make
/// `upsert` atomic: no reader observes a partially merged row.
#[async_trait]
pub trait ExtractionStore: Send + Sync {
    /// Insert or merge the extraction.
    ///
    /// Any other non-terminal row of the same structure is retired first:
    /// to `completed` when its natural decay is at or before `now`,
    /// otherwise to `cancelled`. An existing `cancelled` row keeps its
    /// status.
    async fn upsert(
        &self,
        extraction: &NewExtraction,
        now: DateTime<Utc>,
    ) -> Result<ExtractionRecord, MoonExtractionsError>;

    /// Latest extraction of a structure by chunk arrival time
    async fn find_by_structure(
        &self,
        structure_id: i64,
    ) -> Result<Option<ExtractionRecord>, MoonExtractionsError>;

    /// Filtered page ordered by chunk arrival time ascending
    async fn query(
        &self,
        filter: &ExtractionFilter,
        page: PageRequest,
    ) -> Result<Page<ExtractionRecord>, MoonExtractionsError>;

    /// Mark non-terminal rows of a corporation completed when their natural
    /// decay time is before `before`. Returns the number of rows updated.
    async fn sweep_stale(
        &self,
        corporation_id: i64,
        before: DateTime<Utc>,
    ) -> Result<u64, MoonExtractionsError>;

    /// Aggregate counts over filtered rows; `window` bounds the upcoming count
    async fn aggregate(
        &self,
        filter: &ExtractionFilter,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<ExtractionStatistics, MoonExtractionsError>;
}

/// Status a superseded non-terminal row is retired to
pub(crate) fn retired_status(
    natural_decay_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ExtractionStatus {
    if natural_decay_time <= now {
        ExtractionStatus::Completed
    } else {
        ExtractionStatus::Cancelled
    }
}
