// src/store/memory.rs
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use super::{retired_status, ExtractionStore};
use crate::{
    errors::MoonExtractionsError,
    models::{
        ExtractionFilter, ExtractionRecord, ExtractionStatistics, ExtractionStatus, NewExtraction,
        Page, PageRequest,
    },
};

#[derive(Default)]
struct Inner {
    records: Vec<ExtractionRecord>,
    next_id: i64,
}

/// In-process store, all writes serialized by one lock
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored row in insertion order
    pub async fn records(&self) -> Vec<ExtractionRecord> {
        self.inner.read().await.records.clone()
    }

    /// Overwrite the status of every row of a structure
    pub async fn set_status(&self, structure_id: i64, status: ExtractionStatus) -> u64 {
        let mut inner = self.inner.write().await;
        let mut updated = 0;
        for record in inner
            .records
            .iter_mut()
            .filter(|r| r.structure_id == structure_id)
        {
            record.status = status;
            updated += 1;
        }
        updated
    }
}

#[async_trait]
impl ExtractionStore for MemoryStore {
    async fn upsert(
        &self,
        extraction: &NewExtraction,
        now: DateTime<Utc>,
    ) -> Result<ExtractionRecord, MoonExtractionsError> {
        let mut inner = self.inner.write().await;

        for record in inner.records.iter_mut().filter(|r| {
            r.structure_id == extraction.structure_id
                && r.extraction_start_time != extraction.extraction_start_time
                && !r.status.is_terminal()
        }) {
            record.status = retired_status(record.natural_decay_time, now);
            record.updated_at = now;
        }

        let existing = inner.records.iter_mut().find(|r| {
            r.structure_id == extraction.structure_id
                && r.extraction_start_time == extraction.extraction_start_time
        });

        if let Some(record) = existing {
            let status = if record.status == ExtractionStatus::Cancelled {
                ExtractionStatus::Cancelled
            } else {
                extraction.status
            };
            *record = build_record(record.id, extraction, status, record.created_at, now);
            return Ok(record.clone());
        }

        inner.next_id += 1;
        let record = build_record(inner.next_id, extraction, extraction.status, now, now);
        inner.records.push(record.clone());
        Ok(record)
    }

    async fn find_by_structure(
        &self,
        structure_id: i64,
    ) -> Result<Option<ExtractionRecord>, MoonExtractionsError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .filter(|r| r.structure_id == structure_id)
            .max_by_key(|r| (r.chunk_arrival_time, r.id))
            .cloned())
    }

    async fn query(
        &self,
        filter: &ExtractionFilter,
        page: PageRequest,
    ) -> Result<Page<ExtractionRecord>, MoonExtractionsError> {
        let inner = self.inner.read().await;
        let mut matching: Vec<&ExtractionRecord> =
            inner.records.iter().filter(|r| filter.matches(r)).collect();
        matching.sort_by_key(|r| (r.chunk_arrival_time, r.id));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(page.per_page as usize)
            .cloned()
            .collect();

        Ok(Page {
            items,
            total,
            request: page,
        })
    }

    async fn sweep_stale(
        &self,
        corporation_id: i64,
        before: DateTime<Utc>,
    ) -> Result<u64, MoonExtractionsError> {
        let mut inner = self.inner.write().await;
        let mut updated = 0;
        for record in inner.records.iter_mut().filter(|r| {
            r.corporation_id == corporation_id
                && r.natural_decay_time < before
                && !r.status.is_terminal()
        }) {
            record.status = ExtractionStatus::Completed;
            record.updated_at = before;
            updated += 1;
        }
        Ok(updated)
    }

    async fn aggregate(
        &self,
        filter: &ExtractionFilter,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<ExtractionStatistics, MoonExtractionsError> {
        let inner = self.inner.read().await;
        Ok(ExtractionStatistics::from_records(
            inner.records.iter().filter(|r| filter.matches(r)),
            now,
            window,
        ))
    }
}

fn build_record(
    id: i64,
    extraction: &NewExtraction,
    status: ExtractionStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
) -> ExtractionRecord {
    ExtractionRecord {
        id,
        structure_id: extraction.structure_id,
        structure_name: extraction.structure_name.clone(),
        corporation_id: extraction.corporation_id,
        corporation_name: extraction.corporation_name.clone(),
        system_id: extraction.system_id,
        system_name: extraction.system_name.clone(),
        region_id: extraction.region_id,
        region_name: extraction.region_name.clone(),
        moon_id: extraction.moon_id,
        extraction_start_time: extraction.extraction_start_time,
        chunk_arrival_time: extraction.chunk_arrival_time,
        natural_decay_time: extraction.natural_decay_time,
        moon_materials: extraction.moon_materials.clone(),
        moon_value: extraction.moon_value,
        status,
        created_at,
        updated_at,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn extraction(structure_id: i64, corporation_id: i64, start: DateTime<Utc>) -> NewExtraction {
        NewExtraction {
            structure_id,
            structure_name: format!("Structure {structure_id}"),
            corporation_id,
            corporation_name: "Test Corp".to_string(),
            system_id: Some(30_000_142),
            system_name: "Jita".to_string(),
            region_id: Some(10_000_002),
            region_name: "The Forge".to_string(),
            moon_id: None,
            extraction_start_time: start,
            chunk_arrival_time: start + Duration::days(4),
            natural_decay_time: start + Duration::days(6),
            moon_materials: None,
            moon_value: None,
            status: ExtractionStatus::Scheduled,
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent() -> Result<(), MoonExtractionsError> {
        let store = MemoryStore::new();
        let new = extraction(1, 10, t0());

        let first = store.upsert(&new, t0()).await?;
        let second = store.upsert(&new, t0()).await?;

        assert_eq!(first.id, second.id);
        assert_eq!(store.records().await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn upsert_retires_superseded_extraction() -> Result<(), MoonExtractionsError> {
        let store = MemoryStore::new();
        store.upsert(&extraction(1, 10, t0()), t0()).await?;

        // New cycle observed before the old chunk decayed
        let next = extraction(1, 10, t0() + Duration::days(2));
        store.upsert(&next, t0() + Duration::days(2)).await?;

        let records = store.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, ExtractionStatus::Cancelled);
        assert_eq!(records[1].status, ExtractionStatus::Scheduled);

        let latest = store.find_by_structure(1).await?.unwrap();
        assert_eq!(latest.extraction_start_time, next.extraction_start_time);
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_survives_upsert() -> Result<(), MoonExtractionsError> {
        let store = MemoryStore::new();
        let new = extraction(1, 10, t0());
        store.upsert(&new, t0()).await?;
        store.set_status(1, ExtractionStatus::Cancelled).await;

        let record = store.upsert(&new, t0()).await?;
        assert_eq!(record.status, ExtractionStatus::Cancelled);
        Ok(())
    }

    #[tokio::test]
    async fn sweep_touches_only_one_corporation() -> Result<(), MoonExtractionsError> {
        let store = MemoryStore::new();
        store.upsert(&extraction(1, 10, t0()), t0()).await?;
        store.upsert(&extraction(2, 20, t0()), t0()).await?;

        let swept = store.sweep_stale(10, t0() + Duration::days(7)).await?;
        assert_eq!(swept, 1);

        let records = store.records().await;
        assert_eq!(records[0].status, ExtractionStatus::Completed);
        assert_eq!(records[1].status, ExtractionStatus::Scheduled);

        // Terminal rows are not counted twice
        let swept = store.sweep_stale(10, t0() + Duration::days(8)).await?;
        assert_eq!(swept, 0);
        Ok(())
    }

    #[tokio::test]
    async fn query_pages_in_arrival_order() -> Result<(), MoonExtractionsError> {
        let store = MemoryStore::new();
        for i in (0..5).rev() {
            store
                .upsert(&extraction(i, 10, t0() + Duration::hours(i)), t0())
                .await?;
        }

        let page = store
            .query(&ExtractionFilter::default(), PageRequest::new(1, 2, 1000))
            .await?;
        assert_eq!(page.total, 5);
        assert_eq!(
            page.items.iter().map(|r| r.structure_id).collect::<Vec<_>>(),
            vec![0, 1]
        );

        let beyond = store
            .query(&ExtractionFilter::default(), PageRequest::new(9, 2, 1000))
            .await?;
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total, 5);
        assert_eq!(beyond.last_page(), 3);
        Ok(())
    }
}
