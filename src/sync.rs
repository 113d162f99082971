//! Synchronization of one corporation's extraction timers

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::{
    errors::MoonExtractionsError,
    host::{
        CorporationDirectory, Credential, ExtractionSource, MoonLookup, MoonValuation,
        StructureLookup, UniverseLookup,
    },
    models::{
        ExtractionStatus, MoonMaterial, NewExtraction, RawExtraction, UNKNOWN_REGION,
        UNKNOWN_STRUCTURE, UNKNOWN_SYSTEM,
    },
    store::ExtractionStore,
};

/// Host services a sync run depends on
#[derive(Clone)]
pub struct Collaborators {
    pub corporations: Arc<dyn CorporationDirectory>,
    pub source: Arc<dyn ExtractionSource>,
    pub structures: Arc<dyn StructureLookup>,
    pub universe: Arc<dyn UniverseLookup>,
    pub moons: Arc<dyn MoonLookup>,
    pub valuation: Arc<dyn MoonValuation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed,
    /// Corporation not known to the host, nothing was touched
    UnknownCorporation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub corporation_id: i64,
    pub outcome: SyncOutcome,
    pub fetched: usize,
    pub upserted: usize,
    pub skipped: usize,
    pub swept: u64,
}

impl SyncReport {
    fn new(corporation_id: i64, outcome: SyncOutcome) -> Self {
        Self {
            corporation_id,
            outcome,
            fetched: 0,
            upserted: 0,
            skipped: 0,
            swept: 0,
        }
    }
}

/// Denormalized location of a structure
#[derive(Debug, Clone, PartialEq)]
struct Location {
    structure_name: String,
    system_id: Option<i64>,
    system_name: String,
    region_id: Option<i64>,
    region_name: String,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            structure_name: UNKNOWN_STRUCTURE.to_string(),
            system_id: None,
            system_name: UNKNOWN_SYSTEM.to_string(),
            region_id: None,
            region_name: UNKNOWN_REGION.to_string(),
        }
    }
}

/// Reconciles extraction timers of a corporation into the store
#[derive(Clone)]
pub struct SyncJob {
    store: Arc<dyn ExtractionStore>,
    host: Collaborators,
}

impl SyncJob {
    pub fn new(store: Arc<dyn ExtractionStore>, host: Collaborators) -> Self {
        Self { store, host }
    }

    pub async fn run(
        &self,
        corporation_id: i64,
        credential: &Credential,
    ) -> Result<SyncReport, MoonExtractionsError> {
        self.run_at(corporation_id, credential, Utc::now()).await
    }

    /// One run with an explicit clock.
    ///
    /// Fails only when the corporation lookup or the fetch fails; in that
    /// case the store is untouched. Per-extraction failures are logged and
    /// counted as skipped.
    pub async fn run_at(
        &self,
        corporation_id: i64,
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> Result<SyncReport, MoonExtractionsError> {
        info!(corporation_id, "Starting moon extractions sync");

        let Some(corporation_name) = self
            .host
            .corporations
            .corporation_name(corporation_id)
            .await?
        else {
            warn!(corporation_id, "Corporation not found");
            return Ok(SyncReport::new(
                corporation_id,
                SyncOutcome::UnknownCorporation,
            ));
        };

        let extractions = self
            .host
            .source
            .fetch_extractions(corporation_id, credential)
            .await
            .inspect_err(|e| error!(corporation_id, error = %e, "Failed to fetch extractions"))?;

        let mut report = SyncReport::new(corporation_id, SyncOutcome::Completed);
        report.fetched = extractions.len();

        if extractions.is_empty() {
            warn!(corporation_id, "No extractions received");
        } else {
            info!(
                corporation_id,
                count = extractions.len(),
                "Retrieved extractions"
            );
        }

        for raw in &extractions {
            match self
                .process_extraction(raw, corporation_id, &corporation_name, now)
                .await
            {
                Ok(()) => report.upserted += 1,
                Err(e) => {
                    error!(
                        corporation_id,
                        structure_id = raw.structure_id,
                        error = %e,
                        "Failed to update moon extraction"
                    );
                    report.skipped += 1;
                }
            }
        }

        report.swept = self.store.sweep_stale(corporation_id, now).await?;
        if report.swept > 0 {
            info!(
                corporation_id,
                swept = report.swept,
                "Marked extractions as completed"
            );
        }

        info!(
            corporation_id,
            upserted = report.upserted,
            skipped = report.skipped,
            "Finished moon extractions sync"
        );

        Ok(report)
    }

    async fn process_extraction(
        &self,
        raw: &RawExtraction,
        corporation_id: i64,
        corporation_name: &str,
        now: DateTime<Utc>,
    ) -> Result<(), MoonExtractionsError> {
        raw.validate()?;

        let location = self.resolve_location(raw.structure_id).await;
        let (moon_materials, moon_value) = match raw.moon_id {
            Some(moon_id) => self.resolve_materials(moon_id).await,
            None => (None, None),
        };

        let extraction = NewExtraction {
            structure_id: raw.structure_id,
            structure_name: location.structure_name,
            corporation_id,
            corporation_name: corporation_name.to_string(),
            system_id: location.system_id,
            system_name: location.system_name,
            region_id: location.region_id,
            region_name: location.region_name,
            moon_id: raw.moon_id,
            extraction_start_time: raw.extraction_start_time,
            chunk_arrival_time: raw.chunk_arrival_time,
            natural_decay_time: raw.natural_decay_time,
            moon_materials,
            moon_value,
            status: ExtractionStatus::derive(now, raw.chunk_arrival_time, raw.natural_decay_time),
        };

        self.store.upsert(&extraction, now).await?;

        debug!(
            corporation_id,
            structure_id = raw.structure_id,
            status = %extraction.status,
            "Updated moon extraction"
        );
        Ok(())
    }

    async fn resolve_location(&self, structure_id: i64) -> Location {
        let mut location = Location::default();

        let structure = match self.host.structures.structure(structure_id).await {
            Ok(structure) => structure,
            Err(e) => {
                warn!(structure_id, error = %e, "Failed to get structure info");
                return location;
            }
        };
        location.structure_name = structure.name;

        let Some(system_id) = structure.system_id else {
            return location;
        };
        location.system_id = Some(system_id);

        let system = match self.host.universe.system(system_id).await {
            Ok(system) => system,
            Err(e) => {
                warn!(system_id, error = %e, "Failed to get system info");
                return location;
            }
        };
        location.system_name = system.name;
        location.region_id = Some(system.region_id);

        match self.host.universe.region(system.region_id).await {
            Ok(region) => location.region_name = region.name,
            Err(e) => warn!(region_id = system.region_id, error = %e, "Failed to get region info"),
        }

        location
    }

    async fn resolve_materials(&self, moon_id: i64) -> (Option<Vec<MoonMaterial>>, Option<f64>) {
        let materials = match self.host.moons.materials(moon_id).await {
            Ok(materials) => materials,
            Err(e) => {
                warn!(moon_id, error = %e, "Failed to get moon materials");
                return (None, None);
            }
        };

        let value = match self.host.valuation.estimate(&materials).await {
            Ok(value) => value,
            Err(e) => {
                warn!(moon_id, error = %e, "Failed to estimate moon value");
                None
            }
        };

        (Some(materials), value)
    }
}
