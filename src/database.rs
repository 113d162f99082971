// src/database.rs
mod models;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};

use crate::{
    config::DatabaseConfig,
    errors::MoonExtractionsError,
    models::{
        ExtractionFilter, ExtractionRecord, ExtractionStatistics, NewExtraction, Page,
        PageRequest,
    },
    store::ExtractionStore,
};
use models::{ExtractionRow, StatisticsRow};

const COLUMNS: &str = "id, structure_id, structure_name, corporation_id, corporation_name, \
    system_id, system_name, region_id, region_name, moon_id, extraction_start_time, \
    chunk_arrival_time, natural_decay_time, moon_materials, moon_value, status, \
    created_at, updated_at";

/// PostgreSQL backed extraction store
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Wrap an existing pool
    pub async fn new(pool: PgPool) -> Result<Self, MoonExtractionsError> {
        Ok(Self { pool })
    }

    /// Connect a new pool according to configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, MoonExtractionsError> {
        info!(
            max_connections = config.max_connections,
            "Connecting to database"
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| MoonExtractionsError::DatabaseConnectionError(e.to_string()))?;

        Self::new(pool).await
    }

    /// Apply pending migrations
    pub async fn migrate(&self) -> Result<(), MoonExtractionsError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Append `WHERE` clauses for the filter
fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &ExtractionFilter) {
    builder.push(" WHERE TRUE");
    if let Some(corporation_id) = filter.corporation_id {
        builder.push(" AND corporation_id = ").push_bind(corporation_id);
    }
    if let Some(system_id) = filter.system_id {
        builder.push(" AND system_id = ").push_bind(system_id);
    }
    if let Some(region_id) = filter.region_id {
        builder.push(" AND region_id = ").push_bind(region_id);
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(window) = filter.arrival_window {
        builder
            .push(" AND chunk_arrival_time BETWEEN ")
            .push_bind(window.start)
            .push(" AND ")
            .push_bind(window.end);
    }
    if let Some(after) = filter.arriving_after {
        builder.push(" AND chunk_arrival_time >= ").push_bind(after);
    }
}

#[async_trait]
impl ExtractionStore for Database {
    async fn upsert(
        &self,
        extraction: &NewExtraction,
        now: DateTime<Utc>,
    ) -> Result<ExtractionRecord, MoonExtractionsError> {
        let mut tx = self.pool.begin().await?;

        let retired = sqlx::query(
            "UPDATE moon_extractions
             SET status = CASE WHEN natural_decay_time <= $2 THEN 'completed' ELSE 'cancelled' END,
                 updated_at = $2
             WHERE structure_id = $1
               AND extraction_start_time <> $3
               AND status IN ('scheduled', 'active')",
        )
        .bind(extraction.structure_id)
        .bind(now)
        .bind(extraction.extraction_start_time)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if retired > 0 {
            info!(
                structure_id = extraction.structure_id,
                retired, "Retired superseded extractions"
            );
        }

        let row: ExtractionRow = sqlx::query_as(&format!(
            "INSERT INTO moon_extractions (
                structure_id, structure_name, corporation_id, corporation_name,
                system_id, system_name, region_id, region_name, moon_id,
                extraction_start_time, chunk_arrival_time, natural_decay_time,
                moon_materials, moon_value, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $16)
            ON CONFLICT (structure_id, extraction_start_time) DO UPDATE SET
                structure_name = EXCLUDED.structure_name,
                corporation_id = EXCLUDED.corporation_id,
                corporation_name = EXCLUDED.corporation_name,
                system_id = EXCLUDED.system_id,
                system_name = EXCLUDED.system_name,
                region_id = EXCLUDED.region_id,
                region_name = EXCLUDED.region_name,
                moon_id = EXCLUDED.moon_id,
                chunk_arrival_time = EXCLUDED.chunk_arrival_time,
                natural_decay_time = EXCLUDED.natural_decay_time,
                moon_materials = EXCLUDED.moon_materials,
                moon_value = EXCLUDED.moon_value,
                status = CASE
                    WHEN moon_extractions.status = 'cancelled' THEN 'cancelled'
                    ELSE EXCLUDED.status
                END,
                updated_at = EXCLUDED.updated_at
            RETURNING {COLUMNS}"
        ))
        .bind(extraction.structure_id)
        .bind(&extraction.structure_name)
        .bind(extraction.corporation_id)
        .bind(&extraction.corporation_name)
        .bind(extraction.system_id)
        .bind(&extraction.system_name)
        .bind(extraction.region_id)
        .bind(&extraction.region_name)
        .bind(extraction.moon_id)
        .bind(extraction.extraction_start_time)
        .bind(extraction.chunk_arrival_time)
        .bind(extraction.natural_decay_time)
        .bind(extraction.moon_materials.clone().map(Json))
        .bind(extraction.moon_value)
        .bind(extraction.status.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            structure_id = extraction.structure_id,
            status = %extraction.status,
            "Upserted extraction"
        );

        row.try_into()
    }

    async fn find_by_structure(
        &self,
        structure_id: i64,
    ) -> Result<Option<ExtractionRecord>, MoonExtractionsError> {
        let row: Option<ExtractionRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM moon_extractions
             WHERE structure_id = $1
             ORDER BY chunk_arrival_time DESC, id DESC
             LIMIT 1"
        ))
        .bind(structure_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ExtractionRecord::try_from).transpose()
    }

    async fn query(
        &self,
        filter: &ExtractionFilter,
        page: PageRequest,
    ) -> Result<Page<ExtractionRecord>, MoonExtractionsError> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM moon_extractions");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(format!("SELECT {COLUMNS} FROM moon_extractions"));
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY chunk_arrival_time ASC, id ASC LIMIT ")
            .push_bind(i64::from(page.per_page))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let items = select
            .build_query_as::<ExtractionRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(ExtractionRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or(0),
            request: page,
        })
    }

    async fn sweep_stale(
        &self,
        corporation_id: i64,
        before: DateTime<Utc>,
    ) -> Result<u64, MoonExtractionsError> {
        let result = sqlx::query(
            "UPDATE moon_extractions
             SET status = 'completed', updated_at = $2
             WHERE corporation_id = $1
               AND natural_decay_time < $2
               AND status NOT IN ('completed', 'cancelled')",
        )
        .bind(corporation_id)
        .bind(before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn aggregate(
        &self,
        filter: &ExtractionFilter,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<ExtractionStatistics, MoonExtractionsError> {
        let mut builder = QueryBuilder::new(
            "SELECT COUNT(*) AS total_extractions, \
             COUNT(*) FILTER (WHERE status <> 'cancelled' AND chunk_arrival_time <= ",
        );
        builder
            .push_bind(now)
            .push(" AND natural_decay_time > ")
            .push_bind(now)
            .push(") AS active_extractions, ")
            .push("COUNT(*) FILTER (WHERE status = 'completed') AS completed_extractions, ")
            .push("COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled_extractions, ")
            .push("COUNT(*) FILTER (WHERE status <> 'cancelled' AND chunk_arrival_time BETWEEN ")
            .push_bind(now)
            .push(" AND ")
            .push_bind(now + window)
            .push(") AS upcoming, ")
            .push("SUM(moon_value) FILTER (WHERE status IN ('scheduled', 'active')) AS total_estimated_value ")
            .push("FROM moon_extractions");
        push_filter(&mut builder, filter);

        let row: StatisticsRow = builder.build_query_as().fetch_one(&self.pool).await?;

        Ok(ExtractionStatistics {
            total_extractions: row.total_extractions.max(0) as u64,
            active_extractions: row.active_extractions.max(0) as u64,
            completed_extractions: row.completed_extractions.max(0) as u64,
            cancelled_extractions: row.cancelled_extractions.max(0) as u64,
            upcoming: row.upcoming.max(0) as u64,
            total_estimated_value: row.total_estimated_value,
        })
    }
}
