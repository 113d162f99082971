//! Host collaborators backed by the SeAT database.
//!
//! SeAT mirrors the game API into its own tables (corporations, tokens,
//! mining extractions, universe data). These adapters read them through the
//! same pool the extraction store uses.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::PgPool;

use crate::{
    errors::{LookupError, MoonExtractionsError},
    host::{
        CorporationDirectory, Credential, CredentialStore, ExtractionSource, MoonLookup,
        RegionInfo, StructureInfo, StructureLookup, SystemInfo, UniverseLookup,
    },
    models::{MoonMaterial, RawExtraction},
};

#[derive(Debug, sqlx::FromRow)]
struct ExtractionRow {
    structure_id: i64,
    moon_id: Option<i64>,
    extraction_start_time: NaiveDateTime, // SeAT stores UTC without zone
    chunk_arrival_time: NaiveDateTime,
    natural_decay_time: NaiveDateTime,
}

impl From<ExtractionRow> for RawExtraction {
    fn from(row: ExtractionRow) -> Self {
        RawExtraction {
            structure_id: row.structure_id,
            moon_id: row.moon_id,
            extraction_start_time: row.extraction_start_time.and_utc(),
            chunk_arrival_time: row.chunk_arrival_time.and_utc(),
            natural_decay_time: row.natural_decay_time.and_utc(),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MaterialRow {
    material: String,
    volume: f64,
    rate: f64,
}

/// All host collaborators over one SeAT database
#[derive(Clone)]
pub struct SeatHost {
    pool: PgPool,
}

impl SeatHost {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CorporationDirectory for SeatHost {
    async fn corporation_name(
        &self,
        corporation_id: i64,
    ) -> Result<Option<String>, MoonExtractionsError> {
        let name = sqlx::query_scalar("SELECT name FROM corporation_infos WHERE corporation_id = $1")
            .bind(corporation_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(name)
    }
}

#[async_trait]
impl CredentialStore for SeatHost {
    async fn eligible_corporations(&self, scope: &str) -> Result<Vec<i64>, MoonExtractionsError> {
        let ids = sqlx::query_scalar(
            "SELECT DISTINCT a.corporation_id
             FROM refresh_tokens t
             JOIN character_affiliations a ON a.character_id = t.character_id
             WHERE t.deleted_at IS NULL
               AND t.scopes::jsonb @> jsonb_build_array($1::text)
             ORDER BY a.corporation_id",
        )
        .bind(scope)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn credential_for(
        &self,
        corporation_id: i64,
        scope: &str,
    ) -> Result<Option<Credential>, MoonExtractionsError> {
        let character_id: Option<i64> = sqlx::query_scalar(
            "SELECT t.character_id
             FROM refresh_tokens t
             JOIN character_affiliations a ON a.character_id = t.character_id
             WHERE a.corporation_id = $1
               AND t.deleted_at IS NULL
               AND t.scopes::jsonb @> jsonb_build_array($2::text)
             ORDER BY t.character_id
             LIMIT 1",
        )
        .bind(corporation_id)
        .bind(scope)
        .fetch_optional(&self.pool)
        .await?;

        Ok(character_id.map(|character_id| Credential {
            character_id,
            corporation_id,
            scope: scope.to_string(),
        }))
    }
}

#[async_trait]
impl ExtractionSource for SeatHost {
    async fn fetch_extractions(
        &self,
        corporation_id: i64,
        _credential: &Credential,
    ) -> Result<Vec<RawExtraction>, MoonExtractionsError> {
        let rows: Vec<ExtractionRow> = sqlx::query_as(
            "SELECT structure_id, moon_id, extraction_start_time,
                    chunk_arrival_time, natural_decay_time
             FROM corporation_industry_mining_extractions
             WHERE corporation_id = $1
             ORDER BY chunk_arrival_time",
        )
        .bind(corporation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MoonExtractionsError::FetchError {
            corporation_id,
            message: e.to_string(),
        })?;

        Ok(rows.into_iter().map(RawExtraction::from).collect())
    }
}

#[async_trait]
impl StructureLookup for SeatHost {
    async fn structure(&self, structure_id: i64) -> Result<StructureInfo, LookupError> {
        let (name, system_id): (String, Option<i64>) = sqlx::query_as(
            "SELECT name, solar_system_id FROM universe_structures WHERE structure_id = $1",
        )
        .bind(structure_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(StructureInfo { name, system_id })
    }
}

#[async_trait]
impl UniverseLookup for SeatHost {
    async fn system(&self, system_id: i64) -> Result<SystemInfo, LookupError> {
        let (system_id, name, region_id): (i64, String, i64) = sqlx::query_as(
            "SELECT system_id, name, region_id FROM solar_systems WHERE system_id = $1",
        )
        .bind(system_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(SystemInfo {
            system_id,
            name,
            region_id,
        })
    }

    async fn region(&self, region_id: i64) -> Result<RegionInfo, LookupError> {
        let (region_id, name): (i64, String) =
            sqlx::query_as("SELECT region_id, name FROM regions WHERE region_id = $1")
                .bind(region_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(RegionInfo { region_id, name })
    }
}

#[async_trait]
impl MoonLookup for SeatHost {
    async fn materials(&self, moon_id: i64) -> Result<Vec<MoonMaterial>, LookupError> {
        let rows: Vec<MaterialRow> = sqlx::query_as(
            r#"SELECT t."typeName" AS material,
                      t.volume::float8 AS volume,
                      c.rate::float8 AS rate
               FROM universe_moon_contents c
               JOIN "invTypes" t ON t."typeID" = c.type_id
               WHERE c.moon_id = $1
               ORDER BY c.rate DESC"#,
        )
        .bind(moon_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Err(LookupError::NotFound);
        }

        Ok(rows
            .into_iter()
            .map(|row| MoonMaterial {
                material: row.material,
                volume: row.volume,
                rate: row.rate,
            })
            .collect())
    }
}
