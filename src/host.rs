//! Collaborators provided by the host installation.
//!
//! The sync job receives these as trait objects. Lookups are best-effort
//! and report [`LookupError`]; the job maps every failure to a sentinel.

use async_trait::async_trait;

use crate::{
    errors::{LookupError, MoonExtractionsError},
    models::{MoonMaterial, RawExtraction},
};

/// Authorization to call the external API on behalf of a corporation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub character_id: i64,
    pub corporation_id: i64,
    pub scope: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureInfo {
    pub name: String,
    pub system_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub system_id: i64,
    pub name: String,
    pub region_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionInfo {
    pub region_id: i64,
    pub name: String,
}

#[async_trait]
pub trait CorporationDirectory: Send + Sync {
    /// Display name of the corporation, `None` if unknown
    async fn corporation_name(
        &self,
        corporation_id: i64,
    ) -> Result<Option<String>, MoonExtractionsError>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Corporations holding at least one valid credential with `scope`
    async fn eligible_corporations(&self, scope: &str) -> Result<Vec<i64>, MoonExtractionsError>;

    /// A valid credential with `scope` for the corporation
    async fn credential_for(
        &self,
        corporation_id: i64,
        scope: &str,
    ) -> Result<Option<Credential>, MoonExtractionsError>;
}

/// Source of truth for extraction timers
#[async_trait]
pub trait ExtractionSource: Send + Sync {
    async fn fetch_extractions(
        &self,
        corporation_id: i64,
        credential: &Credential,
    ) -> Result<Vec<RawExtraction>, MoonExtractionsError>;
}

#[async_trait]
pub trait StructureLookup: Send + Sync {
    async fn structure(&self, structure_id: i64) -> Result<StructureInfo, LookupError>;
}

#[async_trait]
pub trait UniverseLookup: Send + Sync {
    async fn system(&self, system_id: i64) -> Result<SystemInfo, LookupError>;

    async fn region(&self, region_id: i64) -> Result<RegionInfo, LookupError>;
}

#[async_trait]
pub trait MoonLookup: Send + Sync {
    /// Ore composition of a moon
    async fn materials(&self, moon_id: i64) -> Result<Vec<MoonMaterial>, LookupError>;
}

/// Value estimate for a moon composition. `Ok(None)` means no price is known.
#[async_trait]
pub trait MoonValuation: Send + Sync {
    async fn estimate(&self, materials: &[MoonMaterial]) -> Result<Option<f64>, LookupError>;
}

/// Valuation used when no market data is wired in
#[derive(Debug, Default, Clone, Copy)]
pub struct Unpriced;

#[async_trait]
impl MoonValuation for Unpriced {
    async fn estimate(&self, _materials: &[MoonMaterial]) -> Result<Option<f64>, LookupError> {
        Ok(None)
    }
}
