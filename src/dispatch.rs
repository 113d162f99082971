//! Sync trigger: eligibility, recency guard, rate limiting and retries

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::{sync::Mutex, task::JoinSet, time::Instant};
use tracing::{error, info, warn};

use crate::{
    config::SyncConfig,
    errors::MoonExtractionsError,
    host::{Credential, CredentialStore, ExtractionSource},
    models::RawExtraction,
    sync::{SyncJob, SyncReport},
};

/// Cache key guarding repeated runs for one corporation
pub fn recency_key(corporation_id: i64) -> String {
    format!("moon-extractions:sync:{corporation_id}")
}

#[async_trait]
pub trait RecencyCache: Send + Sync {
    async fn has(&self, key: &str) -> bool;

    async fn put(&self, key: &str, ttl: Duration);
}

/// In-process cache of keys with expiry
#[derive(Default)]
pub struct MemoryRecencyCache {
    entries: Mutex<HashMap<String, Instant>>,
}

impl MemoryRecencyCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecencyCache for MemoryRecencyCache {
    async fn has(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(expires_at) if *expires_at > Instant::now() => true,
            Some(_) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }

    async fn put(&self, key: &str, ttl: Duration) {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), Instant::now() + ttl);
    }
}

/// Extraction source that waits on a shared limiter before every fetch
pub struct RateLimitedSource {
    inner: Arc<dyn ExtractionSource>,
    limiter: DefaultDirectRateLimiter,
}

impl RateLimitedSource {
    pub fn new(inner: Arc<dyn ExtractionSource>, requests_per_minute: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(rate);
        Self {
            inner,
            limiter: RateLimiter::direct(quota),
        }
    }
}

#[async_trait]
impl ExtractionSource for RateLimitedSource {
    async fn fetch_extractions(
        &self,
        corporation_id: i64,
        credential: &Credential,
    ) -> Result<Vec<RawExtraction>, MoonExtractionsError> {
        self.limiter.until_ready().await;
        self.inner.fetch_extractions(corporation_id, credential).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchStatus {
    Synced(SyncReport),
    /// Skipped by the recency guard
    RecentlySynced,
    /// No valid credential with the required scope
    NoCredential,
    Failed { attempts: u32, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub corporation_id: i64,
    pub status: DispatchStatus,
}

/// Runs sync jobs for eligible corporations
pub struct Dispatcher {
    job: SyncJob,
    credentials: Arc<dyn CredentialStore>,
    cache: Arc<dyn RecencyCache>,
    config: SyncConfig,
}

impl Dispatcher {
    pub fn new(
        job: SyncJob,
        credentials: Arc<dyn CredentialStore>,
        cache: Arc<dyn RecencyCache>,
        config: SyncConfig,
    ) -> Self {
        Self {
            job,
            credentials,
            cache,
            config,
        }
    }

    /// Run one sync per eligible corporation, concurrently.
    ///
    /// With `corporation_id` only that corporation is considered. Without
    /// `force`, corporations synced within `interval` are skipped. Results
    /// are ordered by corporation id.
    pub async fn dispatch(
        &self,
        corporation_id: Option<i64>,
        force: bool,
    ) -> Result<Vec<DispatchResult>, MoonExtractionsError> {
        let scope = self.config.required_scope.as_str();
        let corporation_ids = match corporation_id {
            Some(id) => vec![id],
            None => self.credentials.eligible_corporations(scope).await?,
        };

        if corporation_ids.is_empty() {
            warn!("No corporations found with valid tokens for moon extractions");
            return Ok(Vec::new());
        }
        info!(count = corporation_ids.len(), "Dispatching corporations");

        let mut results = Vec::new();
        let mut runs = JoinSet::new();

        for corporation_id in corporation_ids {
            let key = recency_key(corporation_id);
            if !force && self.cache.has(&key).await {
                warn!(corporation_id, "Corporation was recently synced, skipping");
                results.push(DispatchResult {
                    corporation_id,
                    status: DispatchStatus::RecentlySynced,
                });
                continue;
            }

            let Some(credential) = self.credentials.credential_for(corporation_id, scope).await?
            else {
                warn!(corporation_id, scope, "No valid token with required scope");
                results.push(DispatchResult {
                    corporation_id,
                    status: DispatchStatus::NoCredential,
                });
                continue;
            };

            self.cache.put(&key, self.config.interval).await;

            let job = self.job.clone();
            let config = self.config.clone();
            runs.spawn(async move {
                let status = run_with_retry(&job, corporation_id, &credential, &config).await;
                DispatchResult {
                    corporation_id,
                    status,
                }
            });
        }

        while let Some(result) = runs.join_next().await {
            results.push(result?);
        }

        results.sort_by_key(|r| r.corporation_id);
        Ok(results)
    }

    /// Dispatch all eligible corporations every `interval`
    pub async fn run_periodically(&self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            ticker.tick().await;
            match self.dispatch(None, false).await {
                Ok(results) => {
                    let failed = results
                        .iter()
                        .filter(|r| matches!(r.status, DispatchStatus::Failed { .. }))
                        .count();
                    info!(total = results.len(), failed, "Scheduled sync finished");
                }
                Err(e) => error!(error = %e, "Scheduled sync failed"),
            }
        }
    }
}

/// Run the job with a timeout per attempt and linear backoff between attempts
async fn run_with_retry(
    job: &SyncJob,
    corporation_id: i64,
    credential: &Credential,
    config: &SyncConfig,
) -> DispatchStatus {
    let mut last_error = String::new();

    for attempt in 1..=config.max_attempts {
        match tokio::time::timeout(config.timeout, job.run(corporation_id, credential)).await {
            Ok(Ok(report)) => return DispatchStatus::Synced(report),
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => {
                last_error = MoonExtractionsError::Timeout {
                    corporation_id,
                    seconds: config.timeout.as_secs(),
                }
                .to_string()
            }
        }

        warn!(
            corporation_id,
            attempt,
            max_attempts = config.max_attempts,
            error = %last_error,
            "Sync attempt failed"
        );

        if attempt < config.max_attempts {
            tokio::time::sleep(config.retry_backoff * attempt).await;
        }
    }

    error!(
        corporation_id,
        attempts = config.max_attempts,
        error = %last_error,
        "Giving up on moon extractions sync"
    );

    DispatchStatus::Failed {
        attempts: config.max_attempts,
        error: last_error,
    }
}
