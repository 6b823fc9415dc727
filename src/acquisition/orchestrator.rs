//! Cache-first, multi-source lookup pipeline.
//!
//! One lookup walks the sources in their configured order and stops at the
//! first accepted match. Failures from a source never abort the lookup; they
//! only mean that source contributed nothing. Several lookups may run at once,
//! sharing the cache and the per-source limiters.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

use crate::acquisition::cache::{cache_key, RecordCache};
use crate::acquisition::rate_limit::SourceRateLimiter;
use crate::acquisition::retry::RetryExecutor;
use crate::error::{SourceError, ValidationError};
use crate::matching::TitleResolver;
use crate::protocol::{CandidateRecord, LookupFailure, Resolution, ResolveOutcome, SourceKind};
use crate::sources::CatalogSource;

pub const MAX_NAME_CHARS: usize = 512;
pub const MAX_STABLE_ID_CHARS: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Budget for one lookup across every source.
    pub overall_timeout: Duration,
    /// Upper bound for a single source, further limited by what is left overall.
    pub per_source_timeout: Duration,
    pub batch_concurrency: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            overall_timeout: Duration::from_secs(2),
            per_source_timeout: Duration::from_millis(1_500),
            batch_concurrency: 4,
        }
    }
}

/// One entry of a batch lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    pub name: String,
    pub stable_id: Option<String>,
}

impl ResolveRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stable_id: None,
        }
    }

    pub fn with_stable_id(mut self, stable_id: impl Into<String>) -> Self {
        self.stable_id = Some(stable_id.into());
        self
    }
}

struct SourceSlot {
    source: Arc<dyn CatalogSource>,
    limiter: Option<Arc<SourceRateLimiter>>,
}

/// Rejects names and ids before any cache or network work.
pub fn validate_request(name: &str, stable_id: Option<&str>) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    let len = name.chars().count();
    if len > MAX_NAME_CHARS {
        return Err(ValidationError::NameTooLong {
            len,
            max: MAX_NAME_CHARS,
        });
    }
    if name.chars().any(char::is_control) {
        return Err(ValidationError::ControlCharacters);
    }
    if let Some(id) = stable_id.map(str::trim).filter(|id| !id.is_empty()) {
        if id.chars().count() > MAX_STABLE_ID_CHARS
            || id.chars().any(|ch| ch.is_control() || ch.is_whitespace())
        {
            return Err(ValidationError::InvalidStableId(
                id.chars().take(32).collect(),
            ));
        }
    }
    Ok(())
}

pub struct AcquisitionOrchestrator {
    sources: Vec<SourceSlot>,
    resolver: Arc<TitleResolver>,
    cache: Arc<RecordCache>,
    retry: RetryExecutor,
    settings: OrchestratorSettings,
}

impl AcquisitionOrchestrator {
    pub fn new(
        resolver: Arc<TitleResolver>,
        cache: Arc<RecordCache>,
        retry: RetryExecutor,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            sources: Vec::new(),
            resolver,
            cache,
            retry,
            settings,
        }
    }

    /// Appends a source; sources are consulted in the order they were added.
    pub fn with_source(
        mut self,
        source: Arc<dyn CatalogSource>,
        limiter: Option<Arc<SourceRateLimiter>>,
    ) -> Self {
        self.push_source(source, limiter);
        self
    }

    pub fn push_source(
        &mut self,
        source: Arc<dyn CatalogSource>,
        limiter: Option<Arc<SourceRateLimiter>>,
    ) {
        self.sources.push(SourceSlot { source, limiter });
    }

    pub fn source_kinds(&self) -> Vec<SourceKind> {
        self.sources.iter().map(|slot| slot.source.kind()).collect()
    }

    pub fn cache(&self) -> &Arc<RecordCache> {
        &self.cache
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// The resolved record, or `None` when nothing matched.
    pub async fn resolve(
        &self,
        name: &str,
        stable_id: Option<&str>,
    ) -> Result<Option<CandidateRecord>, ValidationError> {
        Ok(self.resolve_entity(name, stable_id).await?.record)
    }

    pub async fn resolve_entity(
        &self,
        name: &str,
        stable_id: Option<&str>,
    ) -> Result<ResolveOutcome, ValidationError> {
        validate_request(name, stable_id)?;
        if let Some(reason) = self.resolver.skip_reason(name) {
            info!("Resolve[{}]: skipped before lookup ({})", name, reason);
            return Ok(ResolveOutcome::not_found(LookupFailure::Skipped));
        }
        let key = cache_key(name, stable_id);
        if let Some(record) = self.cache.get(&key) {
            debug!("Resolve[{}]: cache hit ({})", name, key);
            return Ok(ResolveOutcome::found(record, None, None, true));
        }

        let deadline = Instant::now() + self.settings.overall_timeout;
        let mut saw_failure = false;
        for slot in &self.sources {
            let kind = slot.source.kind();
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("Resolve[{}]: request budget exhausted before {}", name, kind);
                saw_failure = true;
                break;
            }
            let budget = remaining.min(self.settings.per_source_timeout);

            let source_deadline = Instant::now() + budget;
            let lookup = self.query_source(slot, name, source_deadline);
            let candidates = match tokio::time::timeout_at(source_deadline, lookup).await {
                Ok(Ok(candidates)) => candidates,
                Ok(Err(error)) => {
                    warn!("Resolve[{}]: {} failed: {}", name, kind, error);
                    saw_failure = true;
                    continue;
                }
                Err(_) => {
                    warn!("Resolve[{}]: {} timed out after {:?}", name, kind, budget);
                    saw_failure = true;
                    continue;
                }
            };
            if candidates.is_empty() {
                debug!("Resolve[{}]: {} returned no candidates", name, kind);
                continue;
            }

            match self.resolver.resolve(name, &candidates) {
                Resolution::Matched(resolved) => {
                    info!(
                        "Resolve[{}]: matched '{}' from {} via {:?} ({:.2})",
                        name,
                        resolved.candidate.display_name,
                        kind,
                        resolved.method,
                        resolved.confidence
                    );
                    self.cache.set(&key, resolved.candidate.clone());
                    return Ok(ResolveOutcome::found(
                        resolved.candidate,
                        Some(resolved.confidence),
                        Some(resolved.method),
                        false,
                    ));
                }
                Resolution::Skipped { reason } => {
                    info!("Resolve[{}]: skipped ({})", name, reason);
                    return Ok(ResolveOutcome::not_found(LookupFailure::Skipped));
                }
                Resolution::NotFound => {
                    debug!(
                        "Resolve[{}]: none of {} {} candidates matched",
                        name,
                        candidates.len(),
                        kind
                    );
                }
            }
        }

        let failure = if saw_failure {
            LookupFailure::Transient
        } else {
            LookupFailure::NoData
        };
        Ok(ResolveOutcome::not_found(failure))
    }

    async fn query_source(
        &self,
        slot: &SourceSlot,
        name: &str,
        deadline: Instant,
    ) -> Result<Vec<CandidateRecord>, SourceError> {
        self.retry
            .run_until(deadline, || {
                let source = Arc::clone(&slot.source);
                let limiter = slot.limiter.clone();
                let name = name.to_string();
                async move {
                    if let Some(limiter) = limiter {
                        limiter.admit().await;
                    }
                    let kind = source.kind();
                    tokio::task::spawn_blocking(move || source.query(&name))
                        .await
                        .unwrap_or_else(|join_error| {
                            Err(SourceError::Unavailable(format!(
                                "{kind} query task failed: {join_error}"
                            )))
                        })
                }
            })
            .await
    }

    /// Resolves every request with bounded concurrency; results keep input order.
    pub async fn resolve_batch(
        self: &Arc<Self>,
        requests: Vec<ResolveRequest>,
    ) -> Vec<Result<ResolveOutcome, ValidationError>> {
        let total = requests.len();
        let semaphore = Arc::new(Semaphore::new(self.settings.batch_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for (index, request) in requests.into_iter().enumerate() {
            let orchestrator = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = orchestrator
                    .resolve_entity(&request.name, request.stable_id.as_deref())
                    .await;
                (index, outcome)
            });
        }

        let mut results: Vec<Option<Result<ResolveOutcome, ValidationError>>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => results[index] = Some(outcome),
                Err(err) => warn!("Batch: lookup task failed: {}", err),
            }
        }
        results
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| Ok(ResolveOutcome::not_found(LookupFailure::Transient)))
            })
            .collect()
    }

    /// Periodically purges expired cache entries until the handle is aborted.
    pub fn spawn_cache_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        let period = period.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                let purged = cache.purge_expired();
                if purged > 0 {
                    info!("Cache: sweep removed {} expired entries", purged);
                }
            }
        })
    }
}
