//! Builds the lookup pipeline from a loaded [`Config`].

use std::sync::Arc;

use log::{info, warn};

use crate::acquisition::{
    AcquisitionOrchestrator, RecordCache, RetryExecutor, SourceRateLimiter,
};
use crate::cache_store::{default_cache_db_path, SqliteCacheStore};
use crate::config::{CacheConfig, Config, RemoteSourceConfig};
use crate::error::BootstrapError;
use crate::matching::{OverrideTable, TitleResolver};
use crate::protocol::SourceKind;
use crate::sources::{CuratedSource, ScrapedSource, StructuredSource};

fn remote_limiter(kind: SourceKind, source: &RemoteSourceConfig) -> Arc<SourceRateLimiter> {
    Arc::new(SourceRateLimiter::new(
        kind.source_name(),
        source.rate_limit_capacity,
        source.rate_limit_window(),
    ))
}

/// A persistent cache when configured and openable, else an in-memory one.
pub fn build_cache(config: &CacheConfig) -> RecordCache {
    let settings = config.settings();
    if !config.persist || !config.enabled {
        return RecordCache::new(settings);
    }
    let Some(path) = config.database_path().or_else(default_cache_db_path) else {
        warn!("Cache: no data directory available. Using an in-memory cache");
        return RecordCache::new(settings);
    };
    let opened = SqliteCacheStore::open(&path)
        .and_then(|store| RecordCache::with_store(settings, Arc::new(store)));
    match opened {
        Ok(cache) => {
            info!(
                "Cache: opened {} with {} entries",
                path.display(),
                cache.len()
            );
            cache
        }
        Err(err) => {
            warn!(
                "Cache: failed to open {} ({}). Using an in-memory cache",
                path.display(),
                err
            );
            RecordCache::new(settings)
        }
    }
}

/// Sources are consulted structured, then scraped, then curated.
pub fn build_orchestrator_with_cache(
    config: &Config,
    cache: RecordCache,
) -> Result<AcquisitionOrchestrator, BootstrapError> {
    let overrides = OverrideTable::load(config.matching.overrides_path().as_deref())?;
    info!("Matching: {} override entries", overrides.len());
    let resolver = TitleResolver::new(Arc::new(overrides), config.matching.thresholds());
    let settings = config.orchestrator.settings();
    let mut orchestrator = AcquisitionOrchestrator::new(
        Arc::new(resolver),
        Arc::new(cache),
        RetryExecutor::new(config.retry.policy()),
        settings,
    );

    let structured = &config.sources.structured;
    if structured.enabled {
        orchestrator.push_source(
            Arc::new(StructuredSource::new(
                structured.base_url.clone(),
                structured.page_size as usize,
                settings.per_source_timeout,
            )),
            Some(remote_limiter(SourceKind::Structured, structured)),
        );
    }
    let scraped = &config.sources.scraped;
    if scraped.enabled {
        orchestrator.push_source(
            Arc::new(ScrapedSource::new(
                scraped.base_url.clone(),
                settings.per_source_timeout,
            )),
            Some(remote_limiter(SourceKind::Scraped, scraped)),
        );
    }
    let curated = &config.sources.curated;
    if curated.enabled {
        let source =
            CuratedSource::load(curated.dataset_path().as_deref(), curated.min_confidence)?;
        orchestrator.push_source(Arc::new(source), None);
    }

    if orchestrator.source_kinds().is_empty() {
        warn!("Every catalog source is disabled. Lookups will report no data");
    }
    Ok(orchestrator)
}

pub fn build_orchestrator(config: &Config) -> Result<AcquisitionOrchestrator, BootstrapError> {
    build_orchestrator_with_cache(config, build_cache(&config.cache))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::LookupFailure;

    fn offline_config() -> Config {
        let mut config = Config::default();
        config.cache.persist = false;
        config.sources.structured.enabled = false;
        config.sources.scraped.enabled = false;
        config
    }

    #[test]
    fn test_source_order_follows_config() {
        let mut config = Config::default();
        config.cache.persist = false;
        let orchestrator = build_orchestrator(&config).expect("pipeline should build");
        assert_eq!(
            orchestrator.source_kinds(),
            vec![SourceKind::Structured, SourceKind::Scraped, SourceKind::Curated]
        );

        config.sources.scraped.enabled = false;
        let orchestrator = build_orchestrator(&config).expect("pipeline should build");
        assert_eq!(
            orchestrator.source_kinds(),
            vec![SourceKind::Structured, SourceKind::Curated]
        );
    }

    #[test]
    fn test_persistent_cache_falls_back_when_path_is_unusable() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").expect("blocker file should be written");
        let config = CacheConfig {
            database_path: blocker.join("cache.db").display().to_string(),
            ..CacheConfig::default()
        };
        let cache = build_cache(&config);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_missing_dataset_is_a_bootstrap_error() {
        let mut config = offline_config();
        config.sources.curated.dataset_path = "/nonexistent/titlelink/catalog.json".to_string();
        assert!(matches!(
            build_orchestrator(&config),
            Err(BootstrapError::Dataset(_))
        ));
    }

    #[tokio::test]
    async fn test_offline_pipeline_resolves_from_curated_dataset() {
        let orchestrator = build_orchestrator(&offline_config()).expect("pipeline should build");
        let outcome = orchestrator
            .resolve_entity("Hollow Knight", None)
            .await
            .expect("name should validate");
        assert!(outcome.found);
        assert_eq!(outcome.source, Some(SourceKind::Curated));

        let missing = orchestrator
            .resolve_entity("Zz Unknowable Title Qq", None)
            .await
            .expect("name should validate");
        assert_eq!(missing.failure, Some(LookupFailure::NoData));
    }
}
