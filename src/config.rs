//! Persistent configuration model and defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::acquisition::cache::CacheSettings;
use crate::acquisition::orchestrator::OrchestratorSettings;
use crate::acquisition::retry::RetryPolicy;
use crate::matching::MatchThresholds;
use crate::sources::curated::CuratedConfidence;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

/// Record cache behavior. Read once when the orchestrator is built.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl_days")]
    pub ttl_days: u32,
    #[serde(default = "default_cache_capacity")]
    pub capacity: u32,
    /// Recency credit, in minutes, that each cache hit earns against eviction.
    #[serde(default = "default_cache_hit_weight_minutes")]
    pub hit_weight_minutes: u32,
    #[serde(default = "default_cache_sweep_interval_minutes")]
    pub sweep_interval_minutes: u32,
    /// Persist entries to SQLite so they survive restarts.
    #[serde(default = "default_true")]
    pub persist: bool,
    /// Empty means the platform data directory.
    #[serde(default)]
    pub database_path: String,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct MatchingConfig {
    #[serde(default = "default_fuzzy_standard_threshold")]
    pub fuzzy_standard_threshold: f64,
    #[serde(default = "default_word_overlap_threshold")]
    pub word_overlap_threshold: f64,
    #[serde(default = "default_fuzzy_aggressive_threshold")]
    pub fuzzy_aggressive_threshold: f64,
    #[serde(default = "default_aggressive_penalty")]
    pub aggressive_penalty: f64,
    #[serde(default = "default_max_length_delta")]
    pub max_length_delta: f64,
    #[serde(default = "default_min_significant_word_chars")]
    pub min_significant_word_chars: u32,
    /// Extra override table layered over the bundled one. Empty means none.
    #[serde(default)]
    pub overrides_path: String,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub base_delay_ms: u32,
    #[serde(default = "default_retry_transient_delay_ms")]
    pub transient_delay_ms: u32,
    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u32,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_overall_timeout_ms")]
    pub overall_timeout_ms: u32,
    #[serde(default = "default_per_source_timeout_ms")]
    pub per_source_timeout_ms: u32,
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: u32,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SourcesConfig {
    #[serde(default = "default_structured_source")]
    pub structured: RemoteSourceConfig,
    #[serde(default = "default_scraped_source")]
    pub scraped: RemoteSourceConfig,
    #[serde(default)]
    pub curated: CuratedSourceConfig,
}

/// One remote catalog endpoint and its request budget.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RemoteSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub base_url: String,
    #[serde(default = "default_rate_limit_capacity")]
    pub rate_limit_capacity: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CuratedSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Replaces the bundled dataset when set.
    #[serde(default)]
    pub dataset_path: String,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: CuratedConfidence,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_days: default_cache_ttl_days(),
            capacity: default_cache_capacity(),
            hit_weight_minutes: default_cache_hit_weight_minutes(),
            sweep_interval_minutes: default_cache_sweep_interval_minutes(),
            persist: true,
            database_path: String::new(),
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            fuzzy_standard_threshold: default_fuzzy_standard_threshold(),
            word_overlap_threshold: default_word_overlap_threshold(),
            fuzzy_aggressive_threshold: default_fuzzy_aggressive_threshold(),
            aggressive_penalty: default_aggressive_penalty(),
            max_length_delta: default_max_length_delta(),
            min_significant_word_chars: default_min_significant_word_chars(),
            overrides_path: String::new(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            base_delay_ms: default_retry_base_delay_ms(),
            transient_delay_ms: default_retry_transient_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            overall_timeout_ms: default_overall_timeout_ms(),
            per_source_timeout_ms: default_per_source_timeout_ms(),
            batch_concurrency: default_batch_concurrency(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            structured: default_structured_source(),
            scraped: default_scraped_source(),
            curated: CuratedSourceConfig::default(),
        }
    }
}

impl Default for CuratedSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dataset_path: String::new(),
            min_confidence: default_min_confidence(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_days() -> u32 {
    7
}

fn default_cache_capacity() -> u32 {
    1_000
}

fn default_cache_hit_weight_minutes() -> u32 {
    10
}

fn default_cache_sweep_interval_minutes() -> u32 {
    60
}

fn default_fuzzy_standard_threshold() -> f64 {
    0.8
}

fn default_word_overlap_threshold() -> f64 {
    0.75
}

fn default_fuzzy_aggressive_threshold() -> f64 {
    0.7
}

fn default_aggressive_penalty() -> f64 {
    0.9
}

fn default_max_length_delta() -> f64 {
    0.7
}

fn default_min_significant_word_chars() -> u32 {
    4
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u32 {
    100
}

fn default_retry_transient_delay_ms() -> u32 {
    250
}

fn default_retry_max_delay_ms() -> u32 {
    2_000
}

fn default_overall_timeout_ms() -> u32 {
    2_000
}

fn default_per_source_timeout_ms() -> u32 {
    1_500
}

fn default_batch_concurrency() -> u32 {
    4
}

fn default_rate_limit_capacity() -> u32 {
    10
}

fn default_rate_limit_window_secs() -> u32 {
    60
}

fn default_min_confidence() -> CuratedConfidence {
    CuratedConfidence::Low
}

fn default_page_size() -> u32 {
    20
}

fn default_structured_source() -> RemoteSourceConfig {
    RemoteSourceConfig {
        enabled: true,
        base_url: "https://howlongtobeat.com".to_string(),
        rate_limit_capacity: default_rate_limit_capacity(),
        rate_limit_window_secs: default_rate_limit_window_secs(),
        page_size: default_page_size(),
    }
}

fn default_scraped_source() -> RemoteSourceConfig {
    RemoteSourceConfig {
        rate_limit_capacity: 5,
        ..default_structured_source()
    }
}

impl Default for RemoteSourceConfig {
    fn default() -> Self {
        default_structured_source()
    }
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}

impl CacheConfig {
    pub fn settings(&self) -> CacheSettings {
        CacheSettings {
            enabled: self.enabled,
            ttl: Duration::from_secs(u64::from(self.ttl_days) * 24 * 60 * 60),
            capacity: self.capacity as usize,
            hit_weight: Duration::from_secs(u64::from(self.hit_weight_minutes) * 60),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.sweep_interval_minutes) * 60)
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        non_empty_path(&self.database_path)
    }
}

impl MatchingConfig {
    pub fn thresholds(&self) -> MatchThresholds {
        MatchThresholds {
            fuzzy_standard: self.fuzzy_standard_threshold,
            word_overlap: self.word_overlap_threshold,
            fuzzy_aggressive: self.fuzzy_aggressive_threshold,
            aggressive_penalty: self.aggressive_penalty,
            max_length_delta: self.max_length_delta,
            min_significant_word_chars: self.min_significant_word_chars as usize,
        }
    }

    pub fn overrides_path(&self) -> Option<PathBuf> {
        non_empty_path(&self.overrides_path)
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(u64::from(self.base_delay_ms)),
            transient_delay: Duration::from_millis(u64::from(self.transient_delay_ms)),
            max_delay: Duration::from_millis(u64::from(self.max_delay_ms)),
        }
    }
}

impl OrchestratorConfig {
    pub fn settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            overall_timeout: Duration::from_millis(u64::from(self.overall_timeout_ms)),
            per_source_timeout: Duration::from_millis(u64::from(self.per_source_timeout_ms)),
            batch_concurrency: self.batch_concurrency as usize,
        }
    }
}

impl RemoteSourceConfig {
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(u64::from(self.rate_limit_window_secs))
    }
}

impl CuratedSourceConfig {
    pub fn dataset_path(&self) -> Option<PathBuf> {
        non_empty_path(&self.dataset_path)
    }
}

fn clamp_unit(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

fn sanitize_remote(source: RemoteSourceConfig) -> RemoteSourceConfig {
    RemoteSourceConfig {
        base_url: source.base_url.trim().trim_end_matches('/').to_string(),
        rate_limit_capacity: source.rate_limit_capacity.clamp(1, 1_000),
        rate_limit_window_secs: source.rate_limit_window_secs.clamp(1, 3_600),
        page_size: source.page_size.clamp(1, 100),
        ..source
    }
}

/// Clamps loaded values into workable ranges.
pub fn sanitize_config(config: Config) -> Config {
    let max_attempts = config.retry.max_attempts.clamp(1, 10);
    let base_delay_ms = config.retry.base_delay_ms.clamp(10, 60_000);
    let max_delay_ms = config.retry.max_delay_ms.max(base_delay_ms).min(120_000);
    let overall_timeout_ms = config.orchestrator.overall_timeout_ms.clamp(100, 120_000);
    let per_source_timeout_ms = config
        .orchestrator
        .per_source_timeout_ms
        .clamp(50, overall_timeout_ms);

    Config {
        cache: CacheConfig {
            ttl_days: config.cache.ttl_days.clamp(1, 365),
            capacity: config.cache.capacity.clamp(1, 1_000_000),
            sweep_interval_minutes: config.cache.sweep_interval_minutes.clamp(1, 24 * 60),
            ..config.cache
        },
        matching: MatchingConfig {
            fuzzy_standard_threshold: clamp_unit(
                config.matching.fuzzy_standard_threshold,
                default_fuzzy_standard_threshold(),
            ),
            word_overlap_threshold: clamp_unit(
                config.matching.word_overlap_threshold,
                default_word_overlap_threshold(),
            ),
            fuzzy_aggressive_threshold: clamp_unit(
                config.matching.fuzzy_aggressive_threshold,
                default_fuzzy_aggressive_threshold(),
            ),
            aggressive_penalty: clamp_unit(
                config.matching.aggressive_penalty,
                default_aggressive_penalty(),
            ),
            max_length_delta: clamp_unit(
                config.matching.max_length_delta,
                default_max_length_delta(),
            ),
            min_significant_word_chars: config.matching.min_significant_word_chars.clamp(1, 16),
            ..config.matching
        },
        retry: RetryConfig {
            max_attempts,
            base_delay_ms,
            transient_delay_ms: config.retry.transient_delay_ms.clamp(10, max_delay_ms),
            max_delay_ms,
        },
        orchestrator: OrchestratorConfig {
            overall_timeout_ms,
            per_source_timeout_ms,
            batch_concurrency: config.orchestrator.batch_concurrency.clamp(1, 16),
        },
        sources: SourcesConfig {
            structured: sanitize_remote(config.sources.structured),
            scraped: sanitize_remote(config.sources.scraped),
            curated: config.sources.curated,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_expected_values() {
        let config = Config::default();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl_days, 7);
        assert_eq!(config.cache.capacity, 1_000);
        assert_eq!(config.orchestrator.overall_timeout_ms, 2_000);
        assert_eq!(config.sources.structured.rate_limit_capacity, 10);
        assert_eq!(config.sources.structured.rate_limit_window_secs, 60);
        assert_eq!(config.sources.scraped.rate_limit_capacity, 5);
        assert_eq!(config.matching.thresholds(), MatchThresholds::default());
        assert_eq!(config.retry.policy(), RetryPolicy::default());
    }

    #[test]
    fn test_system_config_template_matches_default_values() {
        let parsed: Config = toml::from_str(include_str!("../config/titlelink.system.toml"))
            .expect("system config template should parse");
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [cache]
            ttl_days = 3

            [sources.scraped]
            base_url = "https://mirror.example.test"
            "#,
        )
        .expect("partial config should parse");
        assert_eq!(parsed.cache.ttl_days, 3);
        assert_eq!(parsed.cache.capacity, 1_000);
        assert_eq!(parsed.sources.scraped.base_url, "https://mirror.example.test");
        assert_eq!(parsed.sources.scraped.rate_limit_capacity, 10);
        assert_eq!(parsed.sources.structured, default_structured_source());
        assert!(parsed.sources.curated.enabled);
    }

    #[test]
    fn test_cache_settings_convert_units() {
        let settings = CacheConfig::default().settings();
        assert_eq!(settings.ttl, Duration::from_secs(7 * 24 * 3600));
        assert_eq!(settings.hit_weight, Duration::from_secs(600));
        assert_eq!(settings, CacheSettings::default());
    }

    #[test]
    fn test_sanitize_config_clamps_out_of_range_values() {
        let mut input = Config::default();
        input.matching.fuzzy_standard_threshold = 1.7;
        input.matching.aggressive_penalty = f64::NAN;
        input.retry.max_attempts = 0;
        input.retry.base_delay_ms = 9_000;
        input.retry.max_delay_ms = 100;
        input.orchestrator.overall_timeout_ms = 1_000;
        input.orchestrator.per_source_timeout_ms = 5_000;
        input.orchestrator.batch_concurrency = 0;
        input.cache.capacity = 0;
        input.sources.structured.base_url = " https://example.test/ ".to_string();

        let sanitized = sanitize_config(input);
        assert_eq!(sanitized.matching.fuzzy_standard_threshold, 1.0);
        assert_eq!(sanitized.matching.aggressive_penalty, 0.9);
        assert_eq!(sanitized.retry.max_attempts, 1);
        assert_eq!(sanitized.retry.max_delay_ms, 9_000);
        assert_eq!(sanitized.orchestrator.per_source_timeout_ms, 1_000);
        assert_eq!(sanitized.orchestrator.batch_concurrency, 1);
        assert_eq!(sanitized.cache.capacity, 1);
        assert_eq!(sanitized.sources.structured.base_url, "https://example.test");
    }
}
