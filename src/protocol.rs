//! Shared data model passed between sources, the resolver, the cache, and callers.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Which catalog produced a candidate record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Remote JSON search API.
    Structured,
    /// Remote HTML search page.
    Scraped,
    /// Local curated dataset bundled with the application.
    Curated,
}

impl SourceKind {
    pub fn source_name(self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::Scraped => "scraped",
            Self::Curated => "curated",
        }
    }

    /// Local data is never throttled.
    pub fn is_remote(self) -> bool {
        !matches!(self, Self::Curated)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_name())
    }
}

/// Named play-time measurement carried by a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    Main,
    MainExtra,
    Completionist,
    AllStyles,
}

impl MetricKey {
    pub const ALL: [MetricKey; 4] = [
        MetricKey::Main,
        MetricKey::MainExtra,
        MetricKey::Completionist,
        MetricKey::AllStyles,
    ];

    /// Maps the label text used by remote catalogs onto a metric key.
    pub fn from_label(label: &str) -> Option<Self> {
        let lowered = label.trim().to_lowercase();
        let compact: String = lowered.chars().filter(|ch| ch.is_alphanumeric()).collect();
        match compact.as_str() {
            "main" | "mainstory" | "story" | "single" | "singleplayer" => Some(Self::Main),
            "mainextra" | "mainextras" | "mainsides" | "extras" => Some(Self::MainExtra),
            "completionist" | "completionists" | "100" | "complete" => Some(Self::Completionist),
            "allstyles" | "all" | "allplaystyles" => Some(Self::AllStyles),
            _ => None,
        }
    }
}

/// Metric map where a missing measurement is an explicit `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricSet(BTreeMap<MetricKey, Option<Duration>>);

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: MetricKey, value: Option<Duration>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: MetricKey, value: Option<Duration>) {
        self.0.insert(key, value);
    }

    pub fn get(&self, key: MetricKey) -> Option<Duration> {
        self.0.get(&key).copied().flatten()
    }

    pub fn contains_key(&self, key: MetricKey) -> bool {
        self.0.contains_key(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetricKey, Option<Duration>)> + '_ {
        self.0.iter().map(|(key, value)| (*key, *value))
    }

    /// True when at least one metric carries an actual measurement.
    pub fn has_any_value(&self) -> bool {
        self.0.values().any(Option::is_some)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for MetricSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let as_secs: BTreeMap<MetricKey, Option<u64>> = self
            .0
            .iter()
            .map(|(key, value)| (*key, value.map(|duration| duration.as_secs())))
            .collect();
        as_secs.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MetricSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let as_secs = BTreeMap::<MetricKey, Option<u64>>::deserialize(deserializer)?;
        Ok(Self(
            as_secs
                .into_iter()
                .map(|(key, value)| (key, value.map(Duration::from_secs)))
                .collect(),
        ))
    }
}

/// One entity as returned by a source, before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub source_id: String,
    pub display_name: String,
    /// Other names the entity is known by. Matching considers them too.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub metrics: MetricSet,
    #[serde(default)]
    pub platform_tags: BTreeSet<String>,
    pub source: SourceKind,
}

impl CandidateRecord {
    pub fn new(
        source: SourceKind,
        source_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            display_name: display_name.into(),
            aliases: Vec::new(),
            metrics: MetricSet::new(),
            platform_tags: BTreeSet::new(),
            source,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// The display name followed by every alias.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.display_name.as_str())
            .chain(self.aliases.iter().map(String::as_str))
    }

    pub fn with_metrics(mut self, metrics: MetricSet) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform_tags.insert(platform.into());
        self
    }
}

/// Which cascade strategy accepted a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Manual,
    YearSpecific,
    Exact,
    FuzzyStandard,
    WordOverlap,
    FuzzyAggressive,
}

/// The single candidate selected for a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedMatch {
    pub candidate: CandidateRecord,
    pub confidence: f64,
    pub method: MatchMethod,
}

/// Result of running the matching cascade for one name.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Matched(ResolvedMatch),
    /// The name is listed as never-resolvable; no strategy ran after the skip check.
    Skipped { reason: String },
    NotFound,
}

impl Resolution {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    pub fn matched(&self) -> Option<&ResolvedMatch> {
        match self {
            Self::Matched(resolved) => Some(resolved),
            _ => None,
        }
    }
}

/// Why a lookup ended without a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupFailure {
    /// Every source answered; none had a match.
    NoData,
    /// The name is in the skip table.
    Skipped,
    /// At least one source failed or the request budget ran out.
    Transient,
}

/// Response returned to the (external) presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolveOutcome {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<CandidateRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<MatchMethod>,
    /// Set only when the record came from the cache.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<LookupFailure>,
}

impl ResolveOutcome {
    pub fn found(
        record: CandidateRecord,
        confidence: Option<f64>,
        method: Option<MatchMethod>,
        cached: bool,
    ) -> Self {
        Self {
            found: true,
            source: Some(record.source),
            record: Some(record),
            confidence,
            method,
            cached,
            failure: None,
        }
    }

    pub fn not_found(failure: LookupFailure) -> Self {
        Self {
            found: false,
            record: None,
            source: None,
            confidence: None,
            method: None,
            cached: false,
            failure: Some(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_set_serializes_as_seconds_with_nulls() {
        let metrics = MetricSet::new()
            .with(MetricKey::Main, Some(Duration::from_secs(8 * 3600)))
            .with(MetricKey::Completionist, None);
        let json = serde_json::to_string(&metrics).expect("metrics should serialize");
        assert_eq!(json, r#"{"main":28800,"completionist":null}"#);

        let parsed: MetricSet = serde_json::from_str(&json).expect("metrics should parse");
        assert_eq!(parsed, metrics);
        assert!(parsed.contains_key(MetricKey::Completionist));
        assert_eq!(parsed.get(MetricKey::Completionist), None);
    }

    #[test]
    fn test_metric_key_from_label_accepts_catalog_spellings() {
        assert_eq!(MetricKey::from_label("Main Story"), Some(MetricKey::Main));
        assert_eq!(
            MetricKey::from_label("Main + Extras"),
            Some(MetricKey::MainExtra)
        );
        assert_eq!(
            MetricKey::from_label("Completionist"),
            Some(MetricKey::Completionist)
        );
        assert_eq!(
            MetricKey::from_label("All Styles"),
            Some(MetricKey::AllStyles)
        );
        assert_eq!(MetricKey::from_label("Co-Op"), None);
    }

    #[test]
    fn test_not_found_outcome_omits_record_fields() {
        let outcome = ResolveOutcome::not_found(LookupFailure::NoData);
        let json = serde_json::to_string(&outcome).expect("outcome should serialize");
        assert_eq!(json, r#"{"found":false,"failure":"no_data"}"#);
    }
}
