//! Local curated dataset, bundled with the crate and optionally replaced by a file.

use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, SourceError};
use crate::matching::normalize::{normalize, NormalizationLevel};
use crate::matching::similarity::{combined, length_ratio_compatible, significant_word_overlap};
use crate::protocol::{CandidateRecord, MetricKey, MetricSet, SourceKind};
use crate::sources::CatalogSource;

const BUILTIN_DATASET: &str = include_str!("../../data/curated_catalog.json");
const PREFILTER_MIN_WORD_CHARS: usize = 4;
const PREFILTER_MIN_SIMILARITY: f64 = 0.6;
const PREFILTER_MAX_LENGTH_DELTA: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CuratedConfidence {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CuratedEntry {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Hours per metric; `null` or a missing key means no data.
    #[serde(default)]
    pub metrics: std::collections::BTreeMap<MetricKey, Option<f64>>,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub confidence: CuratedConfidence,
    pub last_updated: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CuratedDataset {
    pub version: u32,
    #[serde(default)]
    pub entries: Vec<CuratedEntry>,
}

struct IndexedName {
    standard: String,
    aggressive: String,
}

struct IndexedEntry {
    entry: CuratedEntry,
    names: Vec<IndexedName>,
}

pub struct CuratedSource {
    version: u32,
    entries: Vec<IndexedEntry>,
}

fn hours_to_duration(hours: Option<f64>) -> Option<Duration> {
    let hours = hours?;
    (hours.is_finite() && hours > 0.0).then(|| Duration::from_secs((hours * 3600.0).round() as u64))
}

impl CuratedEntry {
    fn metric_set(&self) -> MetricSet {
        self.metrics
            .iter()
            .fold(MetricSet::new(), |metrics, (key, hours)| {
                metrics.with(*key, hours_to_duration(*hours))
            })
    }

    fn to_candidate(&self) -> CandidateRecord {
        let mut record =
            CandidateRecord::new(SourceKind::Curated, self.id.clone(), self.title.trim())
                .with_metrics(self.metric_set());
        for alias in self.aliases.iter().map(|alias| alias.trim()) {
            if !alias.is_empty() {
                record = record.with_alias(alias);
            }
        }
        for platform in &self.platforms {
            record = record.with_platform(platform.clone());
        }
        record
    }
}

impl CuratedSource {
    pub fn builtin() -> Result<Self, DatasetError> {
        Self::from_json_str(BUILTIN_DATASET, CuratedConfidence::Low)
    }

    /// The dataset at `path` when one is configured, else the bundled one.
    pub fn load(
        path: Option<&Path>,
        min_confidence: CuratedConfidence,
    ) -> Result<Self, DatasetError> {
        let source = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                Self::from_json_str(&text, min_confidence)?
            }
            None => Self::from_json_str(BUILTIN_DATASET, min_confidence)?,
        };
        info!(
            "Curated: loaded dataset v{} with {} entries",
            source.version,
            source.entries.len()
        );
        Ok(source)
    }

    pub fn from_json_str(
        text: &str,
        min_confidence: CuratedConfidence,
    ) -> Result<Self, DatasetError> {
        let dataset: CuratedDataset = serde_json::from_str(text)?;
        Ok(Self::from_dataset(dataset, min_confidence))
    }

    pub fn from_dataset(dataset: CuratedDataset, min_confidence: CuratedConfidence) -> Self {
        let entries = dataset
            .entries
            .into_iter()
            .filter(|entry| entry.confidence >= min_confidence)
            .filter(|entry| !entry.title.trim().is_empty())
            .map(|entry| {
                let names = std::iter::once(&entry.title)
                    .chain(entry.aliases.iter())
                    .filter(|name| !name.trim().is_empty())
                    .map(|name| IndexedName {
                        standard: normalize(name, NormalizationLevel::Standard),
                        aggressive: normalize(name, NormalizationLevel::Aggressive),
                    })
                    .collect();
                IndexedEntry { entry, names }
            })
            .collect();
        Self {
            version: dataset.version,
            entries,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn plausible(query_standard: &str, query_aggressive: &str, name: &IndexedName) -> bool {
        if name.aggressive == query_aggressive || name.standard == query_standard {
            return true;
        }
        if significant_word_overlap(query_standard, &name.standard, PREFILTER_MIN_WORD_CHARS) > 0.0
        {
            return true;
        }
        length_ratio_compatible(query_standard, &name.standard, PREFILTER_MAX_LENGTH_DELTA)
            && combined(query_standard, &name.standard) >= PREFILTER_MIN_SIMILARITY
    }
}

impl CatalogSource for CuratedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Curated
    }

    /// Emits one candidate per plausible entry, titled canonically and
    /// carrying the entry's aliases for matching.
    fn query(&self, name: &str) -> Result<Vec<CandidateRecord>, SourceError> {
        let query_standard = normalize(name, NormalizationLevel::Standard);
        let query_aggressive = normalize(name, NormalizationLevel::Aggressive);
        let candidates: Vec<CandidateRecord> = self
            .entries
            .iter()
            .filter(|indexed| {
                indexed.names.iter().any(|indexed_name| {
                    Self::plausible(&query_standard, &query_aggressive, indexed_name)
                })
            })
            .map(|indexed| indexed.entry.to_candidate())
            .collect();
        debug!("Curated: {} candidates for '{}'", candidates.len(), name);
        Ok(candidates)
    }
}
