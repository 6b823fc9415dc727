//! Prioritized matching cascade that picks one candidate for a queried title.
//!
//! Strategies run in order and the first one that accepts wins. The skip check
//! runs first and ends the cascade outright when a title is blacklisted.

use std::sync::Arc;

use log::debug;

use crate::matching::normalize::{extract_release_year, normalize, NormalizationLevel};
use crate::matching::overrides::OverrideTable;
use crate::matching::similarity::{combined, length_ratio_compatible, significant_word_overlap};
use crate::protocol::{CandidateRecord, MatchMethod, Resolution, ResolvedMatch};

/// Acceptance thresholds for the scoring strategies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchThresholds {
    pub fuzzy_standard: f64,
    pub word_overlap: f64,
    pub fuzzy_aggressive: f64,
    /// Multiplier applied to aggressive-level scores to reflect lower certainty.
    pub aggressive_penalty: f64,
    /// Candidates whose length differs from the query by more than this share
    /// of the longer string are not scored.
    pub max_length_delta: f64,
    /// Words shorter than this carry too little information for word overlap.
    pub min_significant_word_chars: usize,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            fuzzy_standard: 0.8,
            word_overlap: 0.75,
            fuzzy_aggressive: 0.7,
            aggressive_penalty: 0.9,
            max_length_delta: 0.7,
            min_significant_word_chars: 4,
        }
    }
}

/// A queried title normalized once for every strategy.
#[derive(Debug, Clone)]
pub struct MatchQuery {
    pub raw: String,
    pub minimal: String,
    pub standard: String,
    pub aggressive: String,
    /// Standard-normalized base title and release year, when the title carries one.
    pub release_year: Option<(String, u16)>,
}

impl MatchQuery {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            minimal: normalize(raw, NormalizationLevel::Minimal),
            standard: normalize(raw, NormalizationLevel::Standard),
            aggressive: normalize(raw, NormalizationLevel::Aggressive),
            release_year: extract_release_year(raw)
                .map(|(base, year)| (normalize(&base, NormalizationLevel::Standard), year)),
        }
    }
}

/// One name of a candidate normalized at every level. A record with aliases
/// yields one prepared candidate per name, all pointing at the same record.
#[derive(Debug, Clone)]
pub struct PreparedCandidate<'a> {
    pub record: &'a CandidateRecord,
    pub name: &'a str,
    pub minimal: String,
    pub standard: String,
    pub aggressive: String,
}

impl<'a> PreparedCandidate<'a> {
    pub fn for_name(record: &'a CandidateRecord, name: &'a str) -> Self {
        Self {
            record,
            name,
            minimal: normalize(name, NormalizationLevel::Minimal),
            standard: normalize(name, NormalizationLevel::Standard),
            aggressive: normalize(name, NormalizationLevel::Aggressive),
        }
    }

    pub fn all_names(record: &'a CandidateRecord) -> impl Iterator<Item = Self> + 'a {
        record.names().map(move |name| Self::for_name(record, name))
    }
}

/// What one strategy decided.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    Accept {
        index: usize,
        confidence: f64,
        method: MatchMethod,
    },
    Skip {
        reason: String,
    },
    /// No decision; try the next strategy.
    Pass,
}

/// One step of the cascade.
pub trait MatchStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn attempt(&self, query: &MatchQuery, candidates: &[PreparedCandidate<'_>]) -> StrategyOutcome;
}

/// Index and score of the highest-scoring candidate. Ties keep the earliest
/// candidate so results follow source order.
fn best_scoring<F>(candidates: &[PreparedCandidate<'_>], mut score: F) -> Option<(usize, f64)>
where
    F: FnMut(&PreparedCandidate<'_>) -> Option<f64>,
{
    let mut best: Option<(usize, f64)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let Some(value) = score(candidate) else {
            continue;
        };
        if best.map_or(true, |(_, best_value)| value > best_value) {
            best = Some((index, value));
        }
    }
    best
}

fn first_with_standard(candidates: &[PreparedCandidate<'_>], target: &str) -> Option<usize> {
    candidates
        .iter()
        .position(|candidate| candidate.standard == target)
}

pub struct SkipListStrategy {
    overrides: Arc<OverrideTable>,
}

impl MatchStrategy for SkipListStrategy {
    fn name(&self) -> &'static str {
        "skip_list"
    }

    fn attempt(&self, query: &MatchQuery, _: &[PreparedCandidate<'_>]) -> StrategyOutcome {
        match self.overrides.skip_reason(&query.standard) {
            Some(reason) => StrategyOutcome::Skip {
                reason: reason.to_string(),
            },
            None => StrategyOutcome::Pass,
        }
    }
}

pub struct YearSpecificStrategy {
    overrides: Arc<OverrideTable>,
}

impl MatchStrategy for YearSpecificStrategy {
    fn name(&self) -> &'static str {
        "year_specific"
    }

    fn attempt(&self, query: &MatchQuery, candidates: &[PreparedCandidate<'_>]) -> StrategyOutcome {
        let Some((base, year)) = query.release_year.as_ref() else {
            return StrategyOutcome::Pass;
        };
        let Some(target) = self.overrides.year_target(base, *year) else {
            return StrategyOutcome::Pass;
        };
        match first_with_standard(candidates, target) {
            Some(index) => StrategyOutcome::Accept {
                index,
                confidence: 1.0,
                method: MatchMethod::YearSpecific,
            },
            None => StrategyOutcome::Pass,
        }
    }
}

pub struct ManualOverrideStrategy {
    overrides: Arc<OverrideTable>,
}

impl MatchStrategy for ManualOverrideStrategy {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn attempt(&self, query: &MatchQuery, candidates: &[PreparedCandidate<'_>]) -> StrategyOutcome {
        let Some(target) = self.overrides.manual_target(&query.standard) else {
            return StrategyOutcome::Pass;
        };
        match first_with_standard(candidates, target) {
            Some(index) => StrategyOutcome::Accept {
                index,
                confidence: 1.0,
                method: MatchMethod::Manual,
            },
            None => StrategyOutcome::Pass,
        }
    }
}

pub struct ExactStrategy;

impl MatchStrategy for ExactStrategy {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn attempt(&self, query: &MatchQuery, candidates: &[PreparedCandidate<'_>]) -> StrategyOutcome {
        if query.minimal.is_empty() {
            return StrategyOutcome::Pass;
        }
        match candidates
            .iter()
            .position(|candidate| candidate.minimal == query.minimal)
        {
            Some(index) => StrategyOutcome::Accept {
                index,
                confidence: 1.0,
                method: MatchMethod::Exact,
            },
            None => StrategyOutcome::Pass,
        }
    }
}

/// Combined similarity at one normalization level.
pub struct FuzzyStrategy {
    level: NormalizationLevel,
    threshold: f64,
    penalty: f64,
    max_length_delta: f64,
}

impl FuzzyStrategy {
    pub fn standard(thresholds: &MatchThresholds) -> Self {
        Self {
            level: NormalizationLevel::Standard,
            threshold: thresholds.fuzzy_standard,
            penalty: 1.0,
            max_length_delta: thresholds.max_length_delta,
        }
    }

    pub fn aggressive(thresholds: &MatchThresholds) -> Self {
        Self {
            level: NormalizationLevel::Aggressive,
            threshold: thresholds.fuzzy_aggressive,
            penalty: thresholds.aggressive_penalty,
            max_length_delta: thresholds.max_length_delta,
        }
    }

    fn method(&self) -> MatchMethod {
        match self.level {
            NormalizationLevel::Aggressive => MatchMethod::FuzzyAggressive,
            _ => MatchMethod::FuzzyStandard,
        }
    }
}

impl MatchStrategy for FuzzyStrategy {
    fn name(&self) -> &'static str {
        match self.level {
            NormalizationLevel::Aggressive => "fuzzy_aggressive",
            _ => "fuzzy_standard",
        }
    }

    fn attempt(&self, query: &MatchQuery, candidates: &[PreparedCandidate<'_>]) -> StrategyOutcome {
        let query_form = match self.level {
            NormalizationLevel::Aggressive => &query.aggressive,
            _ => &query.standard,
        };
        if query_form.is_empty() {
            return StrategyOutcome::Pass;
        }
        let best = best_scoring(candidates, |candidate| {
            let candidate_form = match self.level {
                NormalizationLevel::Aggressive => &candidate.aggressive,
                _ => &candidate.standard,
            };
            length_ratio_compatible(query_form, candidate_form, self.max_length_delta)
                .then(|| combined(query_form, candidate_form))
        });
        match best {
            Some((index, score)) if score >= self.threshold => StrategyOutcome::Accept {
                index,
                confidence: (score * self.penalty).clamp(0.0, 1.0),
                method: self.method(),
            },
            _ => StrategyOutcome::Pass,
        }
    }
}

pub struct WordOverlapStrategy {
    threshold: f64,
    min_word_chars: usize,
}

impl MatchStrategy for WordOverlapStrategy {
    fn name(&self) -> &'static str {
        "word_overlap"
    }

    fn attempt(&self, query: &MatchQuery, candidates: &[PreparedCandidate<'_>]) -> StrategyOutcome {
        let best = best_scoring(candidates, |candidate| {
            Some(significant_word_overlap(
                &query.standard,
                &candidate.standard,
                self.min_word_chars,
            ))
        });
        match best {
            Some((index, score)) if score >= self.threshold => StrategyOutcome::Accept {
                index,
                confidence: score,
                method: MatchMethod::WordOverlap,
            },
            _ => StrategyOutcome::Pass,
        }
    }
}

/// Runs the strategy cascade over a candidate list.
pub struct TitleResolver {
    strategies: Vec<Box<dyn MatchStrategy>>,
}

impl TitleResolver {
    /// The standard cascade: skip, year-specific, manual, exact, fuzzy standard,
    /// word overlap, fuzzy aggressive.
    pub fn new(overrides: Arc<OverrideTable>, thresholds: MatchThresholds) -> Self {
        Self::with_strategies(vec![
            Box::new(SkipListStrategy {
                overrides: Arc::clone(&overrides),
            }),
            Box::new(YearSpecificStrategy {
                overrides: Arc::clone(&overrides),
            }),
            Box::new(ManualOverrideStrategy { overrides }),
            Box::new(ExactStrategy),
            Box::new(FuzzyStrategy::standard(&thresholds)),
            Box::new(WordOverlapStrategy {
                threshold: thresholds.word_overlap,
                min_word_chars: thresholds.min_significant_word_chars,
            }),
            Box::new(FuzzyStrategy::aggressive(&thresholds)),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn MatchStrategy>>) -> Self {
        Self { strategies }
    }

    /// Appends a strategy that runs after every existing one.
    pub fn push_strategy(&mut self, strategy: Box<dyn MatchStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|strategy| strategy.name()).collect()
    }

    /// Skip reason for `name`, decided without any candidates.
    pub fn skip_reason(&self, name: &str) -> Option<String> {
        match self.resolve(name, &[]) {
            Resolution::Skipped { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn resolve(&self, name: &str, candidates: &[CandidateRecord]) -> Resolution {
        let query = MatchQuery::new(name);
        let prepared: Vec<PreparedCandidate<'_>> =
            candidates.iter().flat_map(PreparedCandidate::all_names).collect();

        for strategy in &self.strategies {
            match strategy.attempt(&query, &prepared) {
                StrategyOutcome::Skip { reason } => {
                    debug!("Resolve[{}]: skipped ({})", name, reason);
                    return Resolution::Skipped { reason };
                }
                StrategyOutcome::Accept {
                    index,
                    confidence,
                    method,
                } => {
                    let Some(matched) = prepared.get(index) else {
                        continue;
                    };
                    debug!(
                        "Resolve[{}]: '{}' accepted by {} via '{}' ({:.3})",
                        name,
                        matched.record.display_name,
                        strategy.name(),
                        matched.name,
                        confidence
                    );
                    return Resolution::Matched(ResolvedMatch {
                        candidate: matched.record.clone(),
                        confidence,
                        method,
                    });
                }
                StrategyOutcome::Pass => {}
            }
        }
        debug!(
            "Resolve[{}]: no strategy accepted {} candidates",
            name,
            candidates.len()
        );
        Resolution::NotFound
    }
}
