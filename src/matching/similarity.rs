//! String similarity scores over already-normalized titles.
//!
//! Every score is in `[0, 1]`, where 1 means identical.

use std::collections::{HashMap, HashSet};

const BIGRAM_WEIGHT: f64 = 0.3;
const PREFIX_WEIGHT: f64 = 0.4;
const EDIT_WEIGHT: f64 = 0.3;

/// `1 - levenshtein / max(len)`; 1.0 for two empty strings, 0.0 when only one is empty.
pub fn edit_distance_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

fn bigrams(value: &str) -> HashMap<(char, char), usize> {
    let chars: Vec<char> = value.chars().collect();
    let mut counts = HashMap::with_capacity(chars.len());
    for pair in chars.windows(2) {
        *counts.entry((pair[0], pair[1])).or_insert(0) += 1;
    }
    counts
}

/// Sørensen–Dice coefficient over character-bigram multisets.
///
/// Strings shorter than two characters have no bigrams: two such strings score
/// 1.0 when equal and 0.0 otherwise, and a short string against a longer one
/// always scores 0.0.
pub fn bigram_overlap(a: &str, b: &str) -> f64 {
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    if a_len < 2 || b_len < 2 {
        return if a_len < 2 && b_len < 2 && a == b {
            1.0
        } else {
            0.0
        };
    }

    let a_bigrams = bigrams(a);
    let b_bigrams = bigrams(b);
    let intersection: usize = a_bigrams
        .iter()
        .map(|(pair, count)| (*count).min(b_bigrams.get(pair).copied().unwrap_or(0)))
        .sum();
    let total = (a_len - 1) + (b_len - 1);
    (2 * intersection) as f64 / total as f64
}

/// Jaro-Winkler similarity (prefix scale 0.1, prefix bound 4).
pub fn prefix_weighted(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(a, b)
}

/// Weighted blend: 30% bigram, 40% Jaro-Winkler, 30% edit distance.
///
/// Arguments are scored in a canonical order so the result is exactly symmetric.
pub fn combined(a: &str, b: &str) -> f64 {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    let score = BIGRAM_WEIGHT * bigram_overlap(first, second)
        + PREFIX_WEIGHT * prefix_weighted(first, second)
        + EDIT_WEIGHT * edit_distance_similarity(first, second);
    score.clamp(0.0, 1.0)
}

fn lowercase_tokens(value: &str, min_chars: usize) -> HashSet<String> {
    value
        .split_whitespace()
        .filter(|token| token.chars().count() >= min_chars)
        .map(str::to_lowercase)
        .collect()
}

fn jaccard(left: &HashSet<String>, right: &HashSet<String>) -> f64 {
    if left.is_empty() && right.is_empty() {
        return 1.0;
    }
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let intersection = left.intersection(right).count();
    let union = left.len() + right.len() - intersection;
    intersection as f64 / union as f64
}

/// Jaccard index over case-insensitive whitespace tokens.
pub fn word_overlap(a: &str, b: &str) -> f64 {
    jaccard(&lowercase_tokens(a, 1), &lowercase_tokens(b, 1))
}

/// Jaccard index over tokens of at least `min_chars` characters. When either
/// side has no qualifying tokens the overlap carries no information and scores 0.
pub fn significant_word_overlap(a: &str, b: &str, min_chars: usize) -> f64 {
    let left = lowercase_tokens(a, min_chars);
    let right = lowercase_tokens(b, min_chars);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    jaccard(&left, &right)
}

/// Cheap pre-filter: false when the lengths differ by more than `max_delta`
/// of the longer string.
pub fn length_ratio_compatible(a: &str, b: &str, max_delta: f64) -> bool {
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    let longest = a_len.max(b_len);
    if longest == 0 {
        return true;
    }
    let delta = a_len.abs_diff(b_len) as f64 / longest as f64;
    delta <= max_delta
}
