//! Parsing of human-written play-time text such as `12½ Hours` or `1h 30m`.

use std::time::Duration;

const NO_DATA_SENTINELS: &[&str] = &["", "-", "--", "n/a", "na", "none", "no data", "tbd", "?"];
const RANGE_SEPARATORS: &[&str] = &["–", "—", " to ", "-"];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Unit {
    Hours,
    Minutes,
    Seconds,
}

impl Unit {
    fn from_word(word: &str) -> Option<Self> {
        match word {
            "h" | "hr" | "hrs" | "hour" | "hours" => Some(Self::Hours),
            "m" | "min" | "mins" | "minute" | "minutes" => Some(Self::Minutes),
            "s" | "sec" | "secs" | "second" | "seconds" => Some(Self::Seconds),
            _ => None,
        }
    }

    fn seconds(self) -> f64 {
        match self {
            Self::Hours => 3600.0,
            Self::Minutes => 60.0,
            Self::Seconds => 1.0,
        }
    }
}

fn expand_fractions(text: &str) -> String {
    text.replace('½', ".5").replace('¼', ".25").replace('¾', ".75")
}

/// `(value, unit)` pairs in reading order; a number with no recognized unit
/// after it gets `None`.
fn components(text: &str) -> Vec<(f64, Option<Unit>)> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut index = 0;
    while index < chars.len() {
        let starts_number = chars[index].is_ascii_digit()
            || (chars[index] == '.' && chars.get(index + 1).is_some_and(char::is_ascii_digit));
        if !starts_number {
            index += 1;
            continue;
        }
        let start = index;
        while index < chars.len() && (chars[index].is_ascii_digit() || chars[index] == '.') {
            index += 1;
        }
        let literal: String = chars[start..index].iter().collect();
        let literal = if literal.starts_with('.') {
            format!("0{literal}")
        } else {
            literal
        };
        let Ok(value) = literal.trim_end_matches('.').parse::<f64>() else {
            continue;
        };
        while index < chars.len() && chars[index] == ' ' {
            index += 1;
        }
        let word_start = index;
        while index < chars.len() && chars[index].is_alphabetic() {
            index += 1;
        }
        let word: String = chars[word_start..index].iter().collect();
        out.push((value, Unit::from_word(&word)));
    }
    out
}

fn total_seconds(text: &str, fallback: Unit) -> Option<f64> {
    let parts = components(text);
    if parts.is_empty() {
        return None;
    }
    let total = parts
        .iter()
        .map(|(value, unit)| value * unit.unwrap_or(fallback).seconds())
        .sum();
    Some(total)
}

fn trailing_unit(text: &str) -> Option<Unit> {
    components(text).iter().rev().find_map(|(_, unit)| *unit)
}

fn split_range(text: &str) -> Option<(&str, &str)> {
    RANGE_SEPARATORS.iter().find_map(|separator| {
        let (left, right) = text.split_once(separator)?;
        let has_digit = |side: &str| side.chars().any(|ch| ch.is_ascii_digit());
        (has_digit(left) && has_digit(right)).then_some((left, right))
    })
}

/// Parses a duration as written by a catalog page. Ranges resolve to their
/// midpoint. Bare numbers are hours. Sentinels and zero mean no data.
pub fn parse_duration_text(text: &str) -> Option<Duration> {
    let lowered = expand_fractions(&text.trim().to_lowercase());
    let lowered = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    if NO_DATA_SENTINELS.contains(&lowered.as_str()) {
        return None;
    }

    let seconds = match split_range(&lowered) {
        Some((left, right)) => {
            let unit = trailing_unit(right).unwrap_or(Unit::Hours);
            let low = total_seconds(left, unit)?;
            let high = total_seconds(right, unit)?;
            (low + high) / 2.0
        }
        None => total_seconds(&lowered, Unit::Hours)?,
    };

    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    Some(Duration::from_secs(seconds.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours(value: f64) -> Option<Duration> {
        Some(Duration::from_secs((value * 3600.0) as u64))
    }

    #[test]
    fn test_parses_catalog_hour_spellings() {
        assert_eq!(parse_duration_text("12½ Hours"), hours(12.5));
        assert_eq!(parse_duration_text("12.5 Hours"), hours(12.5));
        assert_eq!(parse_duration_text("40 Hours"), hours(40.0));
        assert_eq!(parse_duration_text("½ Hours"), hours(0.5));
        assert_eq!(parse_duration_text("7"), hours(7.0));
    }

    #[test]
    fn test_ranges_resolve_to_midpoint() {
        assert_eq!(parse_duration_text("10–12 Hours"), hours(11.0));
        assert_eq!(parse_duration_text("10 - 12 Hours"), hours(11.0));
        assert_eq!(parse_duration_text("20 to 30 hours"), hours(25.0));
    }

    #[test]
    fn test_minutes_and_compound_forms() {
        assert_eq!(
            parse_duration_text("45 Mins"),
            Some(Duration::from_secs(45 * 60))
        );
        assert_eq!(
            parse_duration_text("1h 30m"),
            Some(Duration::from_secs(90 * 60))
        );
        assert_eq!(
            parse_duration_text("2 Hours 15 Minutes"),
            Some(Duration::from_secs(135 * 60))
        );
    }

    #[test]
    fn test_no_data_sentinels() {
        for text in ["", "  ", "--", "N/A", "n/a", "-", "TBD", "0 Hours", "Hours"] {
            assert_eq!(parse_duration_text(text), None, "{text:?} should be no data");
        }
    }
}
