//! Title canonicalization at three escalating strictness levels.
//!
//! Every level is pure, total, and idempotent: feeding a normalized string back
//! through the same level returns it unchanged.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// How much of a title's surface form is discarded before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NormalizationLevel {
    /// Trademark glyphs removed, whitespace collapsed, lowercased.
    Minimal,
    /// Minimal plus punctuation replaced by spaces and diacritics folded.
    Standard,
    /// Standard plus subtitles, articles, editions, publisher prefixes,
    /// acronyms, and Roman numerals canonicalized.
    Aggressive,
}

const TRADEMARK_GLYPHS: &[char] = &['™', '®', '©', '℠'];

const TYPOGRAPHIC_PUNCTUATION: &[char] = &[
    '‐', '‑', '‒', '–', '—', '―', '‘', '’', '‚', '‛', '“', '”', '„', '‟', '´', '…', '·', '«',
    '»', '¡', '¿',
];

const SUBTITLE_SEPARATORS: &[&str] = &[":", " - ", " – ", " — ", " ~ "];

const LEADING_ARTICLES: &[&str] = &["the", "a", "an"];

/// Trailing edition markers, in standard-normalized form, longest first.
const EDITION_SUFFIXES: &[&str] = &[
    "game of the year edition",
    "digital deluxe edition",
    "definitive edition",
    "anniversary edition",
    "collector s edition",
    "legendary edition",
    "complete edition",
    "enhanced edition",
    "ultimate edition",
    "standard edition",
    "premium edition",
    "special edition",
    "deluxe edition",
    "director s cut",
    "game of the year",
    "gold edition",
    "goty edition",
    "hd remaster",
    "remastered",
    "remaster",
    "goty",
];

const PUBLISHER_PREFIXES: &[&str] = &[
    "tom clancy s",
    "tom clancys",
    "sid meier s",
    "sid meiers",
    "clive barker s",
    "american mcgee s",
    "disney s",
    "marvel s",
];

/// Whole-string acronyms and their standard-normalized expansions.
const ACRONYMS: &[(&str, &str)] = &[
    ("gta", "grand theft auto"),
    ("cod", "call of duty"),
    ("tes", "the elder scrolls"),
    ("ff", "final fantasy"),
    ("mgs", "metal gear solid"),
    ("rdr", "red dead redemption"),
    ("kotor", "star wars knights of the old republic"),
    ("botw", "the legend of zelda breath of the wild"),
    ("csgo", "counter strike global offensive"),
    ("pubg", "playerunknown s battlegrounds"),
    ("dmc", "devil may cry"),
];

const ROMAN_NUMERALS: &[(&str, &str)] = &[
    ("i", "1"),
    ("ii", "2"),
    ("iii", "3"),
    ("iv", "4"),
    ("v", "5"),
    ("vi", "6"),
    ("vii", "7"),
    ("viii", "8"),
    ("ix", "9"),
    ("x", "10"),
];

const MAX_AGGRESSIVE_PASSES: usize = 8;

const MIN_RELEASE_YEAR: u16 = 1950;
const MAX_RELEASE_YEAR: u16 = 2100;

/// Normalizes `raw` at the requested level.
pub fn normalize(raw: &str, level: NormalizationLevel) -> String {
    if !raw.chars().any(char::is_alphabetic) {
        return collapse_whitespace(raw);
    }
    match level {
        NormalizationLevel::Minimal => minimal(raw),
        NormalizationLevel::Standard => standard(&minimal(raw)),
        NormalizationLevel::Aggressive => aggressive(raw),
    }
}

pub(crate) fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn minimal(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|ch| !TRADEMARK_GLYPHS.contains(ch))
        .collect();
    collapse_whitespace(&stripped.to_lowercase())
}

fn is_standard_punctuation(ch: char) -> bool {
    ch.is_ascii_punctuation() || TYPOGRAPHIC_PUNCTUATION.contains(&ch)
}

fn standard(minimal_form: &str) -> String {
    let mut out = String::with_capacity(minimal_form.len());
    for ch in minimal_form.nfd() {
        if is_combining_mark(ch) {
            continue;
        }
        if is_standard_punctuation(ch) {
            out.push(' ');
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    collapse_whitespace(&out)
}

fn cut_subtitle(minimal_form: &str) -> &str {
    let first_separator = SUBTITLE_SEPARATORS
        .iter()
        .filter_map(|separator| minimal_form.find(separator))
        .min();
    match first_separator {
        Some(position) => {
            let head = minimal_form[..position].trim();
            if head.chars().any(char::is_alphanumeric) {
                head
            } else {
                minimal_form
            }
        }
        None => minimal_form,
    }
}

fn aggressive(raw: &str) -> String {
    let minimal_form = minimal(raw);
    let mut current = standard(cut_subtitle(&minimal_form));
    for _ in 0..MAX_AGGRESSIVE_PASSES {
        let next = aggressive_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn aggressive_pass(value: &str) -> String {
    let value = strip_leading_article(value);
    let value = strip_edition_suffix(value);
    let value = strip_publisher_prefix(value);
    let expanded = expand_acronym(value);
    convert_roman_numerals(expanded.unwrap_or(value))
}

fn strip_leading_article(value: &str) -> &str {
    for article in LEADING_ARTICLES {
        if let Some(rest) = value
            .strip_prefix(article)
            .and_then(|rest| rest.strip_prefix(' '))
        {
            if !rest.is_empty() {
                return rest;
            }
        }
    }
    value
}

fn strip_edition_suffix(value: &str) -> &str {
    for suffix in EDITION_SUFFIXES {
        if let Some(head) = value
            .strip_suffix(suffix)
            .and_then(|head| head.strip_suffix(' '))
        {
            if !head.is_empty() {
                return head;
            }
        }
    }
    value
}

fn strip_publisher_prefix(value: &str) -> &str {
    for prefix in PUBLISHER_PREFIXES {
        if let Some(rest) = value
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix(' '))
        {
            if !rest.is_empty() {
                return rest;
            }
        }
    }
    value
}

fn expand_acronym(value: &str) -> Option<&'static str> {
    ACRONYMS
        .iter()
        .find(|(acronym, _)| *acronym == value)
        .map(|(_, expansion)| *expansion)
}

fn roman_to_arabic(token: &str) -> Option<&'static str> {
    ROMAN_NUMERALS
        .iter()
        .find(|(roman, _)| *roman == token)
        .map(|(_, arabic)| *arabic)
}

/// Converts I–X tokens that follow the first token. The leading token is
/// never converted, so titles such as "X Men" or "V Rising" keep their name.
fn convert_roman_numerals(value: &str) -> String {
    value
        .split(' ')
        .enumerate()
        .map(|(index, token)| match roman_to_arabic(token) {
            Some(arabic) if index > 0 => arabic,
            _ => token,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits a trailing release year from a title, e.g. `Doom (2016)` becomes
/// `("Doom", 2016)`. Recognizes `(YYYY)`, `[YYYY]`, and a bare trailing year.
pub fn extract_release_year(raw: &str) -> Option<(String, u16)> {
    let trimmed = raw.trim();
    let (base, year_text) = if let Some(inner) = trimmed
        .strip_suffix(')')
        .and_then(|rest| rest.rsplit_once('('))
    {
        (inner.0, inner.1)
    } else if let Some(inner) = trimmed
        .strip_suffix(']')
        .and_then(|rest| rest.rsplit_once('['))
    {
        (inner.0, inner.1)
    } else {
        trimmed.rsplit_once(' ')?
    };

    let year_text = year_text.trim();
    if year_text.len() != 4 || !year_text.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    let year: u16 = year_text.parse().ok()?;
    if !(MIN_RELEASE_YEAR..=MAX_RELEASE_YEAR).contains(&year) {
        return None;
    }
    let base = base.trim();
    if base.is_empty() {
        return None;
    }
    Some((base.to_string(), year))
}
