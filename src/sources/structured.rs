//! Remote JSON search API.

use std::time::Duration;

use log::debug;
use serde_json::{json, Value};

use crate::error::SourceError;
use crate::protocol::{CandidateRecord, MetricKey, MetricSet, SourceKind};
use crate::sources::{
    classify_ureq_failure, http_agent, read_body, CatalogSource, DEFAULT_USER_AGENT,
};

const METRIC_FIELDS: [(&str, MetricKey); 4] = [
    ("comp_main", MetricKey::Main),
    ("comp_plus", MetricKey::MainExtra),
    ("comp_100", MetricKey::Completionist),
    ("comp_all", MetricKey::AllStyles),
];

pub struct StructuredSource {
    base_url: String,
    page_size: usize,
    timeout: Duration,
    http_client: ureq::Agent,
}

impl StructuredSource {
    pub fn new(base_url: impl Into<String>, page_size: usize, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_size: page_size.max(1),
            timeout,
            http_client: http_agent(timeout),
        }
    }

    fn search_url(&self) -> String {
        format!("{}/api/search", self.base_url)
    }

    fn request_body(&self, name: &str) -> Value {
        let terms: Vec<&str> = name.split_whitespace().collect();
        json!({
            "searchType": "games",
            "searchTerms": terms,
            "searchPage": 1,
            "size": self.page_size,
        })
    }
}

fn metric_seconds(value: &Value) -> Option<Duration> {
    let seconds = value
        .as_f64()
        .or_else(|| value.as_str().and_then(|text| text.trim().parse().ok()))?;
    (seconds.is_finite() && seconds > 0.0).then(|| Duration::from_secs(seconds.round() as u64))
}

fn candidate_from_item(item: &Value) -> Option<CandidateRecord> {
    let source_id = match &item["game_id"] {
        Value::Number(number) => number.to_string(),
        Value::String(text) if !text.trim().is_empty() => text.trim().to_string(),
        _ => return None,
    };
    let display_name = item["game_name"].as_str()?.trim();
    if display_name.is_empty() {
        return None;
    }

    let mut metrics = MetricSet::new();
    for (field, key) in METRIC_FIELDS {
        metrics.insert(key, metric_seconds(&item[field]));
    }
    let mut record =
        CandidateRecord::new(SourceKind::Structured, source_id, display_name).with_metrics(metrics);
    if let Some(platforms) = item["profile_platform"].as_str() {
        for platform in platforms.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            record = record.with_platform(platform);
        }
    }
    Some(record)
}

/// Reads a search response body. Empty and non-JSON bodies mean no results;
/// malformed JSON is reported as the source being unavailable.
pub fn parse_search_response(body: &str) -> Result<Vec<CandidateRecord>, SourceError> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed.starts_with('<') {
        return Ok(Vec::new());
    }
    let parsed: Value = match serde_json::from_str(trimmed) {
        Ok(parsed) => parsed,
        Err(error) if error.is_eof() => return Ok(Vec::new()),
        Err(error) => {
            let snippet: String = trimmed.chars().take(120).collect();
            return Err(SourceError::Unavailable(format!(
                "invalid JSON response: {error}; prefix={snippet}"
            )));
        }
    };
    Ok(parsed["data"]
        .as_array()
        .map(|items| items.iter().filter_map(candidate_from_item).collect())
        .unwrap_or_default())
}

impl CatalogSource for StructuredSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Structured
    }

    fn query(&self, name: &str) -> Result<Vec<CandidateRecord>, SourceError> {
        let url = self.search_url();
        let response = self
            .http_client
            .post(&url)
            .set("User-Agent", DEFAULT_USER_AGENT)
            .set("Accept", "application/json")
            .set("Referer", &self.base_url)
            .timeout(self.timeout)
            .send_json(self.request_body(name))
            .map_err(|error| classify_ureq_failure(&error))?;
        let body = read_body(response)?;
        let candidates = parse_search_response(&body)?;
        debug!(
            "Structured: {} candidates for '{}' from {}",
            candidates.len(),
            name,
            url
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_RESPONSE: &str = r#"{
        "color": "blue",
        "count": 3,
        "data": [
            {
                "game_id": 10270,
                "game_name": "Grand Theft Auto V",
                "comp_main": 114840,
                "comp_plus": 171000,
                "comp_100": 292500,
                "comp_all": 163980,
                "profile_platform": "PC, PlayStation 4, Xbox One"
            },
            {
                "game_id": "4064",
                "game_name": "Grand Theft Auto IV",
                "comp_main": 0,
                "comp_plus": 143000,
                "comp_100": null,
                "comp_all": "120000",
                "profile_platform": ""
            },
            { "game_id": 1, "game_name": "" }
        ]
    }"#;

    #[test]
    fn test_parses_items_and_treats_zero_as_missing() {
        let candidates = parse_search_response(SEARCH_RESPONSE).expect("response should parse");
        assert_eq!(candidates.len(), 2);

        let first = &candidates[0];
        assert_eq!(first.source_id, "10270");
        assert_eq!(first.display_name, "Grand Theft Auto V");
        assert_eq!(first.source, SourceKind::Structured);
        assert_eq!(
            first.metrics.get(MetricKey::Main),
            Some(Duration::from_secs(114_840))
        );
        assert!(first.platform_tags.contains("PlayStation 4"));
        assert_eq!(first.platform_tags.len(), 3);

        let second = &candidates[1];
        assert_eq!(second.source_id, "4064");
        assert!(second.metrics.contains_key(MetricKey::Main));
        assert_eq!(second.metrics.get(MetricKey::Main), None);
        assert_eq!(second.metrics.get(MetricKey::Completionist), None);
        assert_eq!(
            second.metrics.get(MetricKey::AllStyles),
            Some(Duration::from_secs(120_000))
        );
        assert!(second.platform_tags.is_empty());
    }

    #[test]
    fn test_empty_and_markup_bodies_are_no_results() {
        assert_eq!(parse_search_response(""), Ok(Vec::new()));
        assert_eq!(
            parse_search_response("<html><body>maintenance</body></html>"),
            Ok(Vec::new())
        );
        assert_eq!(parse_search_response(r#"{"data": ["#), Ok(Vec::new()));
        assert_eq!(parse_search_response(r#"{"count": 0}"#), Ok(Vec::new()));
    }

    #[test]
    fn test_garbage_body_marks_source_unavailable() {
        let error = parse_search_response("{not json}").expect_err("garbage should fail");
        assert!(matches!(error, SourceError::Unavailable(_)));
    }

    #[test]
    fn test_request_body_splits_terms() {
        let source = StructuredSource::new("https://example.test/", 20, Duration::from_secs(2));
        assert_eq!(source.search_url(), "https://example.test/api/search");
        let body = source.request_body("  Hollow   Knight ");
        assert_eq!(body["searchTerms"], json!(["Hollow", "Knight"]));
        assert_eq!(body["size"], json!(20));
        assert_eq!(body["searchType"], json!("games"));
    }
}
