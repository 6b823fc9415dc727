//! Remote HTML search page.
//!
//! Two page shapes are understood: the current result list and an older card
//! layout some mirrors still serve. The card layout is only tried when the
//! result list yields nothing.

use std::time::Duration;

use log::debug;
use scraper::{ElementRef, Html, Selector};

use crate::error::SourceError;
use crate::protocol::{CandidateRecord, MetricKey, MetricSet, SourceKind};
use crate::sources::duration_text::parse_duration_text;
use crate::sources::{
    classify_ureq_failure, http_agent, read_body, CatalogSource, DEFAULT_USER_AGENT,
};

pub struct ScrapedSource {
    base_url: String,
    timeout: Duration,
    http_client: ureq::Agent,
}

impl ScrapedSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            http_client: http_agent(timeout),
        }
    }

    fn search_url(&self, name: &str) -> String {
        format!(
            "{}/search?q={}",
            self.base_url,
            urlencoding::encode(name.trim())
        )
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn id_from_href(href: &str) -> Option<String> {
    href.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(|segment| segment.split(['?', '#']).next().unwrap_or(segment))
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

fn slug(title: &str) -> String {
    title
        .to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn record_metric(metrics: &mut MetricSet, label: &str, value: &str) {
    if let Some(key) = MetricKey::from_label(label) {
        metrics.insert(key, parse_duration_text(value));
    }
}

fn extract_result_list(document: &Html) -> Vec<CandidateRecord> {
    let (
        Some(item_sel),
        Some(title_sel),
        Some(entry_sel),
        Some(label_sel),
        Some(value_sel),
        Some(platform_sel),
    ) = (
        selector("li.search-result"),
        selector("h3 a"),
        selector(".time-entry"),
        selector(".label"),
        selector(".value"),
        selector(".platform"),
    ) else {
        return Vec::new();
    };

    let mut candidates = Vec::new();
    for item in document.select(&item_sel) {
        let Some(link) = item.select(&title_sel).next() else {
            continue;
        };
        let title = element_text(link);
        if title.is_empty() {
            continue;
        }
        let source_id = link
            .value()
            .attr("data-id")
            .or_else(|| item.value().attr("data-id"))
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .or_else(|| link.value().attr("href").and_then(id_from_href))
            .unwrap_or_else(|| slug(&title));

        let mut metrics = MetricSet::new();
        for entry in item.select(&entry_sel) {
            let label = entry.select(&label_sel).next().map(element_text);
            let value = entry.select(&value_sel).next().map(element_text);
            if let (Some(label), Some(value)) = (label, value) {
                record_metric(&mut metrics, &label, &value);
            }
        }

        let mut record =
            CandidateRecord::new(SourceKind::Scraped, source_id, title).with_metrics(metrics);
        for platform in item.select(&platform_sel).map(element_text) {
            if !platform.is_empty() {
                record = record.with_platform(platform);
            }
        }
        candidates.push(record);
    }
    candidates
}

fn extract_card_layout(document: &Html) -> Vec<CandidateRecord> {
    let (Some(card_sel), Some(title_sel), Some(row_sel), Some(cell_sel)) = (
        selector("div.game-card"),
        selector(".game-title"),
        selector("table tr"),
        selector("td"),
    ) else {
        return Vec::new();
    };

    let mut candidates = Vec::new();
    for card in document.select(&card_sel) {
        let Some(title) = card
            .select(&title_sel)
            .next()
            .map(element_text)
            .filter(|title| !title.is_empty())
        else {
            continue;
        };
        let source_id = card
            .value()
            .attr("data-game-id")
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| slug(&title));

        let mut metrics = MetricSet::new();
        for row in card.select(&row_sel) {
            let cells: Vec<String> = row.select(&cell_sel).map(element_text).collect();
            if let [label, value, ..] = cells.as_slice() {
                record_metric(&mut metrics, label, value);
            }
        }
        candidates.push(
            CandidateRecord::new(SourceKind::Scraped, source_id, title).with_metrics(metrics),
        );
    }
    candidates
}

/// Candidates found in a search results page, in page order.
pub fn extract_candidates(html: &str) -> Vec<CandidateRecord> {
    let document = Html::parse_document(html);
    let primary = extract_result_list(&document);
    if !primary.is_empty() {
        return primary;
    }
    extract_card_layout(&document)
}

impl CatalogSource for ScrapedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Scraped
    }

    fn query(&self, name: &str) -> Result<Vec<CandidateRecord>, SourceError> {
        let url = self.search_url(name);
        let response = self
            .http_client
            .get(&url)
            .set("User-Agent", DEFAULT_USER_AGENT)
            .set("Accept", "text/html")
            .timeout(self.timeout)
            .call()
            .map_err(|error| classify_ureq_failure(&error))?;
        let body = read_body(response)?;
        let candidates = extract_candidates(&body);
        debug!("Scraped: {} candidates for '{}'", candidates.len(), name);
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULT_LIST_PAGE: &str = r#"
        <html><body>
        <ul class="results">
          <li class="search-result">
            <h3><a href="/game/26286" data-id="26286">Hollow Knight</a></h3>
            <span class="platform">PC</span>
            <span class="platform">Nintendo Switch</span>
            <div class="time-entry">
              <span class="label">Main Story</span>
              <span class="value">27½ Hours</span>
            </div>
            <div class="time-entry">
              <span class="label">Main + Extras</span>
              <span class="value">42 Hours</span>
            </div>
            <div class="time-entry">
              <span class="label">Completionist</span>
              <span class="value">--</span>
            </div>
            <div class="time-entry">
              <span class="label">Co-Op</span>
              <span class="value">5 Hours</span>
            </div>
          </li>
          <li class="search-result">
            <h3><a href="/game/99001/">Hollow Knight: Silksong</a></h3>
            <div class="time-entry">
              <span class="label">All Styles</span>
              <span class="value">30–34 Hours</span>
            </div>
          </li>
        </ul>
        </body></html>
    "#;

    const CARD_PAGE: &str = r#"
        <html><body>
          <div class="game-card" data-game-id="7231">
            <span class="game-title">Celeste</span>
            <table>
              <tr><td>Main Story</td><td>8 Hours</td></tr>
              <tr><td>Completionist</td><td>1h 30m</td></tr>
              <tr><td>All Styles</td><td>N/A</td></tr>
            </table>
          </div>
          <div class="game-card">
            <span class="game-title">Celeste Classic</span>
          </div>
        </body></html>
    "#;

    #[test]
    fn test_result_list_shape() {
        let candidates = extract_candidates(RESULT_LIST_PAGE);
        assert_eq!(candidates.len(), 2);

        let first = &candidates[0];
        assert_eq!(first.source_id, "26286");
        assert_eq!(first.display_name, "Hollow Knight");
        assert_eq!(first.source, SourceKind::Scraped);
        assert_eq!(
            first.metrics.get(MetricKey::Main),
            Some(Duration::from_secs(99_000))
        );
        assert_eq!(
            first.metrics.get(MetricKey::MainExtra),
            Some(Duration::from_secs(42 * 3600))
        );
        assert!(first.metrics.contains_key(MetricKey::Completionist));
        assert_eq!(first.metrics.get(MetricKey::Completionist), None);
        assert_eq!(first.metrics.len(), 3);
        assert_eq!(first.platform_tags.len(), 2);

        let second = &candidates[1];
        assert_eq!(second.source_id, "99001");
        assert_eq!(
            second.metrics.get(MetricKey::AllStyles),
            Some(Duration::from_secs(32 * 3600))
        );
    }

    #[test]
    fn test_degraded_card_shape() {
        let candidates = extract_candidates(CARD_PAGE);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].source_id, "7231");
        assert_eq!(
            candidates[0].metrics.get(MetricKey::Completionist),
            Some(Duration::from_secs(90 * 60))
        );
        assert_eq!(candidates[0].metrics.get(MetricKey::AllStyles), None);
        assert_eq!(candidates[1].source_id, "celeste-classic");
        assert!(candidates[1].metrics.is_empty());
    }

    #[test]
    fn test_unrelated_markup_has_no_candidates() {
        assert!(extract_candidates("<html><body><p>No results</p></body></html>").is_empty());
        assert!(extract_candidates("").is_empty());
    }

    #[test]
    fn test_search_url_encodes_query() {
        let source = ScrapedSource::new("https://example.test/", Duration::from_secs(2));
        assert_eq!(
            source.search_url(" Tom Clancy's Rainbow Six® Siege "),
            "https://example.test/search?q=Tom%20Clancy%27s%20Rainbow%20Six%C2%AE%20Siege"
        );
    }
}
