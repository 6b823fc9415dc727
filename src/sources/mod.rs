//! Catalog source adapters.
//!
//! Every adapter is synchronous; the orchestrator moves calls onto blocking
//! threads and enforces time budgets around them.

pub mod curated;
pub mod duration_text;
pub mod scraped;
pub mod structured;

use std::io::Read;
use std::time::Duration;

use crate::error::SourceError;
use crate::protocol::{CandidateRecord, SourceKind};

pub use curated::CuratedSource;
pub use scraped::ScrapedSource;
pub use structured::StructuredSource;

pub(crate) const DEFAULT_USER_AGENT: &str = concat!("titlelink/", env!("CARGO_PKG_VERSION"));

/// One place the orchestrator can ask for candidate records.
pub trait CatalogSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Candidates the source considers relevant to `name`, in source order.
    /// An empty list means the source answered but knows nothing.
    fn query(&self, name: &str) -> Result<Vec<CandidateRecord>, SourceError>;
}

pub(crate) fn http_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(timeout.min(Duration::from_secs(5)))
        .timeout_read(timeout)
        .timeout_write(timeout)
        .build()
}

/// A 503 the site announces as planned downtime; retrying within one lookup
/// cannot help.
fn is_maintenance(response: &ureq::Response) -> bool {
    response
        .status_text()
        .to_ascii_lowercase()
        .contains("maintenance")
}

pub(crate) fn classify_ureq_failure(error: &ureq::Error) -> SourceError {
    let message = format!("request failed: {error}");
    match error {
        ureq::Error::Status(code, response) => match code {
            429 => SourceError::RateLimited(message),
            503 if is_maintenance(response) => SourceError::Unavailable(message),
            408 | 500 | 502 | 503 | 504 => SourceError::Transient(message),
            404 | 410 | 401 | 403 | 451 => SourceError::Unavailable(message),
            400..=499 => SourceError::Invalid(message),
            _ => SourceError::Transient(message),
        },
        ureq::Error::Transport(transport) => {
            let lowered = transport.to_string().to_ascii_lowercase();
            if lowered.contains("timed out") || lowered.contains("timeout") {
                return SourceError::Transient(message);
            }
            match transport.kind() {
                ureq::ErrorKind::ConnectionFailed | ureq::ErrorKind::Io => {
                    SourceError::Transient(message)
                }
                _ => SourceError::Unavailable(message),
            }
        }
    }
}

fn classify_io_timeout(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    ) || error.to_string().to_ascii_lowercase().contains("timed out")
}

pub(crate) fn read_body(response: ureq::Response) -> Result<String, SourceError> {
    let mut body = String::new();
    response
        .into_reader()
        .read_to_string(&mut body)
        .map_err(|error| {
            let message = format!("failed to read response: {error}");
            if classify_io_timeout(&error) {
                SourceError::Transient(message)
            } else {
                SourceError::Unavailable(message)
            }
        })?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_names_crate_and_version() {
        assert_eq!(
            DEFAULT_USER_AGENT,
            format!("titlelink/{}", env!("CARGO_PKG_VERSION"))
        );
    }

    #[test]
    fn test_status_codes_map_to_retry_classes() {
        let status = |code: u16| {
            let response = ureq::Response::new(code, "status", "")
                .expect("synthetic response should build");
            classify_ureq_failure(&ureq::Error::Status(code, response))
        };
        assert!(matches!(status(429), SourceError::RateLimited(_)));
        assert!(matches!(status(503), SourceError::Transient(_)));
        let maintenance = ureq::Response::new(503, "Down For Maintenance", "")
            .expect("synthetic response should build");
        assert!(matches!(
            classify_ureq_failure(&ureq::Error::Status(503, maintenance)),
            SourceError::Unavailable(_)
        ));
        assert!(matches!(status(404), SourceError::Unavailable(_)));
        assert!(matches!(status(422), SourceError::Invalid(_)));
        assert!(matches!(status(599), SourceError::Transient(_)));
    }
}
