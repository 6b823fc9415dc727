//! Record acquisition: admission control, retries, caching, and the source pipeline.

pub mod cache;
pub mod orchestrator;
pub mod rate_limit;
pub mod retry;

pub use cache::{cache_key, CacheSettings, CacheStats, RecordCache};
pub use orchestrator::{AcquisitionOrchestrator, OrchestratorSettings, ResolveRequest};
pub use rate_limit::SourceRateLimiter;
pub use retry::{RetryExecutor, RetryPolicy};
