//! Resolves loosely written game titles to catalog records across several
//! sources, with caching, rate limiting, and retries.

pub mod acquisition;
pub mod bootstrap;
pub mod cache_store;
pub mod config;
pub mod config_persistence;
pub mod error;
pub mod matching;
pub mod protocol;
pub mod sources;
