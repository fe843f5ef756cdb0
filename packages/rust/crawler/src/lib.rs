//! Discovery engine: resumable, deduplicating, bounded web crawl.
//!
//! The crawler starts from a project's seed URL, records every in-scope URL
//! it sees exactly once (keyed by normalized URL, across runs), and streams
//! newly discovered URLs to an observer in batches so downstream validation
//! can be pipelined against a crawl still in progress.

mod engine;

pub use engine::{CrawlOptions, CrawlOutcome, Crawler};

use webcatalog_shared::DiscoveredUrl;

/// Progress surface for a crawl in flight.
///
/// `status` receives human-readable progress strings; `urls_discovered`
/// receives incremental batches of URLs not previously recorded for the
/// project (never duplicates, never previously known URLs).
pub trait CrawlObserver: Send + Sync {
    /// Human-readable progress message.
    fn status(&self, message: &str);
    /// A batch of newly discovered URLs, in discovery order.
    fn urls_discovered(&self, batch: &[DiscoveredUrl]);
}

/// No-op observer for headless/test usage.
pub struct SilentObserver;

impl CrawlObserver for SilentObserver {
    fn status(&self, _message: &str) {}
    fn urls_discovered(&self, _batch: &[DiscoveredUrl]) {}
}
