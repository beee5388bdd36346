use crate::models::Source;
use crate::scrapers::types::RawListing;
use anyhow::Result;
use async_trait::async_trait;

/// A browsing session that can load pages. One is opened per job.
#[async_trait]
pub trait Session: Send {
    /// Navigate to `url` and return the rendered HTML
    async fn fetch(&mut self, url: &str) -> Result<String>;
}

/// Opens fresh sessions for the orchestrator
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Session>>;
}

/// Common trait for all listing sources.
/// New portals plug in by implementing this and registering with the
/// [`AdapterRegistry`](crate::scrapers::AdapterRegistry).
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Scrape listings starting at `url`, following at most `max_pages`
    /// result pages (0 = unlimited)
    async fn scrape(
        &self,
        session: &mut dyn Session,
        url: &str,
        max_pages: u32,
    ) -> Result<Vec<RawListing>>;

    /// The source this adapter serves
    fn source(&self) -> Source;
}
