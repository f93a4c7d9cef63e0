use std::future::Future;
use std::pin::Pin;

pub type CrawlFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// A data crawler run once per crawl cycle.
///
/// Failures are the crawler's own business: `crawl` reports through logging
/// and never returns an error to the scheduler.
pub trait Crawler: Send + Sync {
    fn name(&self) -> &str;
    fn crawl(&self) -> CrawlFuture<'_>;
}
