use crate::crawler::Crawler;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs every crawler concurrently, sleeps `interval`, and repeats until
/// `shutdown` fires.
pub async fn run_crawlers(
    crawlers: Vec<Arc<dyn Crawler>>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }
        run_crawl_cycle(&crawlers).await;
        info!(
            interval_secs = interval.as_secs(),
            "waiting before re-starting the crawlers"
        );
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// One crawl cycle: start all crawlers and wait for every one of them.
pub async fn run_crawl_cycle(crawlers: &[Arc<dyn Crawler>]) {
    let mut running = JoinSet::new();
    for crawler in crawlers {
        let crawler = Arc::clone(crawler);
        info!(crawler = %crawler.name(), "starting crawler");
        running.spawn(async move {
            crawler.crawl().await;
            crawler.name().to_string()
        });
    }
    while let Some(joined) = running.join_next().await {
        match joined {
            Ok(name) => info!(crawler = %name, "crawler finished"),
            Err(err) => warn!(error = %err, "crawler terminated abnormally"),
        }
    }
}
