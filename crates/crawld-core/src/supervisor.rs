use crate::catalog::Catalog;
use crate::checkpoint::{CheckpointWriter, read_checkpoint};
use crate::config::AppConfig;
use crate::crawl_cycle::run_crawlers;
use crate::crawler::Crawler;
use crate::errbag::ErrBag;
use crate::fetch_engine::Fetcher;
use crate::paths::checkpoint_path;
use crate::repo_registry::RepoRegistry;
use anyhow::{Context, anyhow};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Owns everything that has to be torn down when the daemon stops: the
/// cancellation token, the checkpoint writer and the error bag.
///
/// `release` cancels, waits for the checkpoint flush and deflates the bag.
/// If the guard is dropped without `release`, cancellation and deflation
/// still happen and the writer flushes on its own.
pub struct FetchGuard {
    shutdown: CancellationToken,
    bag: ErrBag,
    writer: Option<JoinHandle<anyhow::Result<()>>>,
    tasks: Vec<AbortHandle>,
    released: bool,
}

impl FetchGuard {
    pub fn new(shutdown: CancellationToken, bag: ErrBag) -> Self {
        Self {
            shutdown,
            bag,
            writer: None,
            tasks: Vec::new(),
            released: false,
        }
    }

    pub fn set_writer(&mut self, writer: JoinHandle<anyhow::Result<()>>) {
        self.writer = Some(writer);
    }

    /// Tasks aborted on release; their in-flight blocking work is abandoned.
    pub fn track(&mut self, task: AbortHandle) {
        self.tasks.push(task);
    }

    pub async fn release(mut self) {
        self.released = true;
        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(writer) = self.writer.take() {
            match writer.await {
                Ok(Ok(())) => debug!("checkpoint writer stopped"),
                Ok(Err(err)) => error!(error = %format!("{err:#}"), "checkpoint writer failed"),
                Err(err) => error!(error = %err, "checkpoint writer task failed"),
            }
        }
        self.bag.deflate();
    }
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.bag.deflate();
    }
}

/// Starts the crawl loop and the fetch loop and keeps them running until a
/// shutdown signal or a fatal fetch error.
pub struct Supervisor {
    config: AppConfig,
    catalog: Arc<dyn Catalog>,
    registry: Arc<RepoRegistry>,
    crawlers: Vec<Arc<dyn Crawler>>,
    disable_crawlers: bool,
    disable_fetcher: bool,
}

impl Supervisor {
    pub fn new(
        config: AppConfig,
        catalog: Arc<dyn Catalog>,
        registry: Arc<RepoRegistry>,
        crawlers: Vec<Arc<dyn Crawler>>,
    ) -> Self {
        Self {
            config,
            catalog,
            registry,
            crawlers,
            disable_crawlers: false,
            disable_fetcher: false,
        }
    }

    pub fn disable_crawlers(mut self, disable: bool) -> Self {
        self.disable_crawlers = disable;
        self
    }

    pub fn disable_fetcher(mut self, disable: bool) -> Self {
        self.disable_fetcher = disable;
        self
    }

    /// Returns `Ok(())` once `shutdown` resolves, or the fatal error that
    /// stopped the fetcher.
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let token = CancellationToken::new();
        let bag = ErrBag::new(self.config.errbag_config())?;
        bag.inflate();
        let mut guard = FetchGuard::new(token.clone(), bag.clone());

        if self.disable_crawlers {
            info!("crawlers disabled");
        } else if self.crawlers.is_empty() {
            info!("no crawlers configured");
        } else {
            let crawl_task = tokio::spawn(run_crawlers(
                self.crawlers.clone(),
                self.config.crawling_interval(),
                token.clone(),
            ));
            guard.track(crawl_task.abort_handle());
        }

        let fetch_task = if self.disable_fetcher {
            info!("fetcher disabled");
            None
        } else {
            let ckpt = checkpoint_path(&self.config.clone_dir);
            let start_id = read_checkpoint(&ckpt);
            let writer = CheckpointWriter::open(&ckpt)
                .with_context(|| format!("open checkpoint {}", ckpt.display()))?;
            let (completions, completed) = mpsc::channel(1);
            guard.set_writer(tokio::spawn(writer.run(completed, token.clone())));

            let fetcher = Fetcher::new(
                Arc::clone(&self.catalog),
                Arc::clone(&self.registry),
                bag,
                self.config.fetch_options(),
                completions,
            );
            let task = tokio::spawn(fetcher.run(start_id, token.clone()));
            guard.track(task.abort_handle());
            Some(task)
        };

        let fetch_done = async move {
            match fetch_task {
                Some(task) => match task.await {
                    Ok(result) => result,
                    Err(err) => Err(anyhow!("fetcher task failed: {err}")),
                },
                None => std::future::pending().await,
            }
        };

        let outcome = tokio::select! {
            _ = shutdown => {
                info!("shutdown requested; stopping");
                Ok(())
            }
            result = fetch_done => {
                if result.is_ok() {
                    warn!("fetcher stopped without a shutdown request");
                }
                result
            }
        };
        guard.release().await;
        outcome
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::CrawlFuture;
    use crate::errbag::ErrBagConfig;
    use crate::repo::Repository;
    use crate::testing::{FakeCatalog, FakeRepo, record};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::oneshot;

    struct CountingCrawler {
        runs: AtomicUsize,
    }

    impl Crawler for CountingCrawler {
        fn name(&self) -> &str {
            "counting"
        }

        fn crawl(&self) -> CrawlFuture<'_> {
            Box::pin(async move {
                self.runs.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    fn config(clone_dir: &Path, workers: usize) -> AppConfig {
        serde_json::from_value(serde_json::json!({
            "clone_dir": clone_dir,
            "max_fetcher_workers": workers,
            "throttler_wait_secs": 1,
        }))
        .unwrap()
    }

    fn fake_registry() -> Arc<RepoRegistry> {
        let mut registry = RepoRegistry::empty();
        registry.register("fake", |path, _url| {
            let repo: Arc<dyn Repository> = Arc::new(FakeRepo::new(path));
            repo
        });
        Arc::new(registry)
    }

    async fn wait_for(mut ready: impl FnMut() -> bool) {
        for _ in 0..1000 {
            if ready() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn signal_shutdown_flushes_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let catalog = Arc::new(FakeCatalog::new(vec![
            record(1, "host/a"),
            record(2, "host/b"),
            record(3, "host/c"),
        ]));
        let crawler = Arc::new(CountingCrawler {
            runs: AtomicUsize::new(0),
        });
        let supervisor = Supervisor::new(
            config(tmp.path(), 1),
            catalog,
            fake_registry(),
            vec![crawler.clone() as Arc<dyn Crawler>],
        );
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(supervisor.run(async move {
            let _ = stopped.await;
        }));

        let ckpt = checkpoint_path(tmp.path());
        wait_for(|| read_checkpoint(&ckpt) == 3).await;
        wait_for(|| crawler.runs.load(Ordering::SeqCst) >= 1).await;
        stop.send(()).unwrap();
        task.await.unwrap().unwrap();

        assert_eq!(read_checkpoint(&ckpt), 3);
        assert!(tmp.path().join("host").join("c").is_dir());
    }

    #[tokio::test]
    async fn catalog_failure_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let supervisor = Supervisor::new(
            config(tmp.path(), 2),
            Arc::new(FakeCatalog::failing()),
            fake_registry(),
            Vec::new(),
        );
        let err = supervisor
            .run(std::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("catalog connection refused"));
    }

    #[tokio::test]
    async fn disabled_fetcher_leaves_no_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let crawler = Arc::new(CountingCrawler {
            runs: AtomicUsize::new(0),
        });
        let supervisor = Supervisor::new(
            config(tmp.path(), 2),
            Arc::new(FakeCatalog::failing()),
            fake_registry(),
            vec![crawler.clone() as Arc<dyn Crawler>],
        )
        .disable_fetcher(true);
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(supervisor.run(async move {
            let _ = stopped.await;
        }));
        wait_for(|| crawler.runs.load(Ordering::SeqCst) >= 1).await;
        stop.send(()).unwrap();
        task.await.unwrap().unwrap();
        assert!(!checkpoint_path(tmp.path()).exists());
    }

    #[tokio::test]
    async fn dropped_guard_cancels_and_deflates() {
        let bag = ErrBag::new(ErrBagConfig {
            throttler_wait: Duration::from_secs(1),
            capacity: 4,
            window: Duration::from_secs(60),
            leak_interval: Duration::from_secs(1),
        })
        .unwrap();
        bag.inflate();
        bag.record("boom");
        let token = CancellationToken::new();
        drop(FetchGuard::new(token.clone(), bag.clone()));
        assert!(token.is_cancelled());
        assert!(bag.is_empty());
    }
}
