use crate::catalog::{Catalog, CatalogQuery};
use crate::errbag::ErrBag;
use crate::fetch_engine_types::CycleSummary;
use crate::fetch_engine_work_items::load_work_items;
use crate::fetch_engine_workers::{WorkerContext, run_work_items};
use crate::repo_registry::RepoRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone, Debug)]
pub struct FetchOptions {
    pub clone_dir: PathBuf,
    pub languages: Vec<String>,
    pub workers: usize,
    pub archive_repos: bool,
    pub interval: Duration,
}

/// Periodic driver for the repository fetch cycle.
pub struct Fetcher {
    catalog: Arc<dyn Catalog>,
    registry: Arc<RepoRegistry>,
    bag: ErrBag,
    options: FetchOptions,
    completions: mpsc::Sender<u64>,
}

impl Fetcher {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        registry: Arc<RepoRegistry>,
        bag: ErrBag,
        options: FetchOptions,
        completions: mpsc::Sender<u64>,
    ) -> Self {
        Self {
            catalog,
            registry,
            bag,
            options,
            completions,
        }
    }

    /// Runs cycles until `shutdown` fires. The first cycle resumes from
    /// `start_id`; later cycles rescan the whole catalog. A catalog failure
    /// ends the loop with an error.
    pub async fn run(self, start_id: u64, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mut resume_from = start_id;
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }
            info!(resume_from, "starting the repositories fetcher");
            let summary = self.run_cycle(resume_from).await?;
            resume_from = 0;
            info!(
                cloned = summary.cloned,
                updated = summary.updated,
                recloned = summary.recloned,
                abandoned = summary.abandoned,
                interval_secs = self.options.interval.as_secs(),
                "fetch cycle done; waiting before re-starting the fetcher"
            );
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.options.interval) => {}
            }
        }
    }

    pub async fn run_cycle(&self, resume_from: u64) -> anyhow::Result<CycleSummary> {
        let query = CatalogQuery::new(resume_from, &self.options.languages);
        let work_items = load_work_items(
            Arc::clone(&self.catalog),
            &self.registry,
            &self.options.clone_dir,
            query,
        )
        .await?;
        info!(
            repos = work_items.len(),
            workers = self.options.workers,
            "fetching repositories"
        );
        let ctx = WorkerContext {
            bag: self.bag.clone(),
            archive_repos: self.options.archive_repos,
            completions: self.completions.clone(),
        };
        Ok(run_work_items(work_items, self.options.workers, ctx).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{CheckpointWriter, encode_checkpoint, read_checkpoint};
    use crate::errbag::ErrBagConfig;
    use crate::paths::{checkpoint_path, repo_path};
    use crate::repo::Repository;
    use crate::testing::{Behavior, Call, FakeCatalog, FakeRepo, record};
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::TempDir;

    fn bag() -> ErrBag {
        ErrBag::new(ErrBagConfig {
            throttler_wait: Duration::from_secs(1),
            capacity: 100,
            window: Duration::from_secs(600),
            leak_interval: Duration::from_secs(1),
        })
        .unwrap()
    }

    fn options(clone_dir: &Path, workers: usize) -> FetchOptions {
        FetchOptions {
            clone_dir: clone_dir.to_path_buf(),
            languages: Vec::new(),
            workers,
            archive_repos: false,
            interval: Duration::from_millis(10),
        }
    }

    fn registry_for(repos: Vec<Arc<FakeRepo>>) -> RepoRegistry {
        let by_path: HashMap<PathBuf, Arc<FakeRepo>> = repos
            .into_iter()
            .map(|repo| (repo.abs_path().to_path_buf(), repo))
            .collect();
        let mut registry = RepoRegistry::empty();
        registry.register("fake", move |path, _url| {
            let repo: Arc<dyn Repository> = match by_path.get(&path) {
                Some(repo) => repo.clone(),
                None => Arc::new(FakeRepo::new(path)),
            };
            repo
        });
        registry
    }

    #[tokio::test]
    async fn clone_reclone_and_update_in_one_cycle() {
        let tmp = TempDir::new().unwrap();
        let clone_dir = tmp.path().to_path_buf();

        let fresh = Arc::new(FakeRepo::new(repo_path(&clone_dir, "host/one")));
        let corrupt_path = repo_path(&clone_dir, "host/two");
        FakeRepo::materialize(&corrupt_path);
        let corrupt = Arc::new(FakeRepo::new(corrupt_path).with_update(Behavior::FailOperation));
        let healthy_path = repo_path(&clone_dir, "host/three");
        FakeRepo::materialize(&healthy_path);
        let healthy = Arc::new(FakeRepo::new(healthy_path));

        let catalog = Arc::new(FakeCatalog::new(vec![
            record(1, "host/one"),
            record(2, "host/two"),
            record(3, "host/three"),
        ]));
        let registry = registry_for(vec![fresh.clone(), corrupt.clone(), healthy.clone()]);

        let (tx, mut rx) = mpsc::channel(1);
        let ckpt = checkpoint_path(&clone_dir);
        let mut writer = CheckpointWriter::open(&ckpt).unwrap();
        let collector = tokio::spawn(async move {
            let mut ids = Vec::new();
            while let Some(id) = rx.recv().await {
                writer.write(id).unwrap();
                ids.push(id);
            }
            writer.finish().unwrap();
            ids
        });

        let fetcher = Fetcher::new(catalog, Arc::new(registry), bag(), options(&clone_dir, 2), tx);
        let summary = fetcher.run_cycle(0).await.unwrap();
        drop(fetcher);
        let ids = collector.await.unwrap();

        assert_eq!(fresh.calls(), vec![Call::Clone, Call::Cleanup]);
        assert_eq!(corrupt.calls(), vec![Call::Update, Call::Clone, Call::Cleanup]);
        assert_eq!(healthy.calls(), vec![Call::Update, Call::Cleanup]);
        assert_eq!(summary.cloned, 1);
        assert_eq!(summary.recloned, 1);
        assert_eq!(summary.updated, 1);

        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2, 3]);
        let last = *ids.last().unwrap();
        assert_eq!(
            std::fs::read_to_string(&ckpt).unwrap(),
            encode_checkpoint(last)
        );
    }

    #[tokio::test]
    async fn first_cycle_resumes_from_checkpoint_then_rescans() {
        let tmp = TempDir::new().unwrap();
        let ckpt = checkpoint_path(tmp.path());
        std::fs::write(&ckpt, "00000000000000000010").unwrap();
        let start_id = read_checkpoint(&ckpt);
        assert_eq!(start_id, 10);

        let catalog = Arc::new(FakeCatalog::new(vec![record(4, "a"), record(12, "b")]));
        let (tx, mut rx) = mpsc::channel(1);
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        let fetcher = Fetcher::new(
            catalog.clone(),
            Arc::new(registry_for(Vec::new())),
            bag(),
            options(tmp.path(), 1),
            tx,
        );
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(fetcher.run(start_id, shutdown.clone()));

        for _ in 0..500 {
            if catalog.min_ids().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.cancel();
        task.await.unwrap().unwrap();

        let min_ids = catalog.min_ids();
        assert!(min_ids.len() >= 2);
        assert_eq!(min_ids[0], 10);
        assert!(min_ids[1..].iter().all(|id| *id == 0));
    }

    #[tokio::test]
    async fn catalog_failure_ends_the_loop() {
        let tmp = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let fetcher = Fetcher::new(
            Arc::new(FakeCatalog::failing()),
            Arc::new(registry_for(Vec::new())),
            bag(),
            options(tmp.path(), 2),
            tx,
        );
        let err = fetcher
            .run(0, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("catalog connection refused"));
    }
}
