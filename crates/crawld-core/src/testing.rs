use crate::catalog::{Catalog, CatalogQuery, CatalogRecord, NewRepo};
use crate::repo::{RepoError, Repository};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Call {
    Clone,
    Update,
    Cleanup,
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum Behavior {
    Succeed,
    FailNetwork,
    FailOperation,
}

impl Behavior {
    fn result(self, action: &str) -> Result<(), RepoError> {
        match self {
            Behavior::Succeed => Ok(()),
            Behavior::FailNetwork => Err(RepoError::Network(format!("{action}: unreachable"))),
            Behavior::FailOperation => Err(RepoError::Operation(format!("{action}: broken"))),
        }
    }
}

/// Repository double that materializes a file on successful clone and keeps
/// a log of every call.
pub(crate) struct FakeRepo {
    path: PathBuf,
    url: String,
    clone: Mutex<Vec<Behavior>>,
    update: Behavior,
    cleanup: Behavior,
    calls: Mutex<Vec<Call>>,
}

impl FakeRepo {
    pub(crate) fn new(path: PathBuf) -> Self {
        let url = format!("fake://{}", path.display());
        Self {
            path,
            url,
            clone: Mutex::new(Vec::new()),
            update: Behavior::Succeed,
            cleanup: Behavior::Succeed,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Results for successive clone attempts; attempts past the end succeed.
    pub(crate) fn with_clone(self, results: Vec<Behavior>) -> Self {
        *self.clone.lock().unwrap() = results;
        self
    }

    pub(crate) fn with_update(mut self, behavior: Behavior) -> Self {
        self.update = behavior;
        self
    }

    pub(crate) fn with_cleanup(mut self, behavior: Behavior) -> Self {
        self.cleanup = behavior;
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn materialize(path: &Path) {
        fs::create_dir_all(path).unwrap();
        fs::write(path.join("HEAD"), "ref: refs/heads/main").unwrap();
    }
}

impl Repository for FakeRepo {
    fn url(&self) -> &str {
        &self.url
    }

    fn abs_path(&self) -> &Path {
        &self.path
    }

    fn clone_repo(&self) -> Result<(), RepoError> {
        self.calls.lock().unwrap().push(Call::Clone);
        let behavior = {
            let mut queued = self.clone.lock().unwrap();
            if queued.is_empty() {
                Behavior::Succeed
            } else {
                queued.remove(0)
            }
        };
        behavior.result("clone")?;
        Self::materialize(&self.path);
        Ok(())
    }

    fn update(&self) -> Result<(), RepoError> {
        self.calls.lock().unwrap().push(Call::Update);
        self.update.result("update")
    }

    fn cleanup(&self) -> Result<(), RepoError> {
        self.calls.lock().unwrap().push(Call::Cleanup);
        self.cleanup.result("cleanup")
    }
}

/// In-memory catalog that remembers every query it served.
pub(crate) struct FakeCatalog {
    records: Mutex<Vec<CatalogRecord>>,
    queries: Mutex<Vec<CatalogQuery>>,
    fail: bool,
}

impl FakeCatalog {
    pub(crate) fn new(records: Vec<CatalogRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            queries: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub(crate) fn min_ids(&self) -> Vec<u64> {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .map(|query| query.min_id)
            .collect()
    }
}

impl Catalog for FakeCatalog {
    fn load_repos(&self, query: &CatalogQuery) -> anyhow::Result<Vec<CatalogRecord>> {
        self.queries.lock().unwrap().push(query.clone());
        if self.fail {
            anyhow::bail!("catalog connection refused");
        }
        let mut records: Vec<CatalogRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        records.sort_by_key(|record| record.id);
        Ok(records)
    }

    fn record_repos(&self, repos: Vec<NewRepo>) -> anyhow::Result<usize> {
        let mut records = self.records.lock().unwrap();
        let added = repos.len();
        for repo in repos {
            let id = records.iter().map(|record| record.id).max().unwrap_or(0) + 1;
            records.push(CatalogRecord {
                id,
                vcs: repo.vcs,
                clone_path: repo.clone_path,
                clone_url: repo.clone_url,
                primary_language: repo.primary_language,
            });
        }
        Ok(added)
    }
}

pub(crate) fn record(id: u64, clone_path: &str) -> CatalogRecord {
    CatalogRecord {
        id,
        vcs: "fake".into(),
        clone_path: clone_path.into(),
        clone_url: format!("https://example.com/{clone_path}"),
        primary_language: None,
    }
}
