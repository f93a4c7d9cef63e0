use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: u64,
    pub vcs: String,
    pub clone_path: String,
    pub clone_url: String,
    #[serde(default)]
    pub primary_language: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewRepo {
    pub vcs: String,
    pub clone_path: String,
    pub clone_url: String,
    pub primary_language: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct CatalogQuery {
    pub min_id: u64,
    /// Lowercase primary languages; empty means no filter.
    pub languages: Vec<String>,
}

impl CatalogQuery {
    pub fn new(min_id: u64, languages: &[String]) -> Self {
        Self {
            min_id,
            languages: languages.iter().map(|lang| lang.to_lowercase()).collect(),
        }
    }

    pub fn matches(&self, record: &CatalogRecord) -> bool {
        if record.id < self.min_id {
            return false;
        }
        if self.languages.is_empty() {
            return true;
        }
        record
            .primary_language
            .as_deref()
            .map(|lang| self.languages.contains(&lang.to_lowercase()))
            .unwrap_or(false)
    }
}

/// Persistent store of repository records shared by the fetcher and crawlers.
pub trait Catalog: Send + Sync {
    /// Records matching `query`, ordered by ascending id.
    fn load_repos(&self, query: &CatalogQuery) -> anyhow::Result<Vec<CatalogRecord>>;

    /// Inserts repositories not already known by clone URL and returns how
    /// many were added.
    fn record_repos(&self, repos: Vec<NewRepo>) -> anyhow::Result<usize>;
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct CatalogFile {
    next_id: u64,
    repositories: Vec<CatalogRecord>,
}

impl Default for CatalogFile {
    fn default() -> Self {
        Self {
            next_id: 1,
            repositories: Vec::new(),
        }
    }
}

/// Catalog kept in a single JSON document.
pub struct JsonCatalog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonCatalog {
    /// Opens the catalog, creating an empty one if the file does not exist.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let catalog = Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        };
        if !path.exists() {
            info!(path = %path.display(), "creating empty catalog");
            catalog.save(&CatalogFile::default())?;
        } else {
            catalog.read().context("validate catalog")?;
        }
        Ok(catalog)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> anyhow::Result<CatalogFile> {
        let data = fs::read_to_string(&self.path)
            .with_context(|| format!("read catalog {}", self.path.display()))?;
        let file = serde_json::from_str(&data).context("parse catalog")?;
        Ok(file)
    }

    fn save(&self, file: &CatalogFile) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("create catalog directory")?;
        }
        let data = serde_json::to_string_pretty(file).context("serialize catalog")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data).context("write catalog")?;
        fs::rename(&tmp, &self.path).context("replace catalog")?;
        Ok(())
    }
}

impl Catalog for JsonCatalog {
    fn load_repos(&self, query: &CatalogQuery) -> anyhow::Result<Vec<CatalogRecord>> {
        let file = self.read()?;
        let mut records: Vec<CatalogRecord> = file
            .repositories
            .into_iter()
            .filter(|record| query.matches(record))
            .collect();
        records.sort_by_key(|record| record.id);
        Ok(records)
    }

    fn record_repos(&self, repos: Vec<NewRepo>) -> anyhow::Result<usize> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("catalog write lock poisoned"))?;
        let mut file = self.read()?;
        let mut known_urls: HashSet<String> = file
            .repositories
            .iter()
            .map(|record| record.clone_url.clone())
            .collect();
        // Two records must never share a working copy.
        let mut known_paths: HashSet<String> = file
            .repositories
            .iter()
            .map(|record| record.clone_path.clone())
            .collect();
        let mut added = 0;
        for repo in repos {
            if known_urls.contains(&repo.clone_url) || known_paths.contains(&repo.clone_path) {
                debug!(url = %repo.clone_url, path = %repo.clone_path, "repo already in catalog");
                continue;
            }
            known_urls.insert(repo.clone_url.clone());
            known_paths.insert(repo.clone_path.clone());
            let id = file.next_id;
            file.next_id += 1;
            debug!(repo_id = id, url = %repo.clone_url, "adding repo to catalog");
            file.repositories.push(CatalogRecord {
                id,
                vcs: repo.vcs,
                clone_path: repo.clone_path,
                clone_url: repo.clone_url,
                primary_language: repo.primary_language,
            });
            added += 1;
        }
        if added > 0 {
            self.save(&file)?;
        }
        Ok(added)
    }
}
