use crate::repo::Repository;
use crate::repo_git::GitRepo;
use crate::repo_hg::HgRepo;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub type RepoConstructor = Arc<dyn Fn(PathBuf, String) -> Arc<dyn Repository> + Send + Sync>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown repository kind: {0}")]
    UnknownKind(String),
}

/// Resolves a VCS kind name from the catalog to a repository driver.
#[derive(Clone)]
pub struct RepoRegistry {
    constructors: HashMap<String, RepoConstructor>,
}

impl Default for RepoRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RepoRegistry {
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("git", |path, url| Arc::new(GitRepo::new(path, url)));
        registry.register("hg", |path, url| Arc::new(HgRepo::new(path, url)));
        registry
    }

    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, kind: &str, constructor: F)
    where
        F: Fn(PathBuf, String) -> Arc<dyn Repository> + Send + Sync + 'static,
    {
        self.constructors
            .insert(kind.to_ascii_lowercase(), Arc::new(constructor));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(&kind.to_ascii_lowercase())
    }

    pub fn open(
        &self,
        kind: &str,
        path: PathBuf,
        url: String,
    ) -> Result<Arc<dyn Repository>, RegistryError> {
        let constructor = self
            .constructors
            .get(&kind.to_ascii_lowercase())
            .ok_or_else(|| RegistryError::UnknownKind(kind.to_string()))?;
        Ok(constructor(path, url))
    }
}
