use std::path::Path;
use thiserror::Error;

/// Failure reported by a repository driver.
///
/// `Network` is transient: nothing local was damaged and the next cycle will
/// try again. `Operation` covers everything else (bad remote, corrupt working
/// copy, missing executable).
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("network error: {0}")]
    Network(String),
    #[error("{0}")]
    Operation(String),
}

impl RepoError {
    pub fn is_network(&self) -> bool {
        matches!(self, RepoError::Network(_))
    }
}

/// A single managed repository as seen by the fetcher.
///
/// Implementations are blocking; the fetcher runs them on the blocking pool.
pub trait Repository: Send + Sync {
    fn url(&self) -> &str;
    fn abs_path(&self) -> &Path;
    fn clone_repo(&self) -> Result<(), RepoError>;
    fn update(&self) -> Result<(), RepoError>;
    fn cleanup(&self) -> Result<(), RepoError>;
}
