use crate::repo::{RepoError, Repository};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::info;

const NETWORK_MARKERS: &[&str] = &[
    "abort: error:",
    "connection refused",
    "connection reset",
    "timed out",
    "name or service not known",
    "temporary failure in name resolution",
    "network is unreachable",
    "http error",
];

/// Mercurial repository driven through the `hg` executable.
pub struct HgRepo {
    path: PathBuf,
    url: String,
}

impl HgRepo {
    pub fn new(path: PathBuf, url: String) -> Self {
        Self { path, url }
    }
}

impl Repository for HgRepo {
    fn url(&self) -> &str {
        &self.url
    }

    fn abs_path(&self) -> &Path {
        &self.path
    }

    fn clone_repo(&self) -> Result<(), RepoError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| RepoError::Operation(format!("create clone parent: {err}")))?;
        }
        info!(path = %self.path.display(), url = %self.url, "cloning hg repo");
        let output = Command::new("hg")
            .arg("clone")
            .arg("--quiet")
            .arg(&self.url)
            .arg(&self.path)
            .output()
            .map_err(|err| RepoError::Operation(format!("run hg clone: {err}")))?;
        check_output("hg clone", output)
    }

    fn update(&self) -> Result<(), RepoError> {
        let output = Command::new("hg")
            .arg("--cwd")
            .arg(&self.path)
            .args(["pull", "--update", "--quiet"])
            .output()
            .map_err(|err| RepoError::Operation(format!("run hg pull: {err}")))?;
        check_output("hg pull", output)
    }

    fn cleanup(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

fn check_output(action: &str, output: Output) -> Result<(), RepoError> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(classify_failure(action, &stderr))
}

fn classify_failure(action: &str, stderr: &str) -> RepoError {
    let lowered = stderr.to_ascii_lowercase();
    let message = format!("{action} failed: {stderr}");
    if NETWORK_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        RepoError::Network(message)
    } else {
        RepoError::Operation(message)
    }
}
