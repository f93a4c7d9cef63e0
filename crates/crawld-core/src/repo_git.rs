use crate::repo::{RepoError, Repository};
use git2::{
    ErrorClass, ErrorCode, FetchOptions, Oid, RemoteCallbacks,
    build::{CheckoutBuilder, RepoBuilder},
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

pub struct GitRepo {
    path: PathBuf,
    url: String,
}

impl GitRepo {
    pub fn new(path: PathBuf, url: String) -> Self {
        Self { path, url }
    }
}

impl Repository for GitRepo {
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
        info!(path = %self.path.display(), url = %self.url, "cloning git repo");
        let mut fo = FetchOptions::new();
        fo.remote_callbacks(RemoteCallbacks::new());
        let mut builder = RepoBuilder::new();
        builder.fetch_options(fo);
        builder
            .clone(&self.url, &self.path)
            .map_err(|err| map_git_error("clone", err))?;
        Ok(())
    }

    fn update(&self) -> Result<(), RepoError> {
        let repo = git2::Repository::open(&self.path).map_err(|err| map_git_error("open", err))?;
        ensure_origin_remote(&repo, &self.url)?;
        fetch_origin(&repo)?;
        fast_forward_head(&repo)
    }

    /// Runs `git gc --auto`. Cleanup comes after archiving, so when archiving
    /// is enabled the working copy is already packed away and gc never runs.
    fn cleanup(&self) -> Result<(), RepoError> {
        if !self.path.exists() {
            return Ok(());
        }
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.path)
            .args(["gc", "--auto", "--quiet"])
            .output()
            .map_err(|err| RepoError::Operation(format!("run git gc: {err}")))?;
        if !output.status.success() {
            return Err(RepoError::Operation(format!(
                "git gc failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

pub(crate) fn map_git_error(action: &str, err: git2::Error) -> RepoError {
    let message = format!("{action}: {}", err.message());
    match err.class() {
        ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssh | ErrorClass::Ssl => {
            RepoError::Network(message)
        }
        _ => RepoError::Operation(message),
    }
}

fn ensure_origin_remote(repo: &git2::Repository, remote_url: &str) -> Result<(), RepoError> {
    match repo.find_remote("origin") {
        Ok(remote) => {
            let current = remote.url().unwrap_or_default();
            if current != remote_url {
                repo.remote_set_url("origin", remote_url)
                    .map_err(|err| map_git_error("update origin remote url", err))?;
            }
        }
        Err(_) => {
            repo.remote("origin", remote_url)
                .map_err(|err| map_git_error("create origin remote", err))?;
        }
    }
    Ok(())
}

fn fetch_origin(repo: &git2::Repository) -> Result<(), RepoError> {
    let mut remote = repo
        .find_remote("origin")
        .map_err(|err| map_git_error("find origin remote", err))?;
    let mut fo = FetchOptions::new();
    fo.remote_callbacks(RemoteCallbacks::new());
    debug!("fetching origin");
    remote
        .fetch(&[] as &[&str], Some(&mut fo), None)
        .map_err(|err| map_git_error("fetch origin", err))?;
    Ok(())
}

fn fast_forward_head(repo: &git2::Repository) -> Result<(), RepoError> {
    let head = match repo.head() {
        Ok(head) => head,
        Err(err) if err.code() == ErrorCode::UnbornBranch => return Ok(()),
        Err(err) => return Err(map_git_error("read HEAD", err)),
    };
    if !head.is_branch() {
        debug!("detached HEAD; nothing to fast-forward");
        return Ok(());
    }
    let Some(branch) = head.shorthand().map(str::to_string) else {
        return Err(RepoError::Operation("HEAD branch name is not utf-8".into()));
    };
    let Some(local_oid) = head.target() else {
        return Err(RepoError::Operation("HEAD has no target".into()));
    };

    let remote_ref = format!("refs/remotes/origin/{branch}");
    let remote_oid = match repo.refname_to_id(&remote_ref) {
        Ok(oid) => oid,
        Err(_) => {
            warn!(remote_ref = %remote_ref, "branch missing on origin; keeping local copy");
            return Ok(());
        }
    };
    if local_oid == remote_oid {
        return Ok(());
    }

    let (ahead, _behind) = repo
        .graph_ahead_behind(local_oid, remote_oid)
        .map_err(|err| map_git_error("compare local and remote", err))?;
    if ahead > 0 {
        return Err(RepoError::Operation(format!(
            "branch {branch} diverged from origin"
        )));
    }

    update_branch_ref(repo, &format!("refs/heads/{branch}"), remote_oid)?;
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_head(Some(&mut checkout))
        .map_err(|err| map_git_error("checkout head", err))?;
    Ok(())
}

fn update_branch_ref(repo: &git2::Repository, local_ref: &str, target: Oid) -> Result<(), RepoError> {
    let mut reference = repo
        .find_reference(local_ref)
        .map_err(|err| map_git_error("find local ref", err))?;
    reference
        .set_target(target, "fast-forward")
        .map_err(|err| map_git_error("set local ref target", err))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{Commit, Signature};
    use tempfile::TempDir;

    #[test]
    fn clone_then_update_fast_forwards() {
        let tmp = TempDir::new().unwrap();
        let source_path = tmp.path().join("source");
        let source = git2::Repository::init(&source_path).unwrap();
        let base = commit_file(&source, "base.txt", "base", &[]);

        let dest = tmp.path().join("clones").join("repo");
        let repo = GitRepo::new(dest.clone(), source_path.to_string_lossy().into_owned());
        repo.clone_repo().unwrap();
        assert!(dest.join("base.txt").exists());

        let base_commit = source.find_commit(base).unwrap();
        commit_file(&source, "next.txt", "next", &[&base_commit]);
        repo.update().unwrap();
        assert!(dest.join("next.txt").exists());
    }

    #[test]
    fn cleanup_after_archiving_is_a_no_op() {
        let tmp = TempDir::new().unwrap();
        let repo = GitRepo::new(tmp.path().join("packed"), "https://example.com/r.git".into());
        repo.cleanup().unwrap();
    }

    #[test]
    fn diverged_copy_is_an_operation_error() {
        let tmp = TempDir::new().unwrap();
        let source_path = tmp.path().join("source");
        let source = git2::Repository::init(&source_path).unwrap();
        let base = commit_file(&source, "base.txt", "base", &[]);

        let dest = tmp.path().join("repo");
        let repo = GitRepo::new(dest.clone(), source_path.to_string_lossy().into_owned());
        repo.clone_repo().unwrap();

        let local = git2::Repository::open(&dest).unwrap();
        let local_head = local.head().unwrap().target().unwrap();
        let local_commit = local.find_commit(local_head).unwrap();
        commit_file(&local, "local.txt", "local", &[&local_commit]);

        let base_commit = source.find_commit(base).unwrap();
        commit_file(&source, "remote.txt", "remote", &[&base_commit]);

        let err = repo.update().unwrap_err();
        assert!(!err.is_network());
        assert!(err.to_string().contains("diverged"));
    }

    #[test]
    fn update_of_non_repository_is_not_network() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("junk.txt"), "junk").unwrap();
        let repo = GitRepo::new(tmp.path().to_path_buf(), "https://example.com/r.git".into());
        let err = repo.update().unwrap_err();
        assert!(!err.is_network());
    }

    #[test]
    fn ensure_origin_updates_url() {
        let tmp = TempDir::new().unwrap();
        let repo = git2::Repository::init(tmp.path()).unwrap();
        repo.remote("origin", "https://example.com/old.git").unwrap();
        ensure_origin_remote(&repo, "https://example.com/new.git").unwrap();
        let remote = repo.find_remote("origin").unwrap();
        assert_eq!(remote.url(), Some("https://example.com/new.git"));
    }

    #[test]
    fn transport_classes_map_to_network() {
        let err = git2::Error::new(ErrorCode::GenericError, ErrorClass::Net, "connection refused");
        assert!(map_git_error("fetch origin", err).is_network());
        let err = git2::Error::new(ErrorCode::GenericError, ErrorClass::Odb, "object missing");
        assert!(!map_git_error("fetch origin", err).is_network());
    }

    fn commit_file(
        repo: &git2::Repository,
        name: &str,
        contents: &str,
        parents: &[&Commit<'_>],
    ) -> Oid {
        let workdir = repo.workdir().unwrap();
        std::fs::write(workdir.join(name), contents).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("tester", "tester@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "commit", &tree, parents)
            .unwrap()
    }
}
