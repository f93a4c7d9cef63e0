use crate::archive::{create_in_place, extract_in_place};
use crate::errbag::ErrBag;
use crate::fetch_engine_types::{ItemOutcome, RepoState, WorkItem};
use crate::paths::{archive_path, remove_path};
use std::fs;
use tracing::{error, info, warn};

/// Applies the clone/update/archive/cleanup sequence to one work item.
///
/// Blocking; runs on the blocking pool. At most one clone attempt is made per
/// call, including the re-clone after a corrupted update.
pub(crate) fn process_item(item: &WorkItem, bag: &ErrBag, archive_repos: bool) -> ItemOutcome {
    let repo = item.repo.as_ref();
    let path = repo.abs_path();

    if RepoState::detect(path) == RepoState::Archived {
        restore_archive(item, bag);
    }

    let outcome = match RepoState::detect(path) {
        RepoState::Absent | RepoState::NeedsClone | RepoState::Archived => {
            if !clone(item, bag) {
                return ItemOutcome::Abandoned;
            }
            ItemOutcome::Cloned
        }
        RepoState::Present => match update(item, bag) {
            Some(outcome) => outcome,
            None => return ItemOutcome::Abandoned,
        },
    };

    if archive_repos && let Err(err) = create_in_place(path) {
        error!(
            repo_id = item.id,
            path = %path.display(),
            error = %format!("{err:#}"),
            "impossible to create tar archive"
        );
        bag.record(format!("{err:#}"));
    }

    if let Err(err) = repo.cleanup() {
        warn!(repo_id = item.id, path = %path.display(), error = %err, "cleanup failed");
    }

    outcome
}

fn restore_archive(item: &WorkItem, bag: &ErrBag) {
    let path = item.repo.abs_path();
    let archive = archive_path(path);
    if let Err(err) = extract_in_place(&archive) {
        warn!(
            repo_id = item.id,
            archive = %archive.display(),
            error = %format!("{err:#}"),
            "impossible to extract the tar archive; falling back to clone"
        );
        bag.record(format!("{err:#}"));
        let _ = fs::remove_file(&archive);
        let _ = remove_path(path);
    }
}

fn clone(item: &WorkItem, bag: &ErrBag) -> bool {
    let repo = item.repo.as_ref();
    info!(
        repo_id = item.id,
        url = %repo.url(),
        path = %repo.abs_path().display(),
        "cloning"
    );
    match repo.clone_repo() {
        Ok(()) => true,
        Err(err) => {
            error!(
                repo_id = item.id,
                url = %repo.url(),
                path = %repo.abs_path().display(),
                error = %err,
                "impossible to clone; skipping"
            );
            bag.record(&err);
            false
        }
    }
}

fn update(item: &WorkItem, bag: &ErrBag) -> Option<ItemOutcome> {
    let repo = item.repo.as_ref();
    let path = repo.abs_path();
    info!(repo_id = item.id, path = %path.display(), "updating");
    let err = match repo.update() {
        Ok(()) => return Some(ItemOutcome::Updated),
        Err(err) => err,
    };
    warn!(repo_id = item.id, path = %path.display(), error = %err, "impossible to update");
    bag.record(&err);
    if err.is_network() {
        return None;
    }

    info!(repo_id = item.id, path = %path.display(), "attempting to re-clone");
    if let Err(rm_err) = remove_path(path) {
        error!(
            repo_id = item.id,
            path = %path.display(),
            error = %rm_err,
            "cannot remove corrupted copy"
        );
        bag.record(&rm_err);
        return None;
    }
    clone(item, bag).then_some(ItemOutcome::Recloned)
}
