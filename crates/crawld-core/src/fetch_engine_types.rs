use crate::paths::{archive_path, is_dir_empty};
use crate::repo::Repository;
use std::path::Path;
use std::sync::Arc;

/// On-disk materialization of a repository at the start of a work item.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RepoState {
    Absent,
    NeedsClone,
    Present,
    Archived,
}

impl RepoState {
    pub fn detect(path: &Path) -> Self {
        if archive_path(path).is_file() {
            return RepoState::Archived;
        }
        if !path.exists() {
            return RepoState::Absent;
        }
        if path.is_dir() && is_dir_empty(path) {
            return RepoState::NeedsClone;
        }
        RepoState::Present
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ItemOutcome {
    Cloned,
    Updated,
    Recloned,
    Abandoned,
}

impl ItemOutcome {
    pub fn is_completed(self) -> bool {
        !matches!(self, ItemOutcome::Abandoned)
    }
}

#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct CycleSummary {
    pub cloned: u32,
    pub updated: u32,
    pub recloned: u32,
    pub abandoned: u32,
}

impl CycleSummary {
    pub(crate) fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Cloned => self.cloned += 1,
            ItemOutcome::Updated => self.updated += 1,
            ItemOutcome::Recloned => self.recloned += 1,
            ItemOutcome::Abandoned => self.abandoned += 1,
        }
    }

    pub(crate) fn merge(&mut self, other: CycleSummary) {
        self.cloned += other.cloned;
        self.updated += other.updated;
        self.recloned += other.recloned;
        self.abandoned += other.abandoned;
    }

    pub fn total(&self) -> u32 {
        self.cloned + self.updated + self.recloned + self.abandoned
    }
}

/// One repository's unit of fetch work for a single cycle.
pub(crate) struct WorkItem {
    pub(crate) id: u64,
    pub(crate) repo: Arc<dyn Repository>,
}
