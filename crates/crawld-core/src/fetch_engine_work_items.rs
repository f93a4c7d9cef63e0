use crate::catalog::{Catalog, CatalogQuery, CatalogRecord};
use crate::fetch_engine_types::WorkItem;
use crate::paths::repo_path;
use crate::repo_registry::RepoRegistry;
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tracing::error;

pub(crate) async fn load_work_items(
    catalog: Arc<dyn Catalog>,
    registry: &RepoRegistry,
    clone_dir: &Path,
    query: CatalogQuery,
) -> anyhow::Result<Vec<WorkItem>> {
    let records = tokio::task::spawn_blocking(move || catalog.load_repos(&query))
        .await
        .context("join catalog load")?
        .context("load repositories from catalog")?;
    Ok(build_work_items(registry, clone_dir, records))
}

/// Records of unknown kind are logged and left out of the cycle.
pub(crate) fn build_work_items(
    registry: &RepoRegistry,
    clone_dir: &Path,
    records: Vec<CatalogRecord>,
) -> Vec<WorkItem> {
    let mut work_items = Vec::with_capacity(records.len());
    for record in records {
        let path = repo_path(clone_dir, &record.clone_path);
        match registry.open(&record.vcs, path, record.clone_url) {
            Ok(repo) => work_items.push(WorkItem {
                id: record.id,
                repo,
            }),
            Err(err) => error!(repo_id = record.id, error = %err, "skipping repository"),
        }
    }
    work_items
}
