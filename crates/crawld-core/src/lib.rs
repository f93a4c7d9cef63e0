pub mod archive;
pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod crawl_cycle;
pub mod crawler;
pub mod errbag;
pub mod fetch_engine;
mod fetch_engine_item;
pub mod fetch_engine_types;
mod fetch_engine_work_items;
mod fetch_engine_workers;
pub mod paths;
pub mod repo;
pub mod repo_git;
pub mod repo_hg;
pub mod repo_registry;
pub mod supervisor;

#[cfg(test)]
mod testing;

pub use catalog::{Catalog, CatalogQuery, CatalogRecord, JsonCatalog, NewRepo};
pub use config::{AppConfig, CrawlerConfig};
pub use crawler::{CrawlFuture, Crawler};
pub use errbag::{ErrBag, ErrBagConfig};
pub use fetch_engine::{FetchOptions, Fetcher};
pub use repo::{RepoError, Repository};
pub use repo_registry::RepoRegistry;
pub use supervisor::{FetchGuard, Supervisor, shutdown_signal};
