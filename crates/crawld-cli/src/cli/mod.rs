use crate::logging;
use anyhow::Context;
use clap::Parser;
use crawld_core::catalog::{Catalog, JsonCatalog};
use crawld_core::config::{AppConfig, check_clone_dir};
use crawld_core::repo_registry::RepoRegistry;
use crawld_core::supervisor::{Supervisor, shutdown_signal};
use crawld_crawlers::CrawlerRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

mod app;
mod args;

use args::*;

pub use app::run;
