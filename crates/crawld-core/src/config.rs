use crate::errbag::ErrBagConfig;
use crate::fetch_engine::FetchOptions;
use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CrawlerConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub options: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub clone_dir: PathBuf,
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
    #[serde(default = "default_fetch_interval_secs")]
    pub fetch_interval_secs: u64,
    #[serde(default = "default_crawling_interval_secs")]
    pub crawling_interval_secs: u64,
    #[serde(default = "default_max_fetcher_workers")]
    pub max_fetcher_workers: usize,
    #[serde(default)]
    pub fetch_languages: Vec<String>,
    #[serde(default)]
    pub tar_repos: bool,
    #[serde(default = "default_throttler_wait_secs")]
    pub throttler_wait_secs: u64,
    #[serde(default = "default_sliding_window_size")]
    pub sliding_window_size: usize,
    #[serde(default = "default_sliding_window_secs")]
    pub sliding_window_secs: u64,
    #[serde(default = "default_leak_interval_ms")]
    pub leak_interval_ms: u64,
    #[serde(default)]
    pub crawlers: Vec<CrawlerConfig>,
}

fn default_fetch_interval_secs() -> u64 {
    3600
}

fn default_crawling_interval_secs() -> u64 {
    86_400
}

fn default_max_fetcher_workers() -> usize {
    4
}

fn default_throttler_wait_secs() -> u64 {
    60
}

fn default_sliding_window_size() -> usize {
    128
}

fn default_sliding_window_secs() -> u64 {
    600
}

fn default_leak_interval_ms() -> u64 {
    1000
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&data).context("parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.clone_dir.as_os_str().is_empty() {
            bail!("clone_dir must be set");
        }
        if self.max_fetcher_workers == 0 {
            bail!("max_fetcher_workers must be at least 1");
        }
        if self.sliding_window_size == 0 {
            bail!("sliding_window_size must be at least 1");
        }
        if self.leak_interval_ms == 0 {
            bail!("leak_interval_ms must be positive");
        }
        if self.sliding_window_secs == 0 {
            bail!("sliding_window_secs must be positive");
        }
        Ok(())
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.catalog_path
            .clone()
            .unwrap_or_else(|| self.clone_dir.join("catalog.json"))
    }

    pub fn crawling_interval(&self) -> Duration {
        Duration::from_secs(self.crawling_interval_secs)
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            clone_dir: self.clone_dir.clone(),
            languages: self.fetch_languages.clone(),
            workers: self.max_fetcher_workers,
            archive_repos: self.tar_repos,
            interval: Duration::from_secs(self.fetch_interval_secs),
        }
    }

    pub fn errbag_config(&self) -> ErrBagConfig {
        ErrBagConfig {
            throttler_wait: Duration::from_secs(self.throttler_wait_secs),
            capacity: self.sliding_window_size,
            window: Duration::from_secs(self.sliding_window_secs),
            leak_interval: Duration::from_millis(self.leak_interval_ms),
        }
    }
}

/// Creates the clone directory if needed and checks that it is a writable
/// directory.
pub fn check_clone_dir(clone_dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(clone_dir)
        .with_context(|| format!("create clone dir {}", clone_dir.display()))?;
    let metadata = fs::metadata(clone_dir).context("stat clone dir")?;
    if !metadata.is_dir() {
        bail!("clone path must be a directory: {}", clone_dir.display());
    }
    let check_file = clone_dir.join(".crawld-write-check");
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&check_file)
        .with_context(|| format!("clone path must be writable: {}", clone_dir.display()))?;
    fs::remove_file(&check_file).context("remove write check file")?;
    Ok(())
}
