use anyhow::{Context, bail};
use crawld_core::catalog::Catalog;
use crawld_core::config::CrawlerConfig;
use crawld_core::crawler::Crawler;
use serde_json::Value;
use std::sync::Arc;

use crate::github::{GithubCrawler, GithubOptions};

/// Names accepted in the `type` field of a crawler entry.
pub const CRAWLER_TYPES: &[&str] = &["github"];

pub struct CrawlerRegistry;

impl Default for CrawlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlerRegistry {
    pub fn new() -> Self {
        Self
    }

    pub fn build(
        &self,
        config: &CrawlerConfig,
        catalog: Arc<dyn Catalog>,
    ) -> anyhow::Result<Arc<dyn Crawler>> {
        match config.kind.to_ascii_lowercase().as_str() {
            "github" => {
                let options: GithubOptions =
                    serde_json::from_value(options_or_empty(&config.options))
                        .context("parse github crawler options")?;
                Ok(Arc::new(GithubCrawler::new(options, catalog)?))
            }
            other => bail!(
                "unknown crawler type: {other} (expected one of: {})",
                CRAWLER_TYPES.join(", ")
            ),
        }
    }

    pub fn build_all(
        &self,
        configs: &[CrawlerConfig],
        catalog: Arc<dyn Catalog>,
    ) -> anyhow::Result<Vec<Arc<dyn Crawler>>> {
        configs
            .iter()
            .map(|config| {
                self.build(config, Arc::clone(&catalog))
                    .with_context(|| format!("create {} crawler", config.kind))
            })
            .collect()
    }
}

fn options_or_empty(options: &Value) -> Value {
    if options.is_null() {
        Value::Object(Default::default())
    } else {
        options.clone()
    }
}
