use crate::github_paging::fetch_repos_page;
use crate::github_scope::{OwnerKind, language_matches};
use anyhow::{Context, bail};
use crawld_core::catalog::{Catalog, NewRepo};
use crawld_core::crawler::{CrawlFuture, Crawler};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GithubOptions {
    #[serde(default)]
    pub orgs: Vec<String>,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Environment variable holding a GitHub token.
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub include_forks: bool,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

/// Lists the repositories of the configured GitHub organizations and users
/// and adds the new ones to the catalog.
pub struct GithubCrawler {
    client: Client,
    options: GithubOptions,
    token: Option<String>,
    catalog: Arc<dyn Catalog>,
}

impl GithubCrawler {
    pub fn new(options: GithubOptions, catalog: Arc<dyn Catalog>) -> anyhow::Result<Self> {
        if options.orgs.is_empty() && options.users.is_empty() {
            bail!("github crawler needs at least one org or user");
        }
        let token = match options.token_env.as_deref() {
            Some(var) => match std::env::var(var) {
                Ok(token) if !token.trim().is_empty() => Some(token.trim().to_string()),
                _ => {
                    warn!(env = var, "GitHub token not set; crawling unauthenticated");
                    None
                }
            },
            None => None,
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build GitHub HTTP client")?;
        Ok(Self {
            client,
            options,
            token,
            catalog,
        })
    }

    fn owners(&self) -> impl Iterator<Item = (&str, OwnerKind)> {
        let orgs = self.options.orgs.iter().map(|org| (org.as_str(), OwnerKind::Org));
        let users = self
            .options
            .users
            .iter()
            .map(|user| (user.as_str(), OwnerKind::User));
        orgs.chain(users)
    }

    async fn crawl_owner(&self, owner: &str, kind: OwnerKind) -> anyhow::Result<usize> {
        let mut page = 1;
        let mut found = Vec::new();
        loop {
            let batch = fetch_repos_page(
                &self.client,
                &self.options.api_url,
                owner,
                kind,
                self.token.as_deref(),
                page,
            )
            .await?;
            if batch.not_found {
                bail!("GitHub {kind} not found: {owner}");
            }
            found.extend(
                batch
                    .repos
                    .into_iter()
                    .filter(|repo| self.options.include_forks || !repo.fork)
                    .filter(|repo| language_matches(&self.options.languages, repo.language.as_deref()))
                    .map(|repo| repo.into_new_repo()),
            );
            match batch.next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }
        debug!(owner, %kind, repos = found.len(), "listed GitHub repositories");
        self.record(found).await
    }

    async fn record(&self, repos: Vec<NewRepo>) -> anyhow::Result<usize> {
        if repos.is_empty() {
            return Ok(0);
        }
        let catalog = Arc::clone(&self.catalog);
        tokio::task::spawn_blocking(move || catalog.record_repos(repos))
            .await
            .context("join catalog insert")?
            .context("record repositories in catalog")
    }
}

impl Crawler for GithubCrawler {
    fn name(&self) -> &str {
        "github"
    }

    fn crawl(&self) -> CrawlFuture<'_> {
        Box::pin(async move {
            for (owner, kind) in self.owners() {
                match self.crawl_owner(owner, kind).await {
                    Ok(added) => info!(owner, %kind, added, "GitHub owner crawled"),
                    Err(err) => {
                        error!(owner, %kind, error = %format!("{err:#}"), "GitHub crawl failed")
                    }
                }
            }
        })
    }
}
