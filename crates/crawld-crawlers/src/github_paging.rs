use anyhow::Context;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};

use crate::github_models::RepoItem;
use crate::github_scope::{OwnerKind, repos_url};
use crate::http::send_with_retry;

pub(crate) struct RepoPage {
    pub(crate) repos: Vec<RepoItem>,
    pub(crate) next_page: Option<u32>,
    pub(crate) not_found: bool,
}

pub(crate) async fn fetch_repos_page(
    client: &Client,
    api_url: &str,
    owner: &str,
    kind: OwnerKind,
    token: Option<&str>,
    page: u32,
) -> anyhow::Result<RepoPage> {
    let url = repos_url(api_url, owner, kind, page);
    let mut builder = client
        .get(url)
        .header("User-Agent", "crawld")
        .header("Accept", "application/vnd.github+json");
    if let Some(token) = token {
        builder = builder.bearer_auth(token);
    }
    let response = send_with_retry(
        || builder.try_clone().context("clone request"),
        &[StatusCode::NOT_FOUND],
    )
    .await
    .context("call GitHub list repos")?;
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(RepoPage {
            repos: Vec::new(),
            next_page: None,
            not_found: true,
        });
    }
    let next_page = next_page_from_link_header(response.headers());
    let repos: Vec<RepoItem> = response.json().await.context("decode repos response")?;
    Ok(RepoPage {
        repos,
        next_page,
        not_found: false,
    })
}

/// Page number of the `rel="next"` entry of a `Link` header.
pub(crate) fn next_page_from_link_header(headers: &HeaderMap) -> Option<u32> {
    let link = headers.get("link")?.to_str().ok()?;
    link.split(',')
        .map(str::trim)
        .filter(|part| part.contains("rel=\"next\""))
        .find_map(|part| {
            let start = part.find('<')? + 1;
            let end = part.find('>')?;
            let query = part.get(start..end)?.split_once('?')?.1;
            query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| *key == "page")
                .and_then(|(_, value)| value.parse::<u32>().ok())
        })
}
