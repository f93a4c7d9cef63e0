pub mod github;
mod github_models;
mod github_paging;
mod github_scope;
mod http;
pub mod registry;

pub use github::{GithubCrawler, GithubOptions};
pub use registry::CrawlerRegistry;
