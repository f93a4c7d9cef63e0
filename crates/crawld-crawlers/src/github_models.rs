use crawld_core::catalog::NewRepo;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct RepoItem {
    pub(crate) full_name: String,
    pub(crate) clone_url: String,
    #[serde(default)]
    pub(crate) language: Option<String>,
    #[serde(default)]
    pub(crate) fork: bool,
}

impl RepoItem {
    pub(crate) fn into_new_repo(self) -> NewRepo {
        NewRepo {
            vcs: "git".to_string(),
            clone_path: format!("github.com/{}", self.full_name),
            clone_url: self.clone_url,
            primary_language: self.language,
        }
    }
}
