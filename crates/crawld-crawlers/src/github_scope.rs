use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OwnerKind {
    Org,
    User,
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerKind::Org => f.write_str("org"),
            OwnerKind::User => f.write_str("user"),
        }
    }
}

pub(crate) fn repos_url(api_url: &str, owner: &str, kind: OwnerKind, page: u32) -> String {
    let api_url = api_url.trim_end_matches('/');
    match kind {
        OwnerKind::Org => format!("{api_url}/orgs/{owner}/repos?per_page=100&page={page}"),
        OwnerKind::User => format!("{api_url}/users/{owner}/repos?per_page=100&page={page}"),
    }
}

pub(crate) fn language_matches(filter: &[String], language: Option<&str>) -> bool {
    if filter.is_empty() {
        return true;
    }
    language.is_some_and(|language| {
        filter
            .iter()
            .any(|wanted| wanted.eq_ignore_ascii_case(language))
    })
}
