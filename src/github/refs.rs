use crate::types::RepoCoords;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static ISSUE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https://(?:www\.)?github\.com/([\w.-]+)/([\w.-]+)/issues/(\d+)/?$")
        .expect("ISSUE_URL_RE regex should compile")
});

/// A reference to one issue, in any repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IssueRef {
    pub coords: RepoCoords,
    pub number: u64,
}

impl IssueRef {
    pub fn new(coords: RepoCoords, number: u64) -> Self {
        Self { coords, number }
    }

    /// Parses `https://github.com/{owner}/{repo}/issues/{n}`.
    pub fn from_url(url: &str) -> Option<Self> {
        let captures = ISSUE_URL_RE.captures(url.trim())?;
        let number = captures[3].parse().ok()?;
        Some(Self::new(
            RepoCoords::new(&captures[1], &captures[2]),
            number,
        ))
    }

    pub fn canonical_url(&self) -> String {
        format!(
            "https://github.com/{}/{}/issues/{}",
            self.coords.owner, self.coords.repo, self.number
        )
    }
}

impl fmt::Display for IssueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.coords.owner, self.coords.repo, self.number)
    }
}
