use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const BOT_USER_TYPE: &str = "Bot";
pub const HUMAN_USER_TYPE: &str = "User";
pub const COLLABORATOR: &str = "COLLABORATOR";

// ---------------------------------------------------------------------------
// Webhook payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub login: String,
    pub id: u64,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl User {
    pub fn is_bot(&self) -> bool {
        self.kind == BOT_USER_TYPE
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub owner: User,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PullState {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitRef {
    pub sha: String,
    #[serde(default)]
    pub repo: Option<Repository>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub node_id: String,
    pub html_url: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub draft: bool,
    pub state: PullState,
    #[serde(default)]
    pub author_association: String,
    pub user: User,
    pub head: GitRef,
    pub base: GitRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyChange {
    pub from: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Changes {
    #[serde(default)]
    pub body: Option<BodyChange>,
}

/// Payload of the `pull_request` webhook family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    pub number: u64,
    pub pull_request: PullRequest,
    pub repository: Repository,
    #[serde(default)]
    pub sender: Option<User>,
    #[serde(default)]
    pub changes: Option<Changes>,
}

// ---------------------------------------------------------------------------
// Review domain
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoCoords {
    pub owner: String,
    pub repo: String,
}

impl RepoCoords {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Stable `{owner}/{repo}/{number}` identifier used in context headers.
    pub fn key(&self, number: u64) -> String {
        format!("{}/{}/{}", self.owner, self.repo, number)
    }
}

/// The pull request under evaluation, read fresh from each event payload.
#[derive(Debug, Clone)]
pub struct ReviewSubject {
    pub coords: RepoCoords,
    pub number: u64,
    pub node_id: String,
    pub html_url: String,
    pub body: Option<String>,
    pub draft: bool,
    pub state: PullState,
    pub author_association: String,
    pub author: User,
    pub head_sha: String,
}

impl ReviewSubject {
    pub fn from_event(event: &PullRequestEvent) -> Self {
        let pr = &event.pull_request;
        let base_repo = pr.base.repo.as_ref().unwrap_or(&event.repository);
        Self {
            coords: RepoCoords::new(&base_repo.owner.login, &base_repo.name),
            number: pr.number,
            node_id: pr.node_id.clone(),
            html_url: pr.html_url.clone(),
            body: pr.body.clone(),
            draft: pr.draft,
            state: pr.state,
            author_association: pr.author_association.clone(),
            author: pr.user.clone(),
            head_sha: pr.head.sha.clone(),
        }
    }

    pub fn key(&self) -> String {
        self.coords.key(self.number)
    }
}

impl fmt::Display for ReviewSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.coords.owner, self.coords.repo, self.number)
    }
}

/// An issue closed by the pull request; its body is the task specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedIssue {
    pub coords: RepoCoords,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub body: Option<String>,
}

impl LinkedIssue {
    pub fn key(&self) -> String {
        self.coords.key(self.number)
    }

    pub fn specification(&self) -> Option<&str> {
        self.body.as_deref().map(str::trim).filter(|b| !b.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullReview {
    pub id: u64,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub author_association: String,
}

impl PullReview {
    pub fn is_from_bot(&self) -> bool {
        self.user.as_ref().map(User::is_bot).unwrap_or(false)
    }
}

/// An entry of the issue event timeline (`converted_to_draft`, `ready_for_review`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueEvent {
    pub event: String,
    #[serde(default)]
    pub actor: Option<User>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub id: u64,
    pub content: String,
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewAction {
    Comment,
    RequestChanges,
}

impl ReviewAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewAction::Comment => "COMMENT",
            ReviewAction::RequestChanges => "REQUEST_CHANGES",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewVerdict {
    pub confidence_threshold: f64,
    pub review_comment: String,
}

impl ReviewVerdict {
    pub fn passes(&self) -> bool {
        self.confidence_threshold > 0.5
    }
}

/// What a single event invocation ended with when it did not fail.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReviewOutcome {
    Skipped { reason: String },
    Reviewed {
        action: ReviewAction,
        verdict: ReviewVerdict,
    },
}

impl ReviewOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}
