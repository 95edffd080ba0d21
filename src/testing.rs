//! In-memory stand-ins for GitHub, the model provider and the tokenizer.

use crate::error::{GithubError, LlmError};
use crate::github::GithubApi;
use crate::llm::{Message, ModelClient, Role, Tokenizer};
use crate::types::{
    IssueEvent, LinkedIssue, PullReview, PullState, Reaction, RepoCoords, ReviewAction,
    ReviewSubject, User, BOT_USER_TYPE, COLLABORATOR, HUMAN_USER_TYPE,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

pub fn author() -> User {
    User {
        login: "dev".to_string(),
        id: 7,
        kind: HUMAN_USER_TYPE.to_string(),
    }
}

pub fn bot() -> User {
    User {
        login: "review-gate[bot]".to_string(),
        id: 1000,
        kind: BOT_USER_TYPE.to_string(),
    }
}

/// An open, ready pull request `acme/widgets#12` opened by `dev`.
pub fn subject(body: &str) -> ReviewSubject {
    ReviewSubject {
        coords: RepoCoords::new("acme", "widgets"),
        number: 12,
        node_id: "PR_node".to_string(),
        html_url: "https://github.com/acme/widgets/pull/12".to_string(),
        body: Some(body.to_string()),
        draft: false,
        state: PullState::Open,
        author_association: "CONTRIBUTOR".to_string(),
        author: author(),
        head_sha: "abc123".to_string(),
    }
}

pub fn issue(owner: &str, repo: &str, number: u64, body: &str) -> LinkedIssue {
    LinkedIssue {
        coords: RepoCoords::new(owner, repo),
        number,
        title: format!("Task {}", number),
        url: format!("https://github.com/{}/{}/issues/{}", owner, repo, number),
        body: Some(body.to_string()),
    }
}

pub fn bot_review(hours_ago: i64) -> PullReview {
    PullReview {
        id: 500 + hours_ago as u64,
        user: Some(bot()),
        submitted_at: Some(Utc::now() - Duration::hours(hours_ago)),
        state: "COMMENTED".to_string(),
        author_association: "NONE".to_string(),
    }
}

pub fn collaborator_review(login: &str) -> PullReview {
    PullReview {
        id: 700,
        user: Some(User {
            login: login.to_string(),
            id: 3,
            kind: HUMAN_USER_TYPE.to_string(),
        }),
        submitted_at: Some(Utc::now() - Duration::days(3)),
        state: "CHANGES_REQUESTED".to_string(),
        author_association: COLLABORATOR.to_string(),
    }
}

/// Scripted `GithubApi` that records every call as a short string.
#[derive(Default)]
pub struct FakeGithub {
    closing_issues: Vec<LinkedIssue>,
    issues: Vec<LinkedIssue>,
    diff: String,
    files: HashMap<String, String>,
    languages: BTreeMap<String, u64>,
    reviews: Vec<PullReview>,
    events: Vec<IssueEvent>,
    reactions: Vec<Reaction>,
    failing: HashSet<&'static str>,
    calls: Mutex<Vec<String>>,
}

impl FakeGithub {
    pub fn with_closing_issues(mut self, issues: Vec<LinkedIssue>) -> Self {
        self.closing_issues = issues;
        self
    }

    pub fn with_issue(mut self, issue: LinkedIssue) -> Self {
        self.issues.push(issue);
        self
    }

    pub fn with_diff(mut self, diff: &str) -> Self {
        self.diff = diff.to_string();
        self
    }

    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files.insert(path.to_string(), content.to_string());
        self
    }

    pub fn with_languages(mut self, languages: &[(&str, u64)]) -> Self {
        self.languages = languages
            .iter()
            .map(|(name, bytes)| (name.to_string(), *bytes))
            .collect();
        self
    }

    pub fn with_reviews(mut self, reviews: Vec<PullReview>) -> Self {
        self.reviews = reviews;
        self
    }

    pub fn with_events(mut self, events: Vec<IssueEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn with_reactions(mut self, reactions: Vec<Reaction>) -> Self {
        self.reactions = reactions;
        self
    }

    /// Makes every call of `method` fail with a 500.
    pub fn failing(mut self, method: &'static str) -> Self {
        self.failing.insert(method);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn call(&self, method: &'static str, detail: String) -> Result<(), GithubError> {
        let entry = if detail.is_empty() {
            method.to_string()
        } else {
            format!("{} {}", method, detail)
        };
        self.calls.lock().unwrap().push(entry);

        if self.failing.contains(method) {
            return Err(GithubError::Status {
                status: 500,
                url: format!("https://api.github.test/{}", method),
                body: "scripted failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl GithubApi for FakeGithub {
    async fn closing_issue_references(
        &self,
        _subject: &ReviewSubject,
    ) -> Result<Vec<LinkedIssue>, GithubError> {
        self.call("closing_issue_references", String::new())?;
        Ok(self.closing_issues.clone())
    }

    async fn fetch_issue(
        &self,
        coords: &RepoCoords,
        number: u64,
    ) -> Result<Option<LinkedIssue>, GithubError> {
        self.call("fetch_issue", format!("{}#{}", coords.full_name(), number))?;
        Ok(self
            .issues
            .iter()
            .find(|issue| &issue.coords == coords && issue.number == number)
            .cloned())
    }

    async fn fetch_diff(&self, _coords: &RepoCoords, _number: u64) -> Result<String, GithubError> {
        self.call("fetch_diff", String::new())?;
        Ok(self.diff.clone())
    }

    async fn fetch_file_content(
        &self,
        _coords: &RepoCoords,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Option<String>, GithubError> {
        self.call(
            "fetch_file_content",
            format!("{}@{}", path, git_ref.unwrap_or("HEAD")),
        )?;
        Ok(self.files.get(path).cloned())
    }

    async fn repo_languages(
        &self,
        _coords: &RepoCoords,
    ) -> Result<BTreeMap<String, u64>, GithubError> {
        self.call("repo_languages", String::new())?;
        Ok(self.languages.clone())
    }

    async fn list_reviews(
        &self,
        _coords: &RepoCoords,
        _number: u64,
    ) -> Result<Vec<PullReview>, GithubError> {
        self.call("list_reviews", String::new())?;
        Ok(self.reviews.clone())
    }

    async fn list_issue_events(
        &self,
        _coords: &RepoCoords,
        _number: u64,
    ) -> Result<Vec<IssueEvent>, GithubError> {
        self.call("list_issue_events", String::new())?;
        Ok(self.events.clone())
    }

    async fn convert_to_draft(&self, node_id: &str) -> Result<(), GithubError> {
        self.call("convert_to_draft", node_id.to_string())
    }

    async fn submit_review(
        &self,
        _coords: &RepoCoords,
        _number: u64,
        _body: &str,
        action: ReviewAction,
    ) -> Result<(), GithubError> {
        self.call("submit_review", action.as_str().to_string())
    }

    async fn list_reactions(
        &self,
        _coords: &RepoCoords,
        _number: u64,
    ) -> Result<Vec<Reaction>, GithubError> {
        self.call("list_reactions", String::new())?;
        Ok(self.reactions.clone())
    }

    async fn add_reaction(
        &self,
        _coords: &RepoCoords,
        _number: u64,
        content: &str,
    ) -> Result<(), GithubError> {
        self.call("add_reaction", content.to_string())
    }

    async fn delete_reaction(
        &self,
        _coords: &RepoCoords,
        _number: u64,
        reaction_id: u64,
    ) -> Result<(), GithubError> {
        self.call("delete_reaction", reaction_id.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub user: String,
    pub max_tokens: usize,
}

/// `ModelClient` answering from a script, in order.
pub struct FakeModel {
    model: String,
    answers: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl FakeModel {
    pub fn answering(answers: &[&str]) -> Self {
        Self::scripted(answers.iter().map(|a| Ok(a.to_string())).collect())
    }

    pub fn scripted(answers: Vec<Result<String, LlmError>>) -> Self {
        Self {
            model: "anthropic/claude-3.5-sonnet".to_string(),
            answers: Mutex::new(answers.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for FakeModel {
    async fn chat(
        &self,
        messages: &[Message],
        system: Option<&str>,
        max_tokens: usize,
    ) -> Result<String, LlmError> {
        let user = messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.requests.lock().unwrap().push(ModelRequest {
            system: system.map(str::to_string),
            user,
            max_tokens,
        });

        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::InvalidResponse("no scripted answer left".to_string())))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Counts whitespace separated words.
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}
