mod client;
pub mod refs;

pub use client::GithubClient;

use crate::error::GithubError;
use crate::types::{
    IssueEvent, LinkedIssue, PullReview, Reaction, RepoCoords, ReviewAction, ReviewSubject,
};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Everything the review pipeline needs from GitHub.
#[async_trait]
pub trait GithubApi: Send + Sync {
    /// Issues linked through GitHub's "closes" relationship on the pull request.
    async fn closing_issue_references(
        &self,
        subject: &ReviewSubject,
    ) -> Result<Vec<LinkedIssue>, GithubError>;

    /// `None` when the issue does not exist.
    async fn fetch_issue(
        &self,
        coords: &RepoCoords,
        number: u64,
    ) -> Result<Option<LinkedIssue>, GithubError>;

    /// Raw unified diff of the pull request.
    async fn fetch_diff(&self, coords: &RepoCoords, number: u64) -> Result<String, GithubError>;

    /// Decoded file contents at `git_ref`, `None` when the file is absent.
    async fn fetch_file_content(
        &self,
        coords: &RepoCoords,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Option<String>, GithubError>;

    /// Bytes of code per language.
    async fn repo_languages(&self, coords: &RepoCoords)
        -> Result<BTreeMap<String, u64>, GithubError>;

    async fn list_reviews(
        &self,
        coords: &RepoCoords,
        number: u64,
    ) -> Result<Vec<PullReview>, GithubError>;

    async fn list_issue_events(
        &self,
        coords: &RepoCoords,
        number: u64,
    ) -> Result<Vec<IssueEvent>, GithubError>;

    async fn convert_to_draft(&self, node_id: &str) -> Result<(), GithubError>;

    async fn submit_review(
        &self,
        coords: &RepoCoords,
        number: u64,
        body: &str,
        action: ReviewAction,
    ) -> Result<(), GithubError>;

    async fn list_reactions(
        &self,
        coords: &RepoCoords,
        number: u64,
    ) -> Result<Vec<Reaction>, GithubError>;

    async fn add_reaction(
        &self,
        coords: &RepoCoords,
        number: u64,
        content: &str,
    ) -> Result<(), GithubError>;

    async fn delete_reaction(
        &self,
        coords: &RepoCoords,
        number: u64,
        reaction_id: u64,
    ) -> Result<(), GithubError>;
}
