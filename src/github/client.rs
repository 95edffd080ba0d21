use super::GithubApi;
use crate::error::GithubError;
use crate::retry::{with_retry, RetryConfig};
use crate::types::{
    IssueEvent, LinkedIssue, PullReview, Reaction, RepoCoords, ReviewAction, ReviewSubject,
};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("review-gate/", env!("CARGO_PKG_VERSION"));
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const DIFF_MEDIA_TYPE: &str = "application/vnd.github.diff";
const PER_PAGE: usize = 100;
const MAX_PAGES: usize = 50;
const DEFAULT_RATE_LIMIT_WAIT_MS: u64 = 60_000;

const CLOSING_ISSUES_QUERY: &str = r#"
query closingIssues($owner: String!, $repo: String!, $pr_number: Int!) {
  repository(owner: $owner, name: $repo) {
    pullRequest(number: $pr_number) {
      closingIssuesReferences(first: 100) {
        edges {
          node {
            number
            title
            url
            body
            repository {
              name
              owner { login }
            }
          }
        }
      }
    }
  }
}"#;

const CONVERT_TO_DRAFT_MUTATION: &str = r#"
mutation convertToDraft($id: ID!) {
  convertPullRequestToDraft(input: { pullRequestId: $id }) {
    pullRequest { id isDraft }
  }
}"#;

/// REST + GraphQL client for the GitHub API.
pub struct GithubClient {
    client: Client,
    token: Option<SecretString>,
    api_url: String,
    retry: RetryConfig,
}

impl GithubClient {
    pub fn new(api_url: impl Into<String>, token: Option<SecretString>) -> Result<Self, GithubError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            token,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            retry: RetryConfig::default(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// GitHub Enterprise serves GraphQL at `/api/graphql` next to `/api/v3`.
    fn graphql_url(&self) -> String {
        match self.api_url.strip_suffix("/v3") {
            Some(root) => format!("{}/graphql", root),
            None => format!("{}/graphql", self.api_url),
        }
    }

    fn request(&self, method: Method, url: &str, accept: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(header::ACCEPT, accept)
            .header("X-GitHub-Api-Version", API_VERSION);
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    async fn check(response: Response) -> Result<Response, GithubError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let headers = response.headers();
        let exhausted = headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            == Some("0");
        if status == StatusCode::TOO_MANY_REQUESTS || (status == StatusCode::FORBIDDEN && exhausted)
        {
            let retry_after_ms =
                retry_after_ms(headers.get(header::RETRY_AFTER).and_then(|v| v.to_str().ok()));
            return Err(GithubError::RateLimited { retry_after_ms });
        }

        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        Err(GithubError::Status {
            status: status.as_u16(),
            url,
            body,
        })
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &str) -> Result<T, GithubError> {
        let response = self.request(Method::GET, url, JSON_MEDIA_TYPE).send().await?;
        let response = Self::check(response).await?;
        response
            .json()
            .await
            .map_err(|e| GithubError::InvalidResponse(format!("{}: {}", url, e)))
    }

    async fn get_text_once(&self, url: &str, accept: &str) -> Result<String, GithubError> {
        let response = self.request(Method::GET, url, accept).send().await?;
        Ok(Self::check(response).await?.text().await?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GithubError> {
        let url = self.url(path);
        let url = url.as_str();
        with_retry(&self.retry, || async move { self.get_once(url).await }).await
    }

    async fn get_optional_json<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, GithubError> {
        match self.get_json(path).await {
            Ok(value) => Ok(Some(value)),
            Err(GithubError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn paginate<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, GithubError> {
        let separator = if path.contains('?') { '&' } else { '?' };
        let mut items = Vec::new();

        for page in 1..=MAX_PAGES {
            let batch: Vec<T> = self
                .get_json(&format!(
                    "{}{}per_page={}&page={}",
                    path, separator, PER_PAGE, page
                ))
                .await?;
            let last_page = batch.len() < PER_PAGE;
            items.extend(batch);
            if last_page {
                return Ok(items);
            }
        }

        tracing::warn!("Stopped paginating {} after {} pages", path, MAX_PAGES);
        Ok(items)
    }

    async fn send_json(&self, method: Method, path: &str, body: &Value) -> Result<Response, GithubError> {
        let response = self
            .request(method, &self.url(path), JSON_MEDIA_TYPE)
            .json(body)
            .send()
            .await?;
        Self::check(response).await
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, GithubError> {
        let url = self.graphql_url();
        let body = json!({ "query": query, "variables": variables });

        let response = self
            .request(Method::POST, &url, JSON_MEDIA_TYPE)
            .json(&body)
            .send()
            .await?;
        let response: GraphQlResponse<T> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| GithubError::InvalidResponse(format!("GraphQL: {}", e)))?;

        if !response.errors.is_empty() {
            let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
            return Err(GithubError::GraphQl(messages.join("; ")));
        }
        response
            .data
            .ok_or_else(|| GithubError::GraphQl("response carried no data".to_string()))
    }
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlErrorMessage>,
}

#[derive(Deserialize)]
struct GraphQlErrorMessage {
    message: String,
}

#[derive(Deserialize)]
struct ClosingIssuesData {
    repository: Option<ClosingIssuesRepository>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClosingIssuesRepository {
    pull_request: Option<ClosingIssuesPull>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClosingIssuesPull {
    closing_issues_references: Connection,
}

#[derive(Deserialize)]
struct Connection {
    #[serde(default)]
    edges: Vec<Edge>,
}

#[derive(Deserialize)]
struct Edge {
    node: IssueNode,
}

#[derive(Deserialize)]
struct IssueNode {
    number: u64,
    title: String,
    url: String,
    #[serde(default)]
    body: Option<String>,
    repository: NodeRepository,
}

#[derive(Deserialize)]
struct NodeRepository {
    name: String,
    owner: NodeOwner,
}

#[derive(Deserialize)]
struct NodeOwner {
    login: String,
}

impl From<IssueNode> for LinkedIssue {
    fn from(node: IssueNode) -> Self {
        LinkedIssue {
            coords: RepoCoords::new(node.repository.owner.login, node.repository.name),
            number: node.number,
            title: node.title,
            url: node.url,
            body: node.body,
        }
    }
}

#[derive(Deserialize)]
struct RestIssue {
    number: u64,
    title: String,
    html_url: String,
    #[serde(default)]
    body: Option<String>,
}

fn html_url(created: &Value) -> &str {
    created.get("html_url").and_then(Value::as_str).unwrap_or("-")
}

/// `Retry-After` is given in seconds; anything unparsable falls back to the default wait.
fn retry_after_ms(value: Option<&str>) -> u64 {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs.saturating_mul(1000))
        .unwrap_or(DEFAULT_RATE_LIMIT_WAIT_MS)
}

/// Decodes the base64 `content` field of a contents API response. Directory
/// listings and oversized files carry no content and yield `None`.
fn decode_contents(value: &Value) -> Result<Option<String>, GithubError> {
    let Some(encoded) = value.get("content").and_then(Value::as_str) else {
        return Ok(None);
    };
    if value.get("encoding").and_then(Value::as_str) != Some("base64") {
        return Ok(None);
    }

    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| GithubError::InvalidResponse(format!("invalid base64 contents: {}", e)))?;
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

#[async_trait]
impl GithubApi for GithubClient {
    async fn closing_issue_references(
        &self,
        subject: &ReviewSubject,
    ) -> Result<Vec<LinkedIssue>, GithubError> {
        let data: ClosingIssuesData = self
            .graphql(
                CLOSING_ISSUES_QUERY,
                json!({
                    "owner": subject.coords.owner,
                    "repo": subject.coords.repo,
                    "pr_number": subject.number,
                }),
            )
            .await?;

        Ok(data
            .repository
            .and_then(|r| r.pull_request)
            .map(|pr| {
                pr.closing_issues_references
                    .edges
                    .into_iter()
                    .map(|edge| LinkedIssue::from(edge.node))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_issue(
        &self,
        coords: &RepoCoords,
        number: u64,
    ) -> Result<Option<LinkedIssue>, GithubError> {
        let issue: Option<RestIssue> = self
            .get_optional_json(&format!(
                "/repos/{}/{}/issues/{}",
                coords.owner, coords.repo, number
            ))
            .await?;

        Ok(issue.map(|issue| LinkedIssue {
            coords: coords.clone(),
            number: issue.number,
            title: issue.title,
            url: issue.html_url,
            body: issue.body,
        }))
    }

    async fn fetch_diff(&self, coords: &RepoCoords, number: u64) -> Result<String, GithubError> {
        let url = self.url(&format!(
            "/repos/{}/{}/pulls/{}",
            coords.owner, coords.repo, number
        ));
        let url = url.as_str();
        with_retry(&self.retry, || async move { self.get_text_once(url, DIFF_MEDIA_TYPE).await })
            .await
    }

    async fn fetch_file_content(
        &self,
        coords: &RepoCoords,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Option<String>, GithubError> {
        let mut endpoint = format!(
            "/repos/{}/{}/contents/{}",
            coords.owner,
            coords.repo,
            path.trim_start_matches('/')
        );
        if let Some(git_ref) = git_ref {
            endpoint.push_str("?ref=");
            endpoint.push_str(git_ref);
        }

        match self.get_optional_json::<Value>(&endpoint).await? {
            Some(value) => decode_contents(&value),
            None => Ok(None),
        }
    }

    async fn repo_languages(
        &self,
        coords: &RepoCoords,
    ) -> Result<BTreeMap<String, u64>, GithubError> {
        self.get_json(&format!("/repos/{}/{}/languages", coords.owner, coords.repo))
            .await
    }

    async fn list_reviews(
        &self,
        coords: &RepoCoords,
        number: u64,
    ) -> Result<Vec<PullReview>, GithubError> {
        self.paginate(&format!(
            "/repos/{}/{}/pulls/{}/reviews",
            coords.owner, coords.repo, number
        ))
        .await
    }

    async fn list_issue_events(
        &self,
        coords: &RepoCoords,
        number: u64,
    ) -> Result<Vec<IssueEvent>, GithubError> {
        self.paginate(&format!(
            "/repos/{}/{}/issues/{}/events",
            coords.owner, coords.repo, number
        ))
        .await
    }

    async fn convert_to_draft(&self, node_id: &str) -> Result<(), GithubError> {
        let _: Value = self
            .graphql(CONVERT_TO_DRAFT_MUTATION, json!({ "id": node_id }))
            .await?;
        Ok(())
    }

    async fn submit_review(
        &self,
        coords: &RepoCoords,
        number: u64,
        body: &str,
        action: ReviewAction,
    ) -> Result<(), GithubError> {
        let response = self
            .send_json(
                Method::POST,
                &format!("/repos/{}/{}/pulls/{}/reviews", coords.owner, coords.repo, number),
                &json!({ "body": body, "event": action.as_str() }),
            )
            .await?;

        let created: Value = response.json().await.unwrap_or(Value::Null);
        let url = html_url(&created);
        tracing::info!(
            "Submitted {} review on {}: {}",
            action.as_str(),
            coords.key(number),
            url
        );
        Ok(())
    }

    async fn list_reactions(
        &self,
        coords: &RepoCoords,
        number: u64,
    ) -> Result<Vec<Reaction>, GithubError> {
        self.paginate(&format!(
            "/repos/{}/{}/issues/{}/reactions",
            coords.owner, coords.repo, number
        ))
        .await
    }

    async fn add_reaction(
        &self,
        coords: &RepoCoords,
        number: u64,
        content: &str,
    ) -> Result<(), GithubError> {
        self.send_json(
            Method::POST,
            &format!("/repos/{}/{}/issues/{}/reactions", coords.owner, coords.repo, number),
            &json!({ "content": content }),
        )
        .await?;
        Ok(())
    }

    async fn delete_reaction(
        &self,
        coords: &RepoCoords,
        number: u64,
        reaction_id: u64,
    ) -> Result<(), GithubError> {
        let response = self
            .request(
                Method::DELETE,
                &self.url(&format!(
                    "/repos/{}/{}/issues/{}/reactions/{}",
                    coords.owner, coords.repo, number, reaction_id
                )),
                JSON_MEDIA_TYPE,
            )
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
