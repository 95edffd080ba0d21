use crate::error::ReviewError;
use crate::github::refs::IssueRef;
use crate::github::GithubApi;
use crate::types::{LinkedIssue, RepoCoords, ReviewSubject};
use futures::future::try_join_all;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static HTML_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("HTML_COMMENT_RE regex should compile"));

static CLOSING_REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:close[sd]?|fix(?:e[sd])?|resolve[sd]?):?\s+(?:https://github\.com/([^/\s]+)/([^/\s]+)/issues/(\d+)|([^/\s#]+)/([^/\s#]+)#(\d+)|#(\d+))",
    )
    .expect("CLOSING_REFERENCE_RE regex should compile")
});

pub fn strip_html_comments(body: &str) -> String {
    HTML_COMMENT_RE.replace_all(body, "").into_owned()
}

/// Collects every issue a closing keyword in `body` points at. Bare `#N`
/// references resolve against `default_repo`.
pub fn extract_issue_references(body: &str, default_repo: &RepoCoords) -> BTreeSet<IssueRef> {
    let body = strip_html_comments(body);
    let mut references = BTreeSet::new();

    for captures in CLOSING_REFERENCE_RE.captures_iter(&body) {
        let reference = if let (Some(owner), Some(repo), Some(number)) =
            (captures.get(1), captures.get(2), captures.get(3))
        {
            number
                .as_str()
                .parse()
                .ok()
                .map(|n| IssueRef::new(RepoCoords::new(owner.as_str(), repo.as_str()), n))
        } else if let (Some(owner), Some(repo), Some(number)) =
            (captures.get(4), captures.get(5), captures.get(6))
        {
            number
                .as_str()
                .parse()
                .ok()
                .map(|n| IssueRef::new(RepoCoords::new(owner.as_str(), repo.as_str()), n))
        } else {
            captures
                .get(7)
                .and_then(|number| number.as_str().parse().ok())
                .map(|n| IssueRef::new(default_repo.clone(), n))
        };

        if let Some(reference) = reference {
            references.insert(reference);
        }
    }

    references
}

/// True when the edited body references an issue the previous body did not.
/// Removing a reference never counts.
pub fn linkage_added(old_body: &str, new_body: &str, default_repo: &RepoCoords) -> bool {
    let old = extract_issue_references(old_body, default_repo);
    let new = extract_issue_references(new_body, default_repo);
    !new.is_empty() && new.iter().any(|reference| !old.contains(reference))
}

/// Issues closed by the pull request.
///
/// Asks GitHub for the closing references first. When that returns nothing
/// (or fails) the body is scanned for closing keywords and every reference is
/// fetched; any reference that cannot be fetched aborts the review.
pub async fn resolve_linked_issues(
    github: &dyn GithubApi,
    subject: &ReviewSubject,
) -> Result<Vec<LinkedIssue>, ReviewError> {
    match github.closing_issue_references(subject).await {
        Ok(issues) if !issues.is_empty() => {
            tracing::debug!("{} closes {} issue(s)", subject, issues.len());
            return Ok(issues);
        }
        Ok(_) => tracing::debug!("{} has no closing references, scanning body", subject),
        Err(e) => tracing::warn!("Closing references query failed for {}: {}", subject, e),
    }

    let references = extract_issue_references(subject.body.as_deref().unwrap_or(""), &subject.coords);
    if references.is_empty() {
        return Ok(Vec::new());
    }

    tracing::info!(
        "Resolved {} issue reference(s) from the body of {}",
        references.len(),
        subject
    );

    try_join_all(references.into_iter().map(|reference| async move {
        match github.fetch_issue(&reference.coords, reference.number).await {
            Ok(Some(issue)) => Ok(issue),
            Ok(None) => Err(ReviewError::IssueNotFound {
                owner: reference.coords.owner,
                repo: reference.coords.repo,
                number: reference.number,
            }),
            Err(source) => Err(ReviewError::IssueFetch {
                owner: reference.coords.owner,
                repo: reference.coords.repo,
                number: reference.number,
                source,
            }),
        }
    }))
    .await
}
