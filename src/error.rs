use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("signature verification failed: {0}")]
    Unauthorized(String),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("rate limit exceeded: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("the token limits for configured model {model} were not found")]
    ModelLimitUnknown { model: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("provider unavailable: {provider}")]
    Unavailable { provider: String },
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Network(_) | Self::Unavailable { .. }
        )
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("rate limit exceeded: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("GitHub API error ({status}) for {url}: {body}")]
    Status { status: u16, url: String, body: String },

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl GithubError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required config: {0}")]
    MissingRequired(String),

    #[error("invalid value for {0}")]
    InvalidValue(String),
}

#[derive(Debug, Error)]
pub enum GroundTruthError {
    #[error("failed to generate ground truths: empty response")]
    Empty,

    #[error("failed to parse ground truths: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
        payload: String,
    },

    #[error("invalid ground truths: {reason}")]
    Shape { reason: String, payload: String },
}

/// Failures of a single review invocation. Gate skips are not errors; they
/// surface as `ReviewOutcome::Skipped`.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error(
        "review interval not met for {subject}: next review available in {}, last review was {} ago",
        humantime::format_duration(*.remaining),
        humantime::format_duration(*.elapsed)
    )]
    ReviewIntervalNotMet {
        subject: String,
        elapsed: Duration,
        remaining: Duration,
    },

    #[error("{subject}: you need to link an issue before converting the pull request to ready for review")]
    NoLinkedIssue { subject: String },

    #[error("error fetching issue {owner}/{repo}#{number}: {source}")]
    IssueFetch {
        owner: String,
        repo: String,
        number: u64,
        #[source]
        source: GithubError,
    },

    #[error("issue {owner}/{repo}#{number} was not found")]
    IssueNotFound {
        owner: String,
        repo: String,
        number: u64,
    },

    #[error("error fetching the pull request diff for {subject}: {source}")]
    DiffFetch {
        subject: String,
        #[source]
        source: GithubError,
    },

    #[error("{subject}: cannot fit {stage} within the token budget ({tokens_remaining} tokens remaining)")]
    BudgetExhausted {
        subject: String,
        stage: &'static str,
        tokens_remaining: usize,
    },

    #[error(transparent)]
    GroundTruths(#[from] GroundTruthError),

    #[error("couldn't parse review verdict ({reason}); raw output: {payload}")]
    VerdictParse { reason: String, payload: String },

    #[error("side effects failed for {subject}: {}", .failures.join("; "))]
    SideEffects {
        subject: String,
        failures: Vec<String>,
    },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("GitHub error: {0}")]
    Github(#[from] GithubError),

    #[error("review task failed: {0}")]
    Task(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let code = match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
        };
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
            details: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_retryable() {
        let rate_limited = LlmError::RateLimited {
            retry_after_ms: 1000,
        };
        assert!(rate_limited.is_retryable());
        assert_eq!(rate_limited.retry_after_ms(), Some(1000));

        let auth_failed = LlmError::AuthenticationFailed("bad token".to_string());
        assert!(!auth_failed.is_retryable());
        assert_eq!(auth_failed.retry_after_ms(), None);
    }

    #[test]
    fn test_github_error_retryable() {
        let server = GithubError::Status {
            status: 502,
            url: "https://api.github.com/repos/o/r".to_string(),
            body: String::new(),
        };
        assert!(server.is_retryable());

        let not_found = GithubError::Status {
            status: 404,
            url: "https://api.github.com/repos/o/r".to_string(),
            body: String::new(),
        };
        assert!(!not_found.is_retryable());
        assert!(!GithubError::GraphQl("boom".to_string()).is_retryable());
    }

    #[test]
    fn test_interval_error_message() {
        let err = ReviewError::ReviewIntervalNotMet {
            subject: "owner/repo#1".to_string(),
            elapsed: Duration::from_secs(3600),
            remaining: Duration::from_secs(23 * 3600),
        };
        let message = err.to_string();
        assert!(message.contains("owner/repo#1"));
        assert!(message.contains("23h"));
        assert!(message.contains("1h ago"));
    }

    #[test]
    fn test_side_effects_message_lists_failures() {
        let err = ReviewError::SideEffects {
            subject: "owner/repo#7".to_string(),
            failures: vec!["convert to draft: 403".to_string(), "submit review: 422".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "side effects failed for owner/repo#7: convert to draft: 403; submit review: 422"
        );
    }

    #[test]
    fn test_api_error_status_codes() {
        let bad_request = ApiError::BadRequest("missing field".to_string());
        assert_eq!(bad_request.status_code(), StatusCode::BAD_REQUEST);

        let unauthorized = ApiError::Unauthorized("bad signature".to_string());
        assert_eq!(unauthorized.status_code(), StatusCode::UNAUTHORIZED);
    }
}
