use crate::error::ConfigError;
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";
const DEFAULT_REVIEW_INTERVAL: &str = "1 Day";
const DEFAULT_OPENROUTER_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Interval values that turn the review rate limit off.
const DISABLED_INTERVALS: [&str; 4] = ["push", "none", "off", "0"];

#[derive(Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub github: GithubConfig,
    pub providers: ProvidersConfig,
    pub review: ReviewConfig,
    pub action: Option<ActionEvent>,
}

#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub webhook_secret: Option<SecretString>,
}

#[derive(Clone)]
pub struct GithubConfig {
    pub token: Option<SecretString>,
    pub api_url: String,
}

#[derive(Clone)]
pub struct ProvidersConfig {
    pub openrouter_api_key: Option<SecretString>,
    pub openrouter_base_url: String,
    pub anthropic_api_key: Option<SecretString>,
    pub default_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ReviewConfig {
    pub bot_name: String,
    pub model: String,
    pub context_token_limit: Option<usize>,
    pub completion_token_limit: Option<usize>,
    /// `None` disables the rate limit.
    pub review_interval: Option<Duration>,
    pub require_author_trigger: bool,
    pub skip_collaborator_authors: bool,
    pub skip_if_collaborator_converted: bool,
    pub approval_reaction: bool,
}

/// A single event handed over by the GitHub Actions runtime.
#[derive(Debug, Clone)]
pub struct ActionEvent {
    pub event_name: String,
    pub payload_path: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig {
                host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".into()))?,
                webhook_secret: std::env::var("WEBHOOK_SECRET").ok().map(SecretString::from),
            },
            github: GithubConfig {
                token: std::env::var("GITHUB_TOKEN").ok().map(SecretString::from),
                api_url: std::env::var("GITHUB_API_URL")
                    .unwrap_or_else(|_| DEFAULT_GITHUB_API_URL.to_string()),
            },
            providers: ProvidersConfig {
                openrouter_api_key: std::env::var("OPENROUTER_API_KEY")
                    .ok()
                    .map(SecretString::from),
                openrouter_base_url: std::env::var("OPENROUTER_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_OPENROUTER_URL.to_string()),
                anthropic_api_key: std::env::var("ANTHROPIC_API_KEY")
                    .ok()
                    .map(SecretString::from),
                default_timeout_secs: std::env::var("LLM_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "120".to_string())
                    .parse()
                    .unwrap_or(120),
            },
            review: ReviewConfig {
                bot_name: std::env::var("BOT_NAME").unwrap_or_else(|_| "UbiquityOS".to_string()),
                model: std::env::var("REVIEW_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
                context_token_limit: optional_number("REVIEW_CONTEXT_TOKEN_LIMIT")?,
                completion_token_limit: optional_number("REVIEW_COMPLETION_TOKEN_LIMIT")?,
                review_interval: parse_review_interval(
                    &std::env::var("REVIEW_INTERVAL")
                        .unwrap_or_else(|_| DEFAULT_REVIEW_INTERVAL.to_string()),
                )?,
                require_author_trigger: flag("REQUIRE_AUTHOR_TRIGGER", true)?,
                skip_collaborator_authors: flag("SKIP_COLLABORATOR_AUTHORS", true)?,
                skip_if_collaborator_converted: flag("SKIP_IF_COLLABORATOR_CONVERTED", true)?,
                approval_reaction: flag("APPROVAL_REACTION", true)?,
            },
            action: match (
                std::env::var("GITHUB_EVENT_NAME").ok(),
                std::env::var("GITHUB_EVENT_PATH").ok(),
            ) {
                (Some(event_name), Some(path)) => Some(ActionEvent {
                    event_name,
                    payload_path: PathBuf::from(path),
                }),
                _ => None,
            },
        })
    }
}

/// Parses a human readable interval such as `1 Day` or `12 hours`.
///
/// Returns `None` for the sentinels that disable rate limiting.
pub fn parse_review_interval(value: &str) -> Result<Option<Duration>, ConfigError> {
    let normalized: String = value
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("");

    if normalized.is_empty() || DISABLED_INTERVALS.contains(&normalized.as_str()) {
        return Ok(None);
    }

    humantime::parse_duration(&normalized)
        .map(Some)
        .map_err(|e| ConfigError::InvalidValue(format!("REVIEW_INTERVAL ({}): {}", value, e)))
}

fn optional_number(key: &str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key.into())),
        Err(_) => Ok(None),
    }
}

fn flag(key: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => parse_flag(&raw).ok_or_else(|| ConfigError::InvalidValue(key.into())),
        Err(_) => Ok(default),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            webhook_secret: None,
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: DEFAULT_GITHUB_API_URL.to_string(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openrouter_api_key: None,
            openrouter_base_url: DEFAULT_OPENROUTER_URL.to_string(),
            anthropic_api_key: None,
            default_timeout_secs: 120,
        }
    }
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            bot_name: "UbiquityOS".to_string(),
            model: DEFAULT_MODEL.to_string(),
            context_token_limit: None,
            completion_token_limit: None,
            review_interval: Some(Duration::from_secs(24 * 60 * 60)),
            require_author_trigger: true,
            skip_collaborator_authors: true,
            skip_if_collaborator_converted: true,
            approval_reaction: true,
        }
    }
}
