mod api;
mod config;
mod dispatch;
mod error;
mod github;
mod llm;
mod retry;
mod review;
mod types;

#[cfg(test)]
mod testing;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::{ActionEvent, AppConfig, ProvidersConfig};
use crate::error::ConfigError;
use crate::github::GithubClient;
use crate::llm::anthropic::AnthropicClient;
use crate::llm::openrouter::OpenRouterClient;
use crate::llm::{BpeTokenizer, ModelClient, RetryingClient};
use crate::retry::RetryConfig;
use crate::review::PullReviewer;

fn build_model_client(
    providers: &ProvidersConfig,
    model: &str,
) -> anyhow::Result<Arc<dyn ModelClient>> {
    let client: Arc<dyn ModelClient> = if let Some(key) = &providers.openrouter_api_key {
        tracing::info!("Using OpenRouter with model {}", model);
        Arc::new(
            OpenRouterClient::new(
                providers.openrouter_base_url.clone(),
                key.expose_secret(),
                providers.default_timeout_secs,
            )?
            .with_model(model),
        )
    } else if let Some(key) = &providers.anthropic_api_key {
        if model.contains('/') {
            tracing::warn!(
                "Model {} looks like an OpenRouter identifier; the Anthropic API expects a bare model id",
                model
            );
        }
        tracing::info!("Using Anthropic with model {}", model);
        Arc::new(
            AnthropicClient::with_api_key(key.expose_secret(), providers.default_timeout_secs)?
                .with_model(model),
        )
    } else {
        return Err(ConfigError::MissingRequired(
            "OPENROUTER_API_KEY or ANTHROPIC_API_KEY".to_string(),
        )
        .into());
    };

    Ok(Arc::new(RetryingClient::new(client, RetryConfig::default())))
}

/// Processes the single event handed over by the Actions runtime.
async fn run_action(reviewer: &PullReviewer, action: &ActionEvent) -> anyhow::Result<()> {
    let body = tokio::fs::read(&action.payload_path)
        .await
        .with_context(|| format!("failed to read {}", action.payload_path.display()))?;

    let Some((event, payload)) = dispatch::parse_event(&action.event_name, &body)
        .with_context(|| format!("invalid {} payload", action.event_name))?
    else {
        tracing::info!("Event {} is not handled, nothing to do", action.event_name);
        return Ok(());
    };

    let outcome = dispatch::dispatch(reviewer, event, &payload).await?;
    tracing::info!(?outcome, "Review finished");
    Ok(())
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    let github = GithubClient::new(config.github.api_url.clone(), config.github.token.clone())?;
    if config.github.token.is_none() {
        tracing::warn!("GITHUB_TOKEN is not set; write operations will fail");
    }
    let client = build_model_client(&config.providers, &config.review.model)?;
    let tokenizer = BpeTokenizer::cl100k()?;

    let reviewer = Arc::new(PullReviewer::new(
        Arc::new(github),
        client,
        Arc::new(tokenizer),
        config.review.clone(),
    ));

    if let Some(action) = &config.action {
        tracing::info!("Running once for {} event", action.event_name);
        return run_action(&reviewer, action).await;
    }

    if config.server.webhook_secret.is_none() {
        tracing::warn!("WEBHOOK_SECRET is not set; webhook deliveries are not authenticated");
    }

    let state = web::Data::new(AppState {
        reviewer,
        webhook_secret: config.server.webhook_secret.clone(),
    });

    tracing::info!(
        "Starting server at http://{}:{}",
        config.server.host,
        config.server.port
    );

    HttpServer::new(move || App::new().app_data(state.clone()).configure(api::configure))
        .bind((config.server.host.as_str(), config.server.port))?
        .run()
        .await?;

    Ok(())
}
