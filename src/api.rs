use actix_web::{web, HttpRequest, HttpResponse, Responder};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::Sha256;
use std::sync::Arc;
use tracing::Instrument;

use crate::dispatch::{dispatch, parse_event};
use crate::error::ApiError;
use crate::review::PullReviewer;

type HmacSha256 = Hmac<Sha256>;

const EVENT_HEADER: &str = "X-GitHub-Event";
const DELIVERY_HEADER: &str = "X-GitHub-Delivery";
const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

pub struct AppState {
    pub reviewer: Arc<PullReviewer>,
    pub webhook_secret: Option<SecretString>,
}

#[derive(Serialize)]
struct WebhookAccepted {
    delivery: String,
    event: &'static str,
}

pub async fn health() -> impl Responder {
    web::Json(serde_json::json!({"status": "ok"}))
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|value| value.to_str().ok())
}

/// Checks a `sha256=<hex>` signature against the HMAC of the raw body.
fn verify_signature(body: &[u8], secret: &str, signature_header: &str) -> Result<(), String> {
    let signature_hex = signature_header
        .strip_prefix("sha256=")
        .ok_or_else(|| "missing sha256= prefix".to_string())?;
    let expected =
        hex::decode(signature_hex).map_err(|e| format!("invalid hex in signature: {}", e))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| format!("invalid HMAC key: {}", e))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| "HMAC verification failed".to_string())
}

pub async fn webhook(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    if let Some(secret) = &state.webhook_secret {
        let signature = header(&req, SIGNATURE_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {} header", SIGNATURE_HEADER)))?;
        verify_signature(&body, secret.expose_secret(), signature).map_err(ApiError::Unauthorized)?;
    }

    let event_name = header(&req, EVENT_HEADER)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {} header", EVENT_HEADER)))?;

    let Some((event, payload)) = parse_event(event_name, &body)
        .map_err(|e| ApiError::BadRequest(format!("invalid {} payload: {}", event_name, e)))?
    else {
        tracing::debug!("Ignoring unsupported {} delivery", event_name);
        return Ok(HttpResponse::NoContent().finish());
    };

    let delivery = header(&req, DELIVERY_HEADER)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let span = tracing::info_span!(
        "review",
        delivery = %delivery,
        pr = %format!("{}#{}", payload.repository.full_name, payload.number),
        event = event.as_str()
    );

    let reviewer = Arc::clone(&state.reviewer);
    tokio::spawn(
        async move {
            match dispatch(&reviewer, event, &payload).await {
                Ok(outcome) => tracing::info!(?outcome, "Review finished"),
                Err(e) => tracing::error!("Review failed: {}", e),
            }
        }
        .instrument(span),
    );

    Ok(HttpResponse::Accepted().json(WebhookAccepted {
        delivery,
        event: event.as_str(),
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health))
            .route("/webhook", web::post().to(webhook)),
    );
}
