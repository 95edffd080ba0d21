use crate::error::ReviewError;
use crate::review::{PullReviewer, ReviewTrigger};
use crate::types::{PullRequestEvent, ReviewOutcome, ReviewSubject};
use serde_json::Value;

const PULL_REQUEST_EVENT: &str = "pull_request";

/// The webhook deliveries the reviewer acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportedEvent {
    PullRequestOpened,
    PullRequestReadyForReview,
    PullRequestEdited,
}

impl SupportedEvent {
    pub fn from_parts(event: &str, action: &str) -> Option<Self> {
        if event != PULL_REQUEST_EVENT {
            return None;
        }
        match action {
            "opened" => Some(Self::PullRequestOpened),
            "ready_for_review" => Some(Self::PullRequestReadyForReview),
            "edited" => Some(Self::PullRequestEdited),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PullRequestOpened => "pull_request.opened",
            Self::PullRequestReadyForReview => "pull_request.ready_for_review",
            Self::PullRequestEdited => "pull_request.edited",
        }
    }
}

/// Decodes a delivery. `Ok(None)` means the event is not one we handle.
pub fn parse_event(
    event_name: &str,
    body: &[u8],
) -> Result<Option<(SupportedEvent, PullRequestEvent)>, serde_json::Error> {
    let value: Value = serde_json::from_slice(body)?;
    let action = value.get("action").and_then(Value::as_str).unwrap_or_default();

    match SupportedEvent::from_parts(event_name, action) {
        Some(event) => Ok(Some((event, serde_json::from_value(value)?))),
        None => Ok(None),
    }
}

pub async fn dispatch(
    reviewer: &PullReviewer,
    event: SupportedEvent,
    payload: &PullRequestEvent,
) -> Result<ReviewOutcome, ReviewError> {
    let subject = ReviewSubject::from_event(payload);
    let sender = payload.sender.as_ref();
    tracing::info!("Handling {} for {}", event.as_str(), subject);

    match event {
        SupportedEvent::PullRequestOpened => {
            reviewer
                .perform_precheck(&subject, sender, ReviewTrigger::Opened)
                .await
        }
        SupportedEvent::PullRequestReadyForReview => {
            reviewer
                .perform_precheck(&subject, sender, ReviewTrigger::ReadyForReview)
                .await
        }
        SupportedEvent::PullRequestEdited => {
            let previous_body = payload
                .changes
                .as_ref()
                .and_then(|changes| changes.body.as_ref())
                .map(|change| change.from.as_str());
            reviewer
                .handle_body_edit(&subject, previous_body, sender)
                .await
        }
    }
}
