use super::budget::TokenBudget;
use super::context::{ContextAssembler, MISSING_SPECIFICATION};
use super::ground_truths::find_ground_truths;
use super::linked_issues::{linkage_added, resolve_linked_issues};
use super::prompt::{code_review_system_message, LLM_QUERY};
use super::verdict::parse_verdict;
use crate::config::ReviewConfig;
use crate::error::{GithubError, ReviewError};
use crate::github::GithubApi;
use crate::llm::{Message, ModelClient, ModelLimits, Tokenizer};
use crate::types::{
    LinkedIssue, PullReview, PullState, ReviewAction, ReviewOutcome, ReviewSubject, ReviewVerdict,
    User, COLLABORATOR, HUMAN_USER_TYPE,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const APPROVAL_REACTION: &str = "+1";
const CONVERTED_TO_DRAFT: &str = "converted_to_draft";
const READY_FOR_REVIEW: &str = "ready_for_review";

/// Which event started the invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewTrigger {
    Opened,
    ReadyForReview,
    Edited,
}

/// `Some((elapsed, remaining))`, truncated to whole seconds, when the last bot
/// review is more recent than `interval`.
pub fn check_review_interval(
    last_review: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    interval: Option<Duration>,
) -> Option<(Duration, Duration)> {
    let interval = interval?;
    let last_review = last_review?;

    // A review stamped in the future counts as just submitted.
    let elapsed = (now - last_review).to_std().unwrap_or(Duration::ZERO);
    if elapsed >= interval {
        return None;
    }

    let whole_seconds = |d: Duration| Duration::from_secs(d.as_secs());
    Some((whole_seconds(elapsed), whole_seconds(interval - elapsed)))
}

fn record(failures: &mut Vec<String>, step: &str, result: Result<(), GithubError>) {
    if let Err(e) = result {
        tracing::error!("Failed to {}: {}", step, e);
        failures.push(format!("{}: {}", step, e));
    }
}

/// Gates, judges and acts on one pull request.
pub struct PullReviewer {
    github: Arc<dyn GithubApi>,
    client: Arc<dyn ModelClient>,
    tokenizer: Arc<dyn Tokenizer>,
    config: ReviewConfig,
}

impl PullReviewer {
    pub fn new(
        github: Arc<dyn GithubApi>,
        client: Arc<dyn ModelClient>,
        tokenizer: Arc<dyn Tokenizer>,
        config: ReviewConfig,
    ) -> Self {
        Self {
            github,
            client,
            tokenizer,
            config,
        }
    }

    /// Re-runs the precheck when an edit of the body adds a closing reference.
    pub async fn handle_body_edit(
        &self,
        subject: &ReviewSubject,
        previous_body: Option<&str>,
        sender: Option<&User>,
    ) -> Result<ReviewOutcome, ReviewError> {
        let Some(body) = subject.body.as_deref().filter(|b| !b.trim().is_empty()) else {
            return Ok(ReviewOutcome::skipped("Pull request body is empty, Aborting"));
        };
        let Some(previous_body) = previous_body else {
            return Ok(ReviewOutcome::skipped("Pull request body wasn't edited, Skipping"));
        };

        if !linkage_added(previous_body, body, &subject.coords) {
            return Ok(ReviewOutcome::skipped(
                "No new closing keyword with an issue reference detected in the PR body edit",
            ));
        }

        tracing::info!("Pull request body edit on {} links a new issue", subject);
        self.perform_precheck(subject, sender, ReviewTrigger::Edited)
            .await
    }

    /// Runs the gates in order and, when all pass, the review itself.
    pub async fn perform_precheck(
        &self,
        subject: &ReviewSubject,
        sender: Option<&User>,
        trigger: ReviewTrigger,
    ) -> Result<ReviewOutcome, ReviewError> {
        if subject.draft {
            tracing::info!("{} is in draft mode, no action required", subject);
            return Ok(ReviewOutcome::skipped("PR is in draft mode, no action required"));
        }
        if subject.state == PullState::Closed {
            tracing::info!("{} is closed, no action required", subject);
            return Ok(ReviewOutcome::skipped("PR is closed, no action required"));
        }

        let reviews = if self.config.review_interval.is_some()
            || self.config.skip_if_collaborator_converted
        {
            self.github
                .list_reviews(&subject.coords, subject.number)
                .await?
        } else {
            Vec::new()
        };

        self.enforce_review_interval(subject, &reviews, Utc::now())
            .await?;

        if let Some(reason) = self.identity_gate(subject, sender, &reviews).await? {
            tracing::info!("{}: {}", subject, reason);
            return Ok(ReviewOutcome::skipped(reason));
        }

        let issues = resolve_linked_issues(self.github.as_ref(), subject).await?;
        if issues.is_empty() {
            if trigger == ReviewTrigger::ReadyForReview {
                self.convert_to_draft_best_effort(subject).await;
                return Err(ReviewError::NoLinkedIssue {
                    subject: subject.to_string(),
                });
            }
            tracing::info!("{} does not link an issue", subject);
            return Ok(ReviewOutcome::skipped(
                "You need to link an issue before converting the pull request to ready for review",
            ));
        }

        let verdict = self.review_pull(subject, &issues).await?;
        self.dispatch_verdict(subject, verdict).await
    }

    async fn enforce_review_interval(
        &self,
        subject: &ReviewSubject,
        reviews: &[PullReview],
        now: DateTime<Utc>,
    ) -> Result<(), ReviewError> {
        let last_bot_review = reviews
            .iter()
            .filter(|review| review.is_from_bot())
            .filter_map(|review| review.submitted_at)
            .max();

        match check_review_interval(last_bot_review, now, self.config.review_interval) {
            Some((elapsed, remaining)) => {
                self.convert_to_draft_best_effort(subject).await;
                Err(ReviewError::ReviewIntervalNotMet {
                    subject: subject.to_string(),
                    elapsed,
                    remaining,
                })
            }
            None => {
                if let Some(last) = last_bot_review {
                    tracing::info!(
                        "Review interval met for {}, last bot review at {}",
                        subject,
                        last
                    );
                }
                Ok(())
            }
        }
    }

    async fn identity_gate(
        &self,
        subject: &ReviewSubject,
        sender: Option<&User>,
        reviews: &[PullReview],
    ) -> Result<Option<&'static str>, ReviewError> {
        if self.config.require_author_trigger {
            if let Some(sender) = sender {
                if sender.id != subject.author.id {
                    return Ok(Some("Review wasn't requested by pull author"));
                }
            }
        }

        if self.config.skip_collaborator_authors && subject.author_association == COLLABORATOR {
            return Ok(Some("Review was requested by core team, Skipping"));
        }

        if self.config.skip_if_collaborator_converted
            && self.has_collaborator_converted(subject, reviews).await?
        {
            return Ok(Some("Collaborator has converted the PR, no action required"));
        }

        Ok(None)
    }

    /// True when a human collaborator who reviewed the pull request also moved
    /// it into or out of draft.
    async fn has_collaborator_converted(
        &self,
        subject: &ReviewSubject,
        reviews: &[PullReview],
    ) -> Result<bool, ReviewError> {
        let reviewers: HashSet<&str> = reviews
            .iter()
            .filter(|review| review.author_association == COLLABORATOR)
            .filter_map(|review| review.user.as_ref())
            .filter(|user| user.kind == HUMAN_USER_TYPE && user.login != subject.author.login)
            .map(|user| user.login.as_str())
            .collect();
        if reviewers.is_empty() {
            return Ok(false);
        }

        let events = self
            .github
            .list_issue_events(&subject.coords, subject.number)
            .await?;

        Ok(events
            .iter()
            .filter(|event| event.event == CONVERTED_TO_DRAFT || event.event == READY_FOR_REVIEW)
            .filter_map(|event| event.actor.as_ref())
            .any(|actor| reviewers.contains(actor.login.as_str())))
    }

    /// Builds the context within the model's token limits and asks for a verdict.
    pub async fn review_pull(
        &self,
        subject: &ReviewSubject,
        issues: &[LinkedIssue],
    ) -> Result<ReviewVerdict, ReviewError> {
        let label = subject.to_string();
        let limits = ModelLimits::resolve(
            self.client.model(),
            self.config.context_token_limit,
            self.config.completion_token_limit,
        )?;
        let mut budget = TokenBudget::new(limits);

        let specifications: Vec<&str> = issues
            .iter()
            .map(|issue| issue.specification().unwrap_or(MISSING_SPECIFICATION))
            .collect();
        let ground_truths = find_ground_truths(
            self.github.as_ref(),
            self.client.as_ref(),
            &subject.coords,
            &specifications,
            budget.max_completion_tokens(),
        )
        .await?;

        let prompt_cost = self.tokenizer.count(&code_review_system_message(
            &ground_truths,
            &self.config.bot_name,
            "",
        )) + self.tokenizer.count(LLM_QUERY);
        budget.consume(prompt_cost, &label, "system prompt")?;

        let assembler = ContextAssembler::new(Arc::clone(&self.github), Arc::clone(&self.tokenizer));
        let (context, budget) = assembler.assemble(subject, issues, budget).await?;

        tracing::info!(
            "Requesting review of {} from {} ({} context tokens, {} completion tokens)",
            subject,
            self.client.model(),
            budget.running_token_count(),
            budget.max_completion_tokens()
        );

        let system = code_review_system_message(&ground_truths, &self.config.bot_name, &context);
        let answer = self
            .client
            .chat(
                &[Message::user(LLM_QUERY)],
                Some(&system),
                budget.max_completion_tokens(),
            )
            .await?;

        parse_verdict(&answer)
    }

    /// Acts on a verdict. Every side effect is attempted; failures are
    /// reported together afterwards.
    pub async fn dispatch_verdict(
        &self,
        subject: &ReviewSubject,
        verdict: ReviewVerdict,
    ) -> Result<ReviewOutcome, ReviewError> {
        let mut failures = Vec::new();

        let action = if verdict.passes() {
            if self.config.approval_reaction {
                record(
                    &mut failures,
                    "remove stale approval reaction",
                    self.remove_bot_approval(subject).await,
                );
                record(
                    &mut failures,
                    "add approval reaction",
                    self.github
                        .add_reaction(&subject.coords, subject.number, APPROVAL_REACTION)
                        .await,
                );
            }
            ReviewAction::Comment
        } else {
            record(
                &mut failures,
                "convert to draft",
                self.github.convert_to_draft(&subject.node_id).await,
            );
            record(
                &mut failures,
                "remove approval reaction",
                self.remove_bot_approval(subject).await,
            );
            ReviewAction::RequestChanges
        };

        record(
            &mut failures,
            "submit review",
            self.github
                .submit_review(&subject.coords, subject.number, &verdict.review_comment, action)
                .await,
        );

        if !failures.is_empty() {
            return Err(ReviewError::SideEffects {
                subject: subject.to_string(),
                failures,
            });
        }

        tracing::info!(
            "Reviewed {}: {} (confidence {:.2})",
            subject,
            action.as_str(),
            verdict.confidence_threshold
        );
        Ok(ReviewOutcome::Reviewed { action, verdict })
    }

    async fn remove_bot_approval(&self, subject: &ReviewSubject) -> Result<(), GithubError> {
        let reactions = self
            .github
            .list_reactions(&subject.coords, subject.number)
            .await?;

        for reaction in reactions.iter().filter(|reaction| {
            reaction.content == APPROVAL_REACTION
                && reaction.user.as_ref().map(User::is_bot).unwrap_or(false)
        }) {
            self.github
                .delete_reaction(&subject.coords, subject.number, reaction.id)
                .await?;
            tracing::info!("Removed approval reaction from {}", subject);
        }
        Ok(())
    }

    async fn convert_to_draft_best_effort(&self, subject: &ReviewSubject) {
        match self.github.convert_to_draft(&subject.node_id).await {
            Ok(()) => tracing::info!("Converted {} to draft", subject),
            Err(e) => tracing::warn!("Failed to convert {} to draft: {}", subject, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::testing::{
        bot, bot_review, collaborator_review, issue, subject, FakeGithub, FakeModel, WordTokenizer,
    };
    use crate::types::{IssueEvent, Reaction};
    use chrono::Duration as ChronoDuration;

    const PASSING: &str = r#"{"confidenceThreshold": 0.9, "reviewComment": "This pull request has passed the automated review"}"#;
    const FAILING: &str = "{confidenceThreshold: 0.2, reviewComment: 'Tests are missing'}";
    const DIFF: &str = "diff --git a/src/lib.rs b/src/lib.rs\n+pub fn widget() {}\n";

    fn reviewer(github: &Arc<FakeGithub>, model: &Arc<FakeModel>) -> PullReviewer {
        reviewer_with(github, model, ReviewConfig::default())
    }

    fn reviewer_with(
        github: &Arc<FakeGithub>,
        model: &Arc<FakeModel>,
        config: ReviewConfig,
    ) -> PullReviewer {
        PullReviewer::new(github.clone(), model.clone(), Arc::new(WordTokenizer), config)
    }

    fn linked_github() -> FakeGithub {
        FakeGithub::default()
            .with_closing_issues(vec![issue("acme", "widgets", 4, "Build the widget")])
            .with_diff(DIFF)
    }

    fn author() -> User {
        subject("").author
    }

    #[test]
    fn test_interval_boundaries() {
        let now = Utc::now();
        let day = Some(Duration::from_secs(86_400));

        assert_eq!(check_review_interval(None, now, day), None);
        assert_eq!(check_review_interval(Some(now), now, None), None);
        assert_eq!(
            check_review_interval(Some(now - ChronoDuration::days(2)), now, day),
            None
        );
        assert_eq!(
            check_review_interval(Some(now - ChronoDuration::days(1)), now, day),
            None
        );
        assert_eq!(
            check_review_interval(Some(now - ChronoDuration::hours(1)), now, day),
            Some((Duration::from_secs(3600), Duration::from_secs(23 * 3600)))
        );
    }

    #[test]
    fn test_interval_future_review_blocks() {
        let now = Utc::now();
        let blocked =
            check_review_interval(Some(now + ChronoDuration::minutes(5)), now, Some(Duration::from_secs(60)));
        assert_eq!(blocked, Some((Duration::ZERO, Duration::from_secs(60))));
    }

    #[tokio::test]
    async fn test_draft_is_skipped_without_calls() {
        let github = Arc::new(linked_github());
        let model = Arc::new(FakeModel::answering(&[PASSING]));
        let mut draft = subject("Resolves #4");
        draft.draft = true;

        let outcome = reviewer(&github, &model)
            .perform_precheck(&draft, Some(&author()), ReviewTrigger::Opened)
            .await
            .unwrap();

        assert_eq!(outcome, ReviewOutcome::skipped("PR is in draft mode, no action required"));
        assert!(github.calls().is_empty());
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_closed_is_skipped_without_calls() {
        let github = Arc::new(linked_github());
        let model = Arc::new(FakeModel::answering(&[PASSING]));
        let mut closed = subject("Resolves #4");
        closed.state = PullState::Closed;

        let outcome = reviewer(&github, &model)
            .perform_precheck(&closed, None, ReviewTrigger::Opened)
            .await
            .unwrap();

        assert!(matches!(outcome, ReviewOutcome::Skipped { .. }));
        assert!(github.calls().is_empty());
    }

    #[tokio::test]
    async fn test_recent_bot_review_blocks_and_converts_to_draft() {
        let github = Arc::new(linked_github().with_reviews(vec![bot_review(1)]));
        let model = Arc::new(FakeModel::answering(&[PASSING]));

        let err = reviewer(&github, &model)
            .perform_precheck(&subject("Resolves #4"), None, ReviewTrigger::Opened)
            .await
            .unwrap_err();

        match err {
            ReviewError::ReviewIntervalNotMet { elapsed, remaining, .. } => {
                assert!(elapsed >= Duration::from_secs(3599));
                assert!(remaining <= Duration::from_secs(23 * 3600 + 1));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(github.calls().contains(&"convert_to_draft PR_node".to_string()));
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_old_bot_review_allows_review() {
        let github = Arc::new(linked_github().with_reviews(vec![bot_review(48)]));
        let model = Arc::new(FakeModel::answering(&[PASSING]));

        let outcome = reviewer(&github, &model)
            .perform_precheck(&subject("Resolves #4"), None, ReviewTrigger::Opened)
            .await
            .unwrap();

        assert!(matches!(outcome, ReviewOutcome::Reviewed { action: ReviewAction::Comment, .. }));
    }

    #[tokio::test]
    async fn test_disabled_interval_ignores_recent_review() {
        let github = Arc::new(linked_github().with_reviews(vec![bot_review(0)]));
        let model = Arc::new(FakeModel::answering(&[PASSING]));
        let config = ReviewConfig {
            review_interval: None,
            ..ReviewConfig::default()
        };

        let outcome = reviewer_with(&github, &model, config)
            .perform_precheck(&subject("Resolves #4"), None, ReviewTrigger::Opened)
            .await
            .unwrap();

        assert!(matches!(outcome, ReviewOutcome::Reviewed { .. }));
    }

    #[tokio::test]
    async fn test_sender_must_be_author() {
        let github = Arc::new(linked_github());
        let model = Arc::new(FakeModel::answering(&[PASSING]));
        let stranger = User {
            login: "someone".to_string(),
            id: 99,
            kind: "User".to_string(),
        };

        let outcome = reviewer(&github, &model)
            .perform_precheck(&subject("Resolves #4"), Some(&stranger), ReviewTrigger::Opened)
            .await
            .unwrap();

        assert_eq!(outcome, ReviewOutcome::skipped("Review wasn't requested by pull author"));
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_collaborator_author_is_skipped() {
        let github = Arc::new(linked_github());
        let model = Arc::new(FakeModel::answering(&[PASSING]));
        let mut pull = subject("Resolves #4");
        pull.author_association = COLLABORATOR.to_string();

        let outcome = reviewer(&github, &model)
            .perform_precheck(&pull, Some(&author()), ReviewTrigger::Opened)
            .await
            .unwrap();

        assert_eq!(outcome, ReviewOutcome::skipped("Review was requested by core team, Skipping"));
    }

    #[tokio::test]
    async fn test_collaborator_conversion_is_skipped() {
        let github = Arc::new(
            linked_github()
                .with_reviews(vec![collaborator_review("maintainer")])
                .with_events(vec![IssueEvent {
                    event: "converted_to_draft".to_string(),
                    actor: Some(User {
                        login: "maintainer".to_string(),
                        id: 3,
                        kind: "User".to_string(),
                    }),
                    created_at: Utc::now(),
                }]),
        );
        let model = Arc::new(FakeModel::answering(&[PASSING]));

        let outcome = reviewer(&github, &model)
            .perform_precheck(&subject("Resolves #4"), Some(&author()), ReviewTrigger::ReadyForReview)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ReviewOutcome::skipped("Collaborator has converted the PR, no action required")
        );
    }

    #[tokio::test]
    async fn test_no_linked_issue_skips_on_open() {
        let github = Arc::new(FakeGithub::default().with_diff(DIFF));
        let model = Arc::new(FakeModel::answering(&[PASSING]));

        let outcome = reviewer(&github, &model)
            .perform_precheck(&subject("No references"), None, ReviewTrigger::Opened)
            .await
            .unwrap();

        assert!(matches!(outcome, ReviewOutcome::Skipped { .. }));
        assert!(!github.calls().iter().any(|c| c.starts_with("convert_to_draft")));
    }

    #[tokio::test]
    async fn test_no_linked_issue_fails_when_readying() {
        let github = Arc::new(FakeGithub::default().with_diff(DIFF));
        let model = Arc::new(FakeModel::answering(&[PASSING]));

        let err = reviewer(&github, &model)
            .perform_precheck(&subject("No references"), None, ReviewTrigger::ReadyForReview)
            .await
            .unwrap_err();

        assert!(matches!(err, ReviewError::NoLinkedIssue { .. }));
        assert!(github.calls().contains(&"convert_to_draft PR_node".to_string()));
    }

    #[tokio::test]
    async fn test_passing_verdict_comments_and_reacts() {
        let github = Arc::new(linked_github());
        let model = Arc::new(FakeModel::answering(&[PASSING]));

        let outcome = reviewer(&github, &model)
            .perform_precheck(&subject("Resolves #4"), Some(&author()), ReviewTrigger::Opened)
            .await
            .unwrap();

        assert!(matches!(outcome, ReviewOutcome::Reviewed { action: ReviewAction::Comment, .. }));
        let calls = github.calls();
        assert!(calls.contains(&"add_reaction +1".to_string()));
        assert!(calls.contains(&"submit_review COMMENT".to_string()));
        assert!(!calls.iter().any(|c| c.starts_with("convert_to_draft")));

        // Empty repository: ground truths short-circuit, so only the judge is asked.
        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].user, LLM_QUERY);
        assert_eq!(requests[0].max_tokens, 4096);
        let system = requests[0].system.as_deref().unwrap();
        assert!(system.contains("No languages found in the repository"));
        assert!(system.contains("=== Current Task Specification === acme/widgets/4 ==="));
        assert!(system.contains("+pub fn widget() {}"));
        assert!(system.contains("Your name is: UbiquityOS"));
    }

    #[tokio::test]
    async fn test_failing_verdict_requests_changes() {
        let github = Arc::new(linked_github().with_reactions(vec![
            Reaction {
                id: 11,
                content: "+1".to_string(),
                user: Some(bot()),
            },
            Reaction {
                id: 12,
                content: "+1".to_string(),
                user: Some(author()),
            },
        ]));
        let model = Arc::new(FakeModel::answering(&[FAILING]));

        let outcome = reviewer(&github, &model)
            .perform_precheck(&subject("Resolves #4"), Some(&author()), ReviewTrigger::Opened)
            .await
            .unwrap();

        match outcome {
            ReviewOutcome::Reviewed { action, verdict } => {
                assert_eq!(action, ReviewAction::RequestChanges);
                assert_eq!(verdict.review_comment, "Tests are missing");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        let calls = github.calls();
        assert!(calls.contains(&"convert_to_draft PR_node".to_string()));
        assert!(calls.contains(&"delete_reaction 11".to_string()));
        assert!(!calls.contains(&"delete_reaction 12".to_string()));
        assert!(calls.contains(&"submit_review REQUEST_CHANGES".to_string()));
    }

    #[tokio::test]
    async fn test_side_effect_failures_are_collected() {
        let github = Arc::new(linked_github().failing("convert_to_draft").failing("submit_review"));
        let model = Arc::new(FakeModel::answering(&[FAILING]));
        let verdict = parse_verdict(FAILING).unwrap();

        let err = reviewer(&github, &model)
            .dispatch_verdict(&subject("Resolves #4"), verdict)
            .await
            .unwrap_err();

        match err {
            ReviewError::SideEffects { failures, .. } => {
                assert_eq!(failures.len(), 2);
                assert!(failures[0].starts_with("convert to draft"));
                assert!(failures[1].starts_with("submit review"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(github.calls().contains(&"list_reactions".to_string()));
    }

    #[tokio::test]
    async fn test_approval_reaction_can_be_disabled() {
        let github = Arc::new(linked_github());
        let model = Arc::new(FakeModel::answering(&[]));
        let config = ReviewConfig {
            approval_reaction: false,
            ..ReviewConfig::default()
        };

        reviewer_with(&github, &model, config)
            .dispatch_verdict(&subject(""), parse_verdict(PASSING).unwrap())
            .await
            .unwrap();

        assert_eq!(github.calls(), vec!["submit_review COMMENT"]);
    }

    #[tokio::test]
    async fn test_unknown_model_fails_loudly() {
        let github = Arc::new(linked_github());
        let model = Arc::new(FakeModel::answering(&[PASSING]).with_model("mystery/model"));

        let err = reviewer(&github, &model)
            .perform_precheck(&subject("Resolves #4"), None, ReviewTrigger::Opened)
            .await
            .unwrap_err();

        assert!(matches!(err, ReviewError::Llm(LlmError::ModelLimitUnknown { .. })));
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_configured_limits_cover_unknown_model() {
        let github = Arc::new(linked_github());
        let model = Arc::new(FakeModel::answering(&[PASSING]).with_model("mystery/model"));
        let config = ReviewConfig {
            context_token_limit: Some(8_000),
            completion_token_limit: Some(500),
            ..ReviewConfig::default()
        };

        reviewer_with(&github, &model, config)
            .perform_precheck(&subject("Resolves #4"), None, ReviewTrigger::Opened)
            .await
            .unwrap();

        assert_eq!(model.requests()[0].max_tokens, 500);
    }

    #[tokio::test]
    async fn test_unparseable_verdict_is_an_error() {
        let github = Arc::new(linked_github());
        let model = Arc::new(FakeModel::answering(&["I cannot review this."]));

        let err = reviewer(&github, &model)
            .perform_precheck(&subject("Resolves #4"), None, ReviewTrigger::Opened)
            .await
            .unwrap_err();

        assert!(matches!(err, ReviewError::VerdictParse { .. }));
        assert!(!github.calls().iter().any(|c| c.starts_with("submit_review")));
    }

    #[tokio::test]
    async fn test_body_edit_without_new_linkage() {
        let github = Arc::new(linked_github());
        let model = Arc::new(FakeModel::answering(&[PASSING]));
        let edited = subject("Resolves #4\n\nNow with screenshots");

        let outcome = reviewer(&github, &model)
            .handle_body_edit(&edited, Some("Resolves #4"), None)
            .await
            .unwrap();

        assert!(matches!(outcome, ReviewOutcome::Skipped { .. }));
        assert!(github.calls().is_empty());
    }

    #[tokio::test]
    async fn test_body_edit_adding_linkage_reviews() {
        let github = Arc::new(linked_github());
        let model = Arc::new(FakeModel::answering(&[PASSING]));
        let edited = subject("Resolves #4");

        let outcome = reviewer(&github, &model)
            .handle_body_edit(&edited, Some("WIP"), Some(&author()))
            .await
            .unwrap();

        assert!(matches!(outcome, ReviewOutcome::Reviewed { .. }));
    }

    #[tokio::test]
    async fn test_body_edit_edge_cases() {
        let github = Arc::new(linked_github());
        let model = Arc::new(FakeModel::answering(&[]));
        let reviewer = reviewer(&github, &model);

        let empty = reviewer
            .handle_body_edit(&subject("  "), Some("Resolves #4"), None)
            .await
            .unwrap();
        assert_eq!(empty, ReviewOutcome::skipped("Pull request body is empty, Aborting"));

        let unchanged = reviewer
            .handle_body_edit(&subject("Resolves #4"), None, None)
            .await
            .unwrap();
        assert_eq!(unchanged, ReviewOutcome::skipped("Pull request body wasn't edited, Skipping"));
    }
}
