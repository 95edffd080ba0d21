use super::budget::TokenBudget;
use super::diff::curate_diff;
use super::exclusions::load_exclusions;
use crate::error::ReviewError;
use crate::github::GithubApi;
use crate::llm::Tokenizer;
use crate::types::{LinkedIssue, ReviewSubject};
use std::sync::Arc;

const SPECIFICATION_LABEL: &str = "Current Task Specification";
const DIFF_LABEL: &str = "Pull Request Diff";
pub const MISSING_SPECIFICATION: &str = "No specification or body available";

fn header(label: &str, key: &str) -> String {
    format!("=== {} === {} ===\n", label, key)
}

fn footer(label: &str, key: &str) -> String {
    format!("=== End {} === {} ===\n", label, key)
}

fn specification_blocks(issues: &[LinkedIssue]) -> String {
    issues
        .iter()
        .map(|issue| {
            let key = issue.key();
            let specification = issue.specification().unwrap_or(MISSING_SPECIFICATION);
            [
                header(SPECIFICATION_LABEL, &key),
                format!("{}\n", specification),
                footer(SPECIFICATION_LABEL, &key),
            ]
            .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Everything the model sees except the diff text itself.
pub fn render_scaffolding(issues: &[LinkedIssue], pull_key: &str) -> String {
    [
        specification_blocks(issues),
        header(DIFF_LABEL, pull_key),
        footer(DIFF_LABEL, pull_key),
    ]
    .join("\n")
}

pub fn render_context(issues: &[LinkedIssue], pull_key: &str, diff: &str) -> String {
    [
        specification_blocks(issues),
        header(DIFF_LABEL, pull_key),
        diff.to_string(),
        footer(DIFF_LABEL, pull_key),
    ]
    .join("\n")
}

/// Builds the specification + diff block sent to the judge.
pub struct ContextAssembler {
    github: Arc<dyn GithubApi>,
    tokenizer: Arc<dyn Tokenizer>,
}

impl ContextAssembler {
    pub fn new(github: Arc<dyn GithubApi>, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { github, tokenizer }
    }

    /// Charges the scaffolding to `budget` first, then fills what is left
    /// with diff content. The budget is handed back charged with the exact
    /// cost of the rendered context.
    pub async fn assemble(
        &self,
        subject: &ReviewSubject,
        issues: &[LinkedIssue],
        mut budget: TokenBudget,
    ) -> Result<(String, TokenBudget), ReviewError> {
        let label = subject.to_string();
        let pull_key = subject.key();
        let initial = budget;

        // The diff is joined into the scaffolding with one more separator.
        let scaffolding = render_scaffolding(issues, &pull_key);
        budget.consume(
            self.tokenizer.count(&scaffolding) + self.tokenizer.count("\n"),
            &label,
            "context scaffolding",
        )?;

        let raw = self
            .github
            .fetch_diff(&subject.coords, subject.number)
            .await
            .map_err(|source| ReviewError::DiffFetch {
                subject: label.clone(),
                source,
            })?;
        let ruleset = load_exclusions(self.github.as_ref(), subject).await;

        let tokenizer = Arc::clone(&self.tokenizer);
        let (curated, budget) = tokio::task::spawn_blocking(move || {
            let curated = curate_diff(&raw, &ruleset, tokenizer.as_ref(), &mut budget);
            (curated, budget)
        })
        .await
        .map_err(|e| ReviewError::Task(format!("diff curation failed: {}", e)))?;

        let curated = curated.ok_or_else(|| ReviewError::BudgetExhausted {
            subject: label.clone(),
            stage: "pull request diff",
            tokens_remaining: budget.tokens_remaining(),
        })?;

        tracing::info!(
            "Curated diff for {}: {} file(s) included, {} skipped, {} tokens used, {} remaining",
            subject,
            curated.included.len(),
            curated.skipped.len(),
            budget.running_token_count(),
            budget.tokens_remaining()
        );

        let context = render_context(issues, &pull_key, &curated.text);
        let mut charged = initial;
        charged.consume(self.tokenizer.count(&context), &label, "pull request context")?;
        if charged.running_token_count() != budget.running_token_count() {
            tracing::debug!(
                "Rendered context for {} costs {} tokens, estimated {}",
                subject,
                charged.running_token_count() - initial.running_token_count(),
                budget.running_token_count() - initial.running_token_count()
            );
        }

        Ok((context, charged))
    }
}
