use crate::error::ReviewError;
use crate::llm::ModelLimits;

/// Token accounting for one review invocation.
///
/// `running + remaining + completion == model max` holds after every
/// operation; tokens only move from `remaining` to `running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    model_max_token_limit: usize,
    max_completion_tokens: usize,
    running_token_count: usize,
    tokens_remaining: usize,
}

impl TokenBudget {
    pub fn new(limits: ModelLimits) -> Self {
        let max_completion_tokens = limits.max_output_tokens.min(limits.max_context_tokens);
        Self {
            model_max_token_limit: limits.max_context_tokens,
            max_completion_tokens,
            running_token_count: 0,
            tokens_remaining: limits.max_context_tokens - max_completion_tokens,
        }
    }

    pub fn fits(&self, cost: usize) -> bool {
        cost <= self.tokens_remaining
    }

    /// Moves `cost` tokens into the running count if they fit.
    pub fn try_consume(&mut self, cost: usize) -> bool {
        if !self.fits(cost) {
            return false;
        }
        self.running_token_count += cost;
        self.tokens_remaining -= cost;
        true
    }

    pub fn consume(
        &mut self,
        cost: usize,
        subject: &str,
        stage: &'static str,
    ) -> Result<(), ReviewError> {
        if self.try_consume(cost) {
            Ok(())
        } else {
            Err(ReviewError::BudgetExhausted {
                subject: subject.to_string(),
                stage,
                tokens_remaining: self.tokens_remaining,
            })
        }
    }

    pub fn model_max_token_limit(&self) -> usize {
        self.model_max_token_limit
    }

    pub fn max_completion_tokens(&self) -> usize {
        self.max_completion_tokens
    }

    pub fn running_token_count(&self) -> usize {
        self.running_token_count
    }

    pub fn tokens_remaining(&self) -> usize {
        self.tokens_remaining
    }
}
