use crate::error::LlmError;

/// `(model, context window, max output tokens)`
const KNOWN_LIMITS: &[(&str, usize, usize)] = &[
    ("anthropic/claude-3.5-sonnet", 200_000, 4_096),
    ("anthropic/claude-sonnet-4", 200_000, 8_192),
    ("claude-3-5-sonnet-20241022", 200_000, 8_192),
    ("claude-sonnet-4-20250514", 200_000, 8_192),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelLimits {
    pub max_context_tokens: usize,
    pub max_output_tokens: usize,
}

impl ModelLimits {
    /// Looks up the limits of `model`, letting configured values override the
    /// table. Fails loudly when neither source knows a limit.
    pub fn resolve(
        model: &str,
        context_override: Option<usize>,
        completion_override: Option<usize>,
    ) -> Result<Self, LlmError> {
        let known = KNOWN_LIMITS
            .iter()
            .find(|(name, _, _)| *name == model)
            .map(|(_, context, output)| (*context, *output));

        let unknown = || LlmError::ModelLimitUnknown {
            model: model.to_string(),
        };

        let max_context_tokens = context_override
            .or(known.map(|(context, _)| context))
            .ok_or_else(unknown)?;
        let max_output_tokens = completion_override
            .or(known.map(|(_, output)| output))
            .ok_or_else(unknown)?;

        if max_output_tokens >= max_context_tokens {
            return Err(LlmError::Configuration(format!(
                "completion limit {} must be smaller than the context window {} of {}",
                max_output_tokens, max_context_tokens, model
            )));
        }

        Ok(Self {
            max_context_tokens,
            max_output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_model() {
        let limits = ModelLimits::resolve("anthropic/claude-3.5-sonnet", None, None).unwrap();
        assert_eq!(limits.max_context_tokens, 200_000);
        assert_eq!(limits.max_output_tokens, 4_096);
    }

    #[test]
    fn test_unknown_model_fails() {
        let err = ModelLimits::resolve("mystery/model", None, None).unwrap_err();
        assert!(matches!(err, LlmError::ModelLimitUnknown { model } if model == "mystery/model"));
    }

    #[test]
    fn test_unknown_model_with_overrides() {
        let limits = ModelLimits::resolve("mystery/model", Some(32_000), Some(2_000)).unwrap();
        assert_eq!(limits.max_context_tokens, 32_000);
        assert_eq!(limits.max_output_tokens, 2_000);
    }

    #[test]
    fn test_partial_override_keeps_table_value() {
        let limits =
            ModelLimits::resolve("anthropic/claude-3.5-sonnet", None, Some(1_024)).unwrap();
        assert_eq!(limits.max_context_tokens, 200_000);
        assert_eq!(limits.max_output_tokens, 1_024);
    }

    #[test]
    fn test_completion_must_fit_context() {
        let err = ModelLimits::resolve("mystery/model", Some(1_000), Some(1_000)).unwrap_err();
        assert!(matches!(err, LlmError::Configuration(_)));
    }
}
