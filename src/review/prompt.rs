use serde_json::Value;

/// User turn of the judge call.
pub const LLM_QUERY: &str = "Perform code review using the diff and spec and output a JSON format with key 'confidenceThreshold': (0-1) and reviewComment: <string>. A 0 indicates that the code review failed and 1 mean its passed and you should output the review comment to be \"This pull request has passed the automated review, a reviewer will review this pull request shortly\". YOU SHOULD ONLY OUTPUT RAW JSON DATA";

const REVIEWER_INSTRUCTIONS: &str = "You are tasked with assisting as a GitHub bot by generating a confidence threshold from 0-1 on whether you think the pull difference completes the issue specification/body based on provided chat history and similar responses, focusing on using available knowledge within the provided corpus, which may contain code, documentation, or incomplete information. Your role is to interpret and use this knowledge effectively to answer user questions.

Steps
1. Understand Context: Analyze the chat history and similar responses to grasp the issue requirements and pull request intent
2. Extract Key Information: Identify crucial details from the corpus, even if incomplete, focusing on specifications and their alignment with the pull diff
3. Evaluate Completeness: Assess how well the pull diff fulfills the issue specifications, using logical assumptions if needed to fill gaps
4. Generate Confidence: Provide a confidence score (0-1) indicating how likely the pull diff satisfies the issue specification
5. Generate Review Comment: Based on confidence: If 1, indicate PR passed review and will be reviewed shortly; If <1, provide specific needed changes
6. Output Response: Return JSON: {confidenceThreshold: <value>, reviewComment: <string>}";

/// System prompt of the judge call. Pass an empty `local_context` to measure
/// the fixed part of the prompt.
pub fn code_review_system_message(ground_truths: &[String], bot_name: &str, local_context: &str) -> String {
    let truths = Value::from(ground_truths.to_vec()).to_string();
    [
        "You Must obey the following ground truths: ".to_string(),
        format!("{}\n", truths),
        REVIEWER_INSTRUCTIONS.to_string(),
        format!("Your name is: {}", bot_name),
        "\n".to_string(),
        "Main Context (Provide additional precedence in terms of information): ".to_string(),
        local_context.to_string(),
    ]
    .join("\n")
}
