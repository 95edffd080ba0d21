use crate::error::{GroundTruthError, ReviewError};
use crate::github::GithubApi;
use crate::llm::{Message, ModelClient};
use crate::types::RepoCoords;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

const MAX_GROUND_TRUTHS: usize = 10;
const PACKAGE_MANIFEST: &str = "package.json";

const TRUTH_RULES: [&str; 3] = [
    "Be succinct and easy to understand.",
    "Directly pertain to the task at hand.",
    "Focus on essential requirements, behaviors, or assumptions involved in the task.",
];

const TRUTH_EXAMPLE: &str = " Task: Implement a function that adds two numbers.
        Ground Truths:
        - The function should accept two numerical inputs.
        - The function should return the sum of the two inputs.
        - Inputs must be validated to ensure they are numbers.";

/// Returned verbatim, without asking the model, for repositories with no
/// detectable stack.
pub const EMPTY_REPOSITORY_TRUTHS: [&str; 3] = [
    "No languages found in the repository",
    "No dependencies found in the repository",
    "No devDependencies found in the repository",
];

pub fn ground_truth_system_message(rules: &[&str], example: &[&str], conditions: &[&str]) -> String {
    let conditions = if conditions.is_empty() {
        String::new()
    } else {
        format!("Conditions:\n{}", conditions.join("\n"))
    };

    format!(
        "
Using the input provided, your goal is to produce an array of strings that represent \"Ground Truths.\"
These ground truths are high-level abstractions that encapsulate the tech stack and dependencies of the repository.
  
Each ground truth should:
- {}
  
Example:
{}
  
{}
  
Generate similar ground truths adhering to a maximum of {}.
  
Return a JSON parsable array of strings representing the ground truths, without comment or directive.",
        rules.join("\n- "),
        example.join("\n"),
        conditions,
        MAX_GROUND_TRUTHS
    )
}

/// Checks the model's answer: a JSON array of at most ten strings, optionally
/// wrapped in a code fence.
pub fn validate_ground_truths(raw: &str) -> Result<Vec<String>, GroundTruthError> {
    let trimmed = strip_code_fence(raw.trim());
    if trimmed.is_empty() {
        return Err(GroundTruthError::Empty);
    }

    let value: Value = serde_json::from_str(trimmed).map_err(|source| GroundTruthError::Parse {
        source,
        payload: raw.to_string(),
    })?;

    let shape = |reason: &str| GroundTruthError::Shape {
        reason: reason.to_string(),
        payload: raw.to_string(),
    };

    let entries = value
        .as_array()
        .ok_or_else(|| shape("ground truths must be an array"))?;
    if entries.len() > MAX_GROUND_TRUTHS {
        return Err(shape("ground truths must not exceed 10"));
    }

    entries
        .iter()
        .map(|entry| {
            entry
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| shape("each ground truth must be a string"))
        })
        .collect()
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (`json`) on the opening line.
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Debug, Default, Deserialize)]
struct PackageManifest {
    #[serde(default)]
    dependencies: BTreeMap<String, Value>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: BTreeMap<String, Value>,
}

/// What the repository itself says about its stack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepoSignals {
    /// Share of code per language, largest first.
    pub languages: Vec<(String, f64)>,
    pub dependencies: Vec<String>,
    pub dev_dependencies: Vec<String>,
}

impl RepoSignals {
    pub fn is_empty(&self) -> bool {
        self.languages.is_empty() && self.dependencies.is_empty() && self.dev_dependencies.is_empty()
    }

    pub fn language_shares(bytes: &BTreeMap<String, u64>) -> Vec<(String, f64)> {
        let total: u64 = bytes.values().sum();
        if total == 0 {
            return Vec::new();
        }
        let mut shares: Vec<(String, f64)> = bytes
            .iter()
            .map(|(language, count)| (language.clone(), *count as f64 / total as f64))
            .collect();
        shares.sort_by(|a, b| b.1.total_cmp(&a.1));
        shares
    }

    fn describe(&self) -> String {
        let languages = self
            .languages
            .iter()
            .map(|(language, share)| format!("{} ({:.1}%)", language, share * 100.0))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Languages: {}\nDependencies: {}\nDevDependencies: {}",
            languages,
            self.dependencies.join(", "),
            self.dev_dependencies.join(", ")
        )
    }
}

/// Fetches language stats and the dependency manifest concurrently. Either
/// source failing contributes nothing.
pub async fn fetch_repo_signals(github: &dyn GithubApi, coords: &RepoCoords) -> RepoSignals {
    let (languages, manifest) = tokio::join!(
        github.repo_languages(coords),
        github.fetch_file_content(coords, PACKAGE_MANIFEST, None),
    );

    let languages = match languages {
        Ok(bytes) => RepoSignals::language_shares(&bytes),
        Err(e) => {
            tracing::warn!("Error fetching language stats for {}: {}", coords.full_name(), e);
            Vec::new()
        }
    };

    let manifest = match manifest {
        Ok(Some(content)) => serde_json::from_str::<PackageManifest>(&content).unwrap_or_else(|e| {
            tracing::warn!("Invalid {} in {}: {}", PACKAGE_MANIFEST, coords.full_name(), e);
            PackageManifest::default()
        }),
        Ok(None) => PackageManifest::default(),
        Err(e) => {
            tracing::warn!("Error fetching {} for {}: {}", PACKAGE_MANIFEST, coords.full_name(), e);
            PackageManifest::default()
        }
    };

    RepoSignals {
        languages,
        dependencies: manifest.dependencies.into_keys().collect(),
        dev_dependencies: manifest.dev_dependencies.into_keys().collect(),
    }
}

/// Distills the linked specifications into at most ten constraints.
pub async fn find_ground_truths(
    github: &dyn GithubApi,
    client: &dyn ModelClient,
    coords: &RepoCoords,
    specifications: &[&str],
    max_tokens: usize,
) -> Result<Vec<String>, ReviewError> {
    let signals = fetch_repo_signals(github, coords).await;
    if signals.is_empty() {
        tracing::info!(
            "{} has no languages or dependencies, using fixed ground truths",
            coords.full_name()
        );
        return Ok(EMPTY_REPOSITORY_TRUTHS.iter().map(|t| t.to_string()).collect());
    }

    let system = ground_truth_system_message(&TRUTH_RULES, &[TRUTH_EXAMPLE], &[]);
    let source = format!("{}\n\n{}", specifications.join("\n\n"), signals.describe());

    let answer = client
        .chat(&[Message::user(source)], Some(&system), max_tokens)
        .await?;
    let truths = validate_ground_truths(&answer)?;

    tracing::debug!("Ground truths for {}: {:?}", coords.full_name(), truths);
    Ok(truths)
}
