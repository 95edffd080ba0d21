use crate::github::GithubApi;
use crate::types::ReviewSubject;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

const GITIGNORE: &str = ".gitignore";
const GITATTRIBUTES: &str = ".gitattributes";
const LINGUIST_GENERATED: &str = "linguist-generated";

/// Files left out of the reviewed diff: ignored paths and generated code.
#[derive(Debug, Clone)]
pub struct ExclusionRuleset {
    patterns: Vec<String>,
    set: GlobSet,
}

impl ExclusionRuleset {
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }

    pub fn from_sources(gitignore: &str, gitattributes: &str) -> Self {
        let mut patterns = linguist_generated_patterns(gitattributes);
        patterns.extend(gitignore_patterns(gitignore));
        Self::from_patterns(patterns)
    }

    pub fn from_patterns(patterns: Vec<String>) -> Self {
        let mut builder = GlobSetBuilder::new();
        let mut kept = Vec::with_capacity(patterns.len());

        for pattern in patterns {
            let globs = pattern_globs(&pattern);
            if globs.is_empty() {
                continue;
            }
            for glob in globs {
                match GlobBuilder::new(&glob).literal_separator(true).build() {
                    Ok(glob) => {
                        builder.add(glob);
                    }
                    Err(e) => tracing::warn!("Skipping exclusion pattern {:?}: {}", pattern, e),
                }
            }
            kept.push(pattern);
        }

        match builder.build() {
            Ok(set) => Self {
                patterns: kept,
                set,
            },
            Err(e) => {
                tracing::warn!("Failed to build exclusion set: {}", e);
                Self::empty()
            }
        }
    }

    pub fn is_excluded(&self, filename: &str) -> bool {
        self.set.is_match(filename)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

pub fn gitignore_patterns(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Patterns of `.gitattributes` lines that set `linguist-generated`.
pub fn linguist_generated_patterns(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let pattern = parts.next()?;
            let generated = parts.any(|attr| match attr.split_once('=') {
                Some((key, value)) => key == LINGUIST_GENERATED && value != "false",
                None => attr == LINGUIST_GENERATED,
            });
            generated.then(|| pattern.to_string())
        })
        .collect()
}

/// Translates one gitignore-style pattern into globs over repository paths.
/// Negations are not supported and produce nothing.
fn pattern_globs(pattern: &str) -> Vec<String> {
    let pattern = pattern.trim();
    if pattern.is_empty() || pattern.starts_with('#') || pattern.starts_with('!') {
        return Vec::new();
    }

    let dir_only = pattern.ends_with('/');
    let body = pattern.trim_end_matches('/');
    let anchored = body.starts_with('/') || body.contains('/');
    let body = body.trim_start_matches('/');
    if body.is_empty() {
        return Vec::new();
    }

    let base = if anchored {
        body.to_string()
    } else {
        format!("**/{}", body)
    };

    if dir_only {
        vec![format!("{}/**", base)]
    } else {
        vec![format!("{}/**", base), base]
    }
}

/// Reads both rule files at the pull request head. Missing files and failed
/// fetches contribute no rules.
pub async fn load_exclusions(github: &dyn GithubApi, subject: &ReviewSubject) -> ExclusionRuleset {
    let head = Some(subject.head_sha.as_str());
    let (gitignore, gitattributes) = tokio::join!(
        github.fetch_file_content(&subject.coords, GITIGNORE, head),
        github.fetch_file_content(&subject.coords, GITATTRIBUTES, head),
    );

    let read = |path: &str, result| match result {
        Ok(Some(content)) => content,
        Ok(None) => String::new(),
        Err(e) => {
            tracing::warn!("Could not read {} for {}: {}", path, subject, e);
            String::new()
        }
    };

    let ruleset =
        ExclusionRuleset::from_sources(&read(GITIGNORE, gitignore), &read(GITATTRIBUTES, gitattributes));
    if ruleset.is_empty() {
        tracing::debug!("No exclusion patterns for {}", subject);
    } else {
        tracing::debug!(
            "Loaded {} exclusion pattern(s) for {}",
            ruleset.patterns().len(),
            subject
        );
    }
    ruleset
}
