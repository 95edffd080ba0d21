use super::budget::TokenBudget;
use super::exclusions::ExclusionRuleset;
use crate::llm::Tokenizer;
use rayon::prelude::*;
use regex::Regex;
use std::sync::LazyLock;

const FILE_SEPARATOR: &str = "\n";

static FILE_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^diff --git a/(.*?) b/.*$").expect("FILE_HEADER_RE regex should compile")
});

/// One file's section of a unified diff, header line included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub filename: String,
    pub content: String,
}

impl FileDiff {
    pub fn measure(self, tokenizer: &dyn Tokenizer) -> DiffFragment {
        let tokens = tokenizer.count(&self.content);
        DiffFragment {
            filename: self.filename,
            content: self.content,
            tokens,
        }
    }
}

/// A file diff with its exact token cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffFragment {
    pub filename: String,
    pub content: String,
    pub tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuratedDiff {
    pub text: String,
    /// Token cost of `text` as a whole, separators included.
    pub tokens: usize,
    pub included: Vec<String>,
    pub skipped: Vec<String>,
}

/// Splits a unified diff on its `diff --git` boundaries.
pub fn parse_per_file_diffs(raw: &str) -> Vec<FileDiff> {
    let headers: Vec<(usize, String)> = FILE_HEADER_RE
        .captures_iter(raw)
        .filter_map(|captures| {
            let start = captures.get(0)?.start();
            Some((start, captures.get(1)?.as_str().to_string()))
        })
        .collect();

    headers
        .iter()
        .enumerate()
        .map(|(i, (start, filename))| {
            let end = headers.get(i + 1).map(|(next, _)| *next).unwrap_or(raw.len());
            FileDiff {
                filename: filename.clone(),
                content: raw[*start..end].trim().to_string(),
            }
        })
        .collect()
}

/// Picks the files of `raw` that fit into `budget`, cheapest first.
///
/// Excluded files are dropped before tokenization. Every fragment is measured
/// before selection starts; a fragment that does not fit is skipped and the
/// walk continues with the next one. The joined text is counted again before
/// it is charged, and the largest selected files are dropped until it fits.
/// Returns `None` when nothing fits; `budget` is left untouched then.
pub fn curate_diff(
    raw: &str,
    ruleset: &ExclusionRuleset,
    tokenizer: &dyn Tokenizer,
    budget: &mut TokenBudget,
) -> Option<CuratedDiff> {
    let (kept, excluded): (Vec<FileDiff>, Vec<FileDiff>) = parse_per_file_diffs(raw)
        .into_iter()
        .partition(|file| !ruleset.is_excluded(&file.filename));

    for file in &excluded {
        tracing::debug!("Excluding {} from the reviewed diff", file.filename);
    }

    let mut fragments: Vec<DiffFragment> = kept
        .into_par_iter()
        .map(|file| file.measure(tokenizer))
        .collect();
    fragments.sort_by_key(|fragment| fragment.tokens);

    let separator = tokenizer.count(FILE_SEPARATOR);
    let mut selection = *budget;
    let mut selected: Vec<DiffFragment> = Vec::new();
    let mut skipped = Vec::new();

    for fragment in fragments {
        let cost = if selected.is_empty() {
            fragment.tokens
        } else {
            fragment.tokens + separator
        };
        if selection.try_consume(cost) {
            selected.push(fragment);
        } else {
            tracing::info!(
                "Skipping {} ({} tokens) to stay within token limits, {} remaining",
                fragment.filename,
                fragment.tokens,
                selection.tokens_remaining()
            );
            skipped.push(fragment.filename);
        }
    }

    // Tokens can merge across file boundaries, so the sum of the parts is
    // only an estimate of the joined cost.
    while !selected.is_empty() {
        let text = selected
            .iter()
            .map(|fragment| fragment.content.as_str())
            .collect::<Vec<_>>()
            .join(FILE_SEPARATOR);
        let tokens = tokenizer.count(&text);

        let mut charged = *budget;
        if charged.try_consume(tokens) {
            *budget = charged;
            return Some(CuratedDiff {
                text,
                tokens,
                included: selected.into_iter().map(|fragment| fragment.filename).collect(),
                skipped,
            });
        }

        if let Some(largest) = selected.pop() {
            tracing::info!(
                "Dropping {} ({} tokens): the joined diff costs {} tokens, {} remaining",
                largest.filename,
                largest.tokens,
                tokens,
                budget.tokens_remaining()
            );
            skipped.push(largest.filename);
        }
    }

    tracing::error!("Cannot include any files from the diff without exceeding token limits");
    None
}
