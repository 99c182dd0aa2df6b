use serde_yaml::Mapping;

use super::{fields::scalar_to_string, NormalizeError};
use crate::document::is_fence;

/// Keys that may declare the title, including a common misspelling.
const TITLE_KEYS: [&str; 2] = ["title", "titel"];

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct HeadingFix {
    pub before: String,
    pub after: String,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ResolvedTitle {
    pub title: String,
    pub body: String,
    /// true when the title came from a heading line that was removed from the body
    pub from_body: bool,
}

/// Collapses `# # Hello` into `# Hello`. Returns `None` for any other line.
pub(crate) fn dedupe_heading_line(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let indent = &line[..line.len() - trimmed.len()];

    let level = trimmed.chars().take_while(|&c| c == '#').count();
    if level == 0 {
        return None;
    }
    let rest = &trimmed[level..];
    let second_run = rest.trim_start();
    if second_run.len() == rest.len() {
        return None;
    }
    if second_run.chars().take_while(|&c| c == '#').count() != level {
        return None;
    }
    let text = &second_run[level..];
    if !text.starts_with(char::is_whitespace) || text.trim().is_empty() {
        return None;
    }

    Some(format!("{indent}{} {}", "#".repeat(level), text.trim()))
}

/// Applies [`dedupe_heading_line`] to every line outside fenced code.
pub(crate) fn dedupe_heading_markers(body: &str) -> (String, Vec<HeadingFix>) {
    let mut fixes = vec![];
    let mut in_fence = false;
    let lines: Vec<String> = body
        .split('\n')
        .map(|line| {
            if is_fence(line) {
                in_fence = !in_fence;
                return line.to_string();
            }
            let fixed = if in_fence { None } else { dedupe_heading_line(line) };
            match fixed {
                Some(fixed) => {
                    fixes.push(HeadingFix {
                        before: line.trim().to_string(),
                        after: fixed.trim().to_string(),
                    });
                    fixed
                }
                None => line.to_string(),
            }
        })
        .collect();

    (lines.join("\n"), fixes)
}

pub(crate) fn declared_title(metadata: &Mapping) -> Option<String> {
    TITLE_KEYS
        .iter()
        .filter_map(|key| metadata.get(*key).and_then(scalar_to_string))
        .map(|title| title.trim().to_string())
        .find(|title| !title.is_empty())
}

/// Picks the title from metadata, falling back to the first `#`/`##` heading of the body.
pub(crate) fn resolve_title(metadata: &Mapping, body: &str) -> Result<ResolvedTitle, NormalizeError> {
    if let Some(title) = declared_title(metadata) {
        return Ok(ResolvedTitle {
            title,
            body: body.to_string(),
            from_body: false,
        });
    }

    let lines: Vec<&str> = body.split('\n').collect();
    let mut in_fence = false;
    for (i, line) in lines.iter().enumerate() {
        if is_fence(line) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        let line = line.trim();
        if !(line.starts_with("# ") || line.starts_with("## ")) {
            continue;
        }
        let title = line.trim_start_matches('#').trim();
        if title.is_empty() {
            continue;
        }
        let remaining: Vec<&str> = lines[..i].iter().chain(&lines[i + 1..]).copied().collect();
        return Ok(ResolvedTitle {
            title: title.to_string(),
            body: remaining.join("\n").trim().to_string(),
            from_body: true,
        });
    }

    Err(NormalizeError::MissingTitle)
}
