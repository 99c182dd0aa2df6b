//! Bear-specific markup: colored highlights, tags and `[HASH ..]` index references.

use std::{collections::BTreeMap, path::Path};

use anyhow::Context as _;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::{
    batch,
    context::Context,
    document::{self, is_fence},
    frontmatter::split_block,
    note::Note,
};

/// emoji, color name, background color
const HIGHLIGHT_COLORS: [(&str, &str, &str); 5] = [
    ("🟢", "green", "#90EE90"),
    ("🔴", "red", "#ffcccb"),
    ("🔵", "blue", "#add8e6"),
    ("🟡", "yellow", "#ffffe0"),
    ("🟣", "purple", "#dda0dd"),
];

pub(crate) static HIGHLIGHT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"==(🟢|🔴|🔵|🟡|🟣)([^=]+)==").unwrap());
// `#multi word tag#` and `#tag/sub tag#`
static MULTIWORD_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([^#\s][^#\n]*[\s/][^#\n]*[^#\s])#").unwrap());
// `#tag` and `#tag/sub`, not preceded by a word character
static SINGLEWORD_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[^\w])#([A-Za-z0-9_]+(?:/[A-Za-z0-9_]+)*)").unwrap());
pub(crate) static HASH_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[HASH\s+[a-fA-F0-9]+\]").unwrap());
static SPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\S) {2,}").unwrap());

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Conversion {
    /// converted highlights per color name
    pub highlights: BTreeMap<&'static str, usize>,
    pub removed_tags: Vec<String>,
    pub removed_references: Vec<String>,
}

impl Conversion {
    pub fn highlight_count(&self) -> usize {
        self.highlights.values().sum()
    }
}

fn remove_tags(line: &str, removed: &mut Vec<String>) -> String {
    let line = MULTIWORD_TAG.replace_all(line, |caps: &Captures| {
        removed.push(caps[0].to_string());
        String::new()
    });

    let mut out = String::with_capacity(line.len());
    let mut last = 0;
    for caps in SINGLEWORD_TAG.captures_iter(&line) {
        let whole = caps.get(0).unwrap();
        let next = line[whole.end()..].chars().next();
        if next.map_or(false, |c| c.is_alphanumeric() || c == '_' || c == '/') {
            continue;
        }
        let prefix = &caps[1];
        out.push_str(&line[last..whole.start()]);
        out.push_str(prefix);
        removed.push(whole.as_str()[prefix.len()..].to_string());
        last = whole.end();
    }
    out.push_str(&line[last..]);
    out
}

fn remove_references(line: &str, removed: &mut Vec<String>) -> String {
    HASH_REFERENCE
        .replace_all(line, |caps: &Captures| {
            removed.push(caps[0].to_string());
            String::new()
        })
        .into_owned()
}

fn convert_highlights(line: &str, counts: &mut BTreeMap<&'static str, usize>) -> String {
    HIGHLIGHT
        .replace_all(line, |caps: &Captures| {
            let (_, name, color) = HIGHLIGHT_COLORS
                .iter()
                .find(|(emoji, _, _)| *emoji == &caps[1])
                .copied()
                .unwrap_or(("", "unknown", ""));
            *counts.entry(name).or_default() += 1;
            if color.is_empty() {
                format!("<mark>{}</mark>", &caps[2])
            } else {
                format!("<mark style=\"background-color: {color}\">{}</mark>", &caps[2])
            }
        })
        .into_owned()
}

fn strip_line(line: &str, conversion: &mut Conversion) -> String {
    let stripped = remove_tags(line, &mut conversion.removed_tags);
    let stripped = remove_references(&stripped, &mut conversion.removed_references);
    if stripped != line && !stripped.trim().is_empty() {
        SPACE_RUN.replace_all(&stripped, "$1 ").into_owned()
    } else {
        stripped
    }
}

/// Rewrites the body of a document. The metadata block and fenced code are left untouched.
///
/// Tags and references are stripped line by line. Highlights are converted over each run
/// of lines between fences, so a highlight may span several lines.
pub(crate) fn convert(text: &str) -> (String, Conversion) {
    let (block, body) = split_block(text);
    let mut conversion = Conversion::default();
    let mut in_fence = false;
    let mut out: Vec<String> = vec![];
    let mut run: Vec<String> = vec![];

    for line in body.split('\n') {
        if is_fence(line) || in_fence {
            if !run.is_empty() {
                out.push(convert_highlights(&run.join("\n"), &mut conversion.highlights));
                run.clear();
            }
            if is_fence(line) {
                in_fence = !in_fence;
            }
            out.push(line.to_string());
        } else {
            // tags go first so generated color codes are never read as tags
            run.push(strip_line(line, &mut conversion));
        }
    }
    if !run.is_empty() {
        out.push(convert_highlights(&run.join("\n"), &mut conversion.highlights));
    }

    (format!("{block}{}", out.join("\n")), conversion)
}

fn preview(items: &[String], limit: usize) -> String {
    let mut shown = items.iter().take(limit).cloned().collect::<Vec<_>>().join(", ");
    if items.len() > limit {
        shown.push_str(&format!(", ... and {} more", items.len() - limit));
    }
    shown
}

/// Converts the content file of one post in place.
pub(crate) fn process_post(post_dir: &Path) -> anyhow::Result<Vec<Note>> {
    let path = document::content_file(post_dir)?
        .with_context(|| format!("no markdown file found in {post_dir:?}"))?;
    let original = document::read_text(&path)?;
    let (converted, conversion) = convert(&original);

    let mut notes = vec![];
    if converted == original {
        notes.push(Note::info("no Bear-specific content found, file unchanged"));
        return Ok(notes);
    }

    if conversion.highlight_count() > 0 {
        let breakdown = conversion
            .highlights
            .iter()
            .map(|(color, count)| format!("{color}: {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        notes.push(Note::info(format!(
            "converted {} highlights ({breakdown})",
            conversion.highlight_count()
        )));
    }
    if !conversion.removed_tags.is_empty() {
        notes.push(Note::info(format!(
            "removed {} tags: {}",
            conversion.removed_tags.len(),
            preview(&conversion.removed_tags, 5)
        )));
    }
    if !conversion.removed_references.is_empty() {
        notes.push(Note::info(format!(
            "removed {} hash references: {}",
            conversion.removed_references.len(),
            preview(&conversion.removed_references, 3)
        )));
    }

    document::write_text(&path, &converted)?;
    Ok(notes)
}

pub(crate) fn run(context: &Context) -> anyhow::Result<()> {
    let staging_dir = context.require_staging_dir()?;
    let posts = document::post_dirs(staging_dir)?;
    batch::run(&posts, process_post).finish("highlights")
}
