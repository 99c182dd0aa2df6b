//! Read-only checks over the staged posts. Nothing on disk is modified.

use std::{collections::BTreeMap, path::Path};

use anyhow::bail;
use log::{error, info, warn};
use once_cell::sync::Lazy;
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag};
use regex::Regex;
use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::{
    context::Context,
    document,
    frontmatter::{dedupe_heading_line, split_block},
    highlights::{HASH_REFERENCE, HIGHLIGHT},
    images::{self, BEAR_SIZING, IMG_DIR, PDF_LINK},
};

const REQUIRED_FIELDS: [&str; 3] = ["title", "author", "date"];
const BOOLEAN_FIELDS: [&str; 3] = ["draft", "toc", "code-line-numbers"];
const SHORT_BODY: usize = 50;

static DIR_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{8}_[a-z0-9-]+$").unwrap());
static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").unwrap());
static QUARTO_SIZING: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{width=\d+").unwrap());

#[derive(Serialize, Debug, Default)]
pub(crate) struct PostReport {
    pub name: String,
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(rename = "short-path", skip_serializing_if = "Option::is_none")]
    pub short_path: Option<String>,
}

impl PostReport {
    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

fn check_structure(post_dir: &Path, report: &mut PostReport) {
    if !DIR_NAME.is_match(&report.name) {
        report.warn(format!(
            "directory name does not match YYYYMMDD_slug: {}",
            report.name
        ));
    }
    let img_dir = post_dir.join(IMG_DIR);
    if img_dir.exists() {
        if !img_dir.is_dir() {
            report.error(format!("{IMG_DIR} exists but is not a directory"));
        } else if std::fs::read_dir(&img_dir).map_or(false, |mut e| e.next().is_none()) {
            report.warn(format!("{IMG_DIR} directory is empty"));
        }
    }
}

fn block_contents(block: &str) -> String {
    let lines: Vec<&str> = block.split_inclusive('\n').collect();
    lines[1..lines.len().saturating_sub(1)].concat()
}

fn field_text(metadata: &Mapping, key: &str) -> Option<String> {
    match metadata.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Checks the metadata block and returns the body that follows it.
fn check_frontmatter<'a>(text: &'a str, author: &str, report: &mut PostReport) -> &'a str {
    let (block, body) = split_block(text);
    if block.is_empty() {
        if text.lines().next().map_or(false, |l| l.trim() == "---") {
            report.error("metadata block is not terminated");
        } else {
            report.error("missing metadata block");
        }
        return body;
    }

    let metadata = match serde_yaml::from_str::<Value>(&block_contents(block)) {
        Ok(Value::Mapping(m)) => m,
        Ok(_) => {
            report.error("metadata block is not a key-value mapping");
            return body;
        }
        Err(e) => {
            report.error(format!("invalid YAML syntax: {e}"));
            return body;
        }
    };

    for field in REQUIRED_FIELDS {
        if !metadata.contains_key(field) {
            report.error(format!("missing required field: {field}"));
        }
    }

    if let Some(title) = metadata.get("title") {
        if !matches!(title, Value::String(s) if !s.trim().is_empty()) {
            report.error("title must be a non-empty string");
        }
    }
    if let Some(found) = field_text(&metadata, "author") {
        if found != author {
            report.warn(format!("author is '{found}', expected '{author}'"));
        }
    }
    if metadata.contains_key("date") {
        match field_text(&metadata, "date") {
            Some(date) if ISO_DATE.is_match(&date) => {}
            Some(date) => report.error(format!("date format should be YYYY-MM-DD, got: {date}")),
            None => report.error("date must be a YYYY-MM-DD string"),
        }
    }

    match metadata.get("categories") {
        None => {}
        Some(Value::Sequence(items)) if items.is_empty() => report.warn("categories list is empty"),
        Some(Value::Sequence(items)) if items.len() > 1 => report.warn(format!(
            "multiple categories found ({}), expected a single category",
            items.len()
        )),
        Some(Value::Sequence(_)) => {}
        Some(_) => report.error("categories must be a list"),
    }

    if let Some(value) = metadata.get("short-path") {
        match value {
            Value::String(s) if s.is_empty() => report.error("short-path must be a non-empty string"),
            Value::String(s) if !SLUG.is_match(s) => {
                report.error(format!("short-path contains invalid characters: {s}"))
            }
            Value::String(s) => report.short_path = Some(s.clone()),
            _ => report.error("short-path must be a non-empty string"),
        }
    }

    for field in BOOLEAN_FIELDS {
        if let Some(value) = metadata.get(field) {
            if !value.is_bool() {
                report.error(format!("field '{field}' should be a boolean, got: {value:?}"));
            }
        }
    }

    if matches!(metadata.get("description"), Some(Value::String(s)) if s.trim().is_empty()) {
        report.warn("description is empty");
    }

    body
}

fn check_images(body: &str, post_dir: &Path, report: &mut PostReport) {
    let references = images::image_references(body);
    if references.is_empty() {
        report.warn("no images found in content");
    }

    let mut local = vec![];
    for reference in references.iter().filter(|r| !images::is_remote(r)) {
        let decoded = images::percent_decode(reference);
        let file_name = match decoded.strip_prefix(&format!("{IMG_DIR}/")) {
            Some(name) if !name.contains('/') => name.to_string(),
            None if !decoded.contains('/') => decoded.clone(),
            _ => {
                report.error(format!("non-standard image path: {reference}"));
                continue;
            }
        };
        local.push(file_name);
    }

    // existence and orphans follow the same rules as the images pass
    let normalized: String = local
        .iter()
        .map(|name| format!("![]({IMG_DIR}/{name})\n"))
        .collect();
    let check = images::check_references(&normalized, post_dir);
    report.errors.extend(check.errors);
    report.warnings.extend(check.warnings);
}

fn unfenced_lines(body: &str) -> impl Iterator<Item = &str> {
    let mut in_fence = false;
    body.lines().filter(move |line| {
        if document::is_fence(line) {
            in_fence = !in_fence;
            return false;
        }
        !in_fence
    })
}

fn sample(found: Vec<String>) -> String {
    let shown = found.iter().take(3).cloned().collect::<Vec<_>>().join(", ");
    if found.len() > 3 {
        format!("{shown}, ...")
    } else {
        shown
    }
}

fn all_matches(re: &Regex, body: &str) -> Vec<String> {
    re.find_iter(body).map(|m| m.as_str().to_string()).collect()
}

fn check_leftovers(body: &str, report: &mut PostReport) {
    // fenced code keeps its markup through the highlights pass
    let prose = unfenced_lines(body).collect::<Vec<_>>().join("\n");
    let highlights = all_matches(&HIGHLIGHT, &prose);
    if !highlights.is_empty() {
        report.error(format!("unconverted highlights found: {}", sample(highlights)));
    }
    let references = all_matches(&HASH_REFERENCE, &prose);
    if !references.is_empty() {
        report.error(format!("hash references found: {}", sample(references)));
    }
    let duplicated: Vec<String> = unfenced_lines(body)
        .filter(|line| dedupe_heading_line(line).is_some())
        .map(|line| line.trim().to_string())
        .collect();
    if !duplicated.is_empty() {
        report.error(format!("duplicated heading markers found: {}", sample(duplicated)));
    }
    let sizing = all_matches(&BEAR_SIZING, body);
    if !sizing.is_empty() {
        report.error(format!("unconverted sizing syntax found: {}", sample(sizing)));
    }

    let quarto = QUARTO_SIZING.find_iter(body).count();
    if quarto > 0 {
        report.warn(format!(
            "found {quarto} images with explicit sizing, verify they render correctly"
        ));
    }
    let pdfs: Vec<String> = PDF_LINK
        .captures_iter(body)
        .map(|caps| caps[2].to_string())
        .collect();
    if !pdfs.is_empty() {
        report.warn(format!("PDF references may need manual review: {}", pdfs.join(", ")));
    }
}

fn check_content(body: &str, report: &mut PostReport) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        report.error("no content found after metadata");
        return;
    }
    if trimmed.chars().count() < SHORT_BODY {
        report.warn(format!(
            "content is very short ({} characters)",
            trimmed.chars().count()
        ));
    }

    let levels: Vec<HeadingLevel> = Parser::new(body)
        .filter_map(|event| match event {
            Event::Start(Tag::Heading { level, .. }) => Some(level),
            _ => None,
        })
        .collect();
    if levels.is_empty() {
        report.warn("no headings found in content");
    }
    let h1 = levels.iter().filter(|l| **l == HeadingLevel::H1).count();
    if h1 > 1 {
        report.warn(format!("multiple H1 headings found ({h1}), verify structure"));
    }
}

/// Collects every error and warning for one post directory.
pub(crate) fn validate_post(post_dir: &Path, author: &str) -> PostReport {
    let mut report = PostReport {
        name: document::dir_name(post_dir),
        ..Default::default()
    };
    check_structure(post_dir, &mut report);

    let text = match document::content_file(post_dir) {
        Ok(Some(path)) => {
            if path.file_name().map_or(true, |n| n != "index.qmd") {
                report.warn(format!(
                    "content file should be named index.qmd, found {}",
                    document::dir_name(&path)
                ));
            }
            document::read_text(&path)
        }
        Ok(None) => Err(anyhow::anyhow!("no content file found")),
        Err(e) => Err(e),
    };
    let text = match text {
        Ok(text) => text,
        Err(e) => {
            report.error(format!("{e:#}"));
            return report;
        }
    };

    let body = check_frontmatter(&text, author, &mut report);
    check_images(body, post_dir, &mut report);
    check_leftovers(body, &mut report);
    check_content(body, &mut report);

    report.valid = report.errors.is_empty();
    report
}

/// Short-paths claimed by more than one post, with the posts claiming them.
pub(crate) fn short_path_conflicts(reports: &[PostReport]) -> BTreeMap<String, Vec<String>> {
    let mut owners: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for report in reports {
        if let Some(short_path) = &report.short_path {
            owners
                .entry(short_path.clone())
                .or_default()
                .push(report.name.clone());
        }
    }
    owners.retain(|_, posts| posts.len() > 1);
    owners
}

fn log_report(report: &PostReport) {
    if report.valid {
        info!("{}: valid", report.name);
    } else {
        error!("{}: invalid ({} errors)", report.name, report.errors.len());
    }
    for message in &report.errors {
        error!("{}: {message}", report.name);
    }
    for message in &report.warnings {
        warn!("{}: {message}", report.name);
    }
}

pub(crate) fn run(context: &Context, json: bool) -> anyhow::Result<()> {
    let staging_dir = context.require_staging_dir()?;
    let mut post_dirs = vec![];
    for entry in std::fs::read_dir(staging_dir)? {
        let path = entry?.path();
        if path.is_dir() {
            post_dirs.push(path);
        }
    }
    post_dirs.sort();
    if post_dirs.is_empty() {
        info!("no posts found in {staging_dir:?}");
        return Ok(());
    }

    let reports: Vec<PostReport> = post_dirs
        .iter()
        .map(|dir| validate_post(dir, &context.author))
        .collect();
    let conflicts = short_path_conflicts(&reports);

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        reports.iter().for_each(log_report);
    }
    for (short_path, posts) in &conflicts {
        error!("short-path '{short_path}' used by: {}", posts.join(", "));
    }

    let invalid = reports.iter().filter(|r| !r.valid).count();
    info!("validated {} posts, {invalid} invalid", reports.len());
    if invalid > 0 || !conflicts.is_empty() {
        bail!(
            "validation failed: {invalid} invalid posts, {} short-path conflicts",
            conflicts.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUTHOR: &str = "Nikhil Agarwal";

    fn post(files: &[(&str, &str)]) -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("20250101_a-post");
        std::fs::create_dir(&dir).unwrap();
        for (name, content) in files {
            let path = dir.join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        root
    }

    fn report_for(root: &tempfile::TempDir) -> PostReport {
        validate_post(&root.path().join("20250101_a-post"), AUTHOR)
    }

    const GOOD: &str = "---\ntitle: A Post\nauthor: Nikhil Agarwal\ndate: \"2025-01-01\"\n\
        description: About things\nshort-path: a-post\ndraft: false\ncategories:\n  - notes\n---\n\n\
        ## Intro\n\nSome text that is long enough to not count as a short body.\n\n![pic](img/pic.png)\n";

    #[test]
    fn clean_post_is_valid() {
        let root = post(&[("index.qmd", GOOD), ("img/pic.png", "png")]);
        let report = report_for(&root);
        assert!(report.valid, "{:?}", report.errors);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert_eq!(report.short_path.as_deref(), Some("a-post"));
    }

    #[test]
    fn flags_missing_title_and_bad_date() {
        let root = post(&[(
            "index.qmd",
            "---\nauthor: Nikhil Agarwal\ndate: 01/02/2025\nshort-path: Bad Path\n---\nbody",
        )]);
        let report = report_for(&root);
        assert!(!report.valid);
        assert!(report.errors.contains(&"missing required field: title".to_string()));
        assert!(report
            .errors
            .contains(&"date format should be YYYY-MM-DD, got: 01/02/2025".to_string()));
        assert!(report
            .errors
            .contains(&"short-path contains invalid characters: Bad Path".to_string()));
    }

    #[test]
    fn flags_leftover_markup() {
        let body = "---\ntitle: T\nauthor: Nikhil Agarwal\ndate: \"2025-01-01\"\n---\n\
            # # Doubled\n==🟢x== [HASH abc123] ![a](img/a.png){\"width\":3}\n```\n## ## in code ==🔴kept==\n```\n";
        let root = post(&[("index.qmd", body), ("img/a.png", "png")]);
        let report = report_for(&root);
        assert_eq!(report.errors.len(), 4, "{:?}", report.errors);
        assert!(report.errors[2].contains("# # Doubled"));
        assert!(!report.errors[2].contains("in code"));
        assert_eq!(report.errors[0], "unconverted highlights found: ==🟢x==");
    }

    #[test]
    fn checks_image_paths() {
        let body = "---\ntitle: T\nauthor: Someone\ndate: \"2025-01-01\"\n---\n\
            ![a](Other/a.png) ![b](img/missing.png) ![c](https://x.org/c.png)";
        let root = post(&[("index.qmd", body), ("img/orphan.png", "png")]);
        let report = report_for(&root);
        assert_eq!(
            report.errors,
            vec![
                "non-standard image path: Other/a.png".to_string(),
                "missing image: img/missing.png".to_string(),
            ]
        );
        assert!(report.warnings.contains(&"author is 'Someone', expected 'Nikhil Agarwal'".to_string()));
        assert!(report.warnings.iter().any(|w| w.contains("orphan.png")));
    }

    #[test]
    fn headings_in_code_do_not_count() {
        let mut report = PostReport::default();
        check_content("# One\n\n```\n# not a heading\n```\n\n# Two\n\nplenty of text here to pass", &mut report);
        assert!(report.warnings.contains(&"multiple H1 headings found (2), verify structure".to_string()));

        let mut report = PostReport::default();
        check_content("```\n# code\n```", &mut report);
        assert!(report.warnings.contains(&"no headings found in content".to_string()));
    }

    #[test]
    fn empty_body_is_an_error() {
        let root = post(&[(
            "index.qmd",
            "---\ntitle: T\nauthor: Nikhil Agarwal\ndate: \"2025-01-01\"\n---\n\n",
        )]);
        let report = report_for(&root);
        assert_eq!(report.errors, vec!["no content found after metadata".to_string()]);
    }

    #[test]
    fn unterminated_and_missing_blocks() {
        let mut report = PostReport::default();
        check_frontmatter("---\ntitle: x\n", AUTHOR, &mut report);
        assert_eq!(report.errors, vec!["metadata block is not terminated".to_string()]);

        let mut report = PostReport::default();
        check_frontmatter("# Just text", AUTHOR, &mut report);
        assert_eq!(report.errors, vec!["missing metadata block".to_string()]);
    }

    #[test]
    fn detects_short_path_conflicts() {
        let report = |name: &str, short_path: &str| PostReport {
            name: name.to_string(),
            short_path: Some(short_path.to_string()),
            ..Default::default()
        };
        let conflicts = short_path_conflicts(&[
            report("20250101_a", "same"),
            report("20250102_b", "other"),
            report("20250103_c", "same"),
        ]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts["same"], vec!["20250101_a", "20250103_c"]);
    }
}
