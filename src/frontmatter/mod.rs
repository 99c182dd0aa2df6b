//! Frontmatter normalization: turns a loosely formatted note into a post with a
//! complete, ordered metadata block.
//!
//! The registry of used slugs and the site owner's name are passed in explicitly,
//! so every call is isolated from the others except through [`SlugRegistry`].

use std::path::Path;

use anyhow::Context as _;
use chrono::NaiveDate;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

use crate::{batch, context::Context, document, note::Note};

mod extract;
mod fields;
mod heading;
mod serialize;
mod slug;

pub(crate) use extract::{extract, split_block, BOM};
pub(crate) use heading::{dedupe_heading_line, dedupe_heading_markers, resolve_title};
pub(crate) use serialize::serialize;
pub(crate) use slug::{sanitize_slug, SlugRegistry};

/// Fields rewritten by the normalizer. Anything else is either passed through or dropped.
const HANDLED_FIELDS: &[&str] = &[
    "title",
    "titel",
    "author",
    "date",
    "description",
    "short-path",
    "draft",
    "toc",
    "toc-depth",
    "code-line-numbers",
    "categories",
];

/// Auxiliary fields copied unchanged after the canonical ones.
const PASS_THROUGH_FIELDS: &[&str] = &[
    "subtitle",
    "image",
    "image-alt",
    "lang",
    "bibliography",
    "citation",
    "google-scholar",
    "filters",
    "lightbox",
    "fig-cap-location",
];

#[derive(Error, Debug)]
pub(crate) enum NormalizeError {
    #[error("no title found in metadata or content")]
    MissingTitle,
    #[error("too many conflicts for short-path '{slug}'")]
    TooManyConflicts { slug: String },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Metadata {
    pub title: String,
    pub author: String,
    pub date: NaiveDate,
    pub description: String,
    pub short_path: String,
    pub draft: bool,
    pub toc: bool,
    pub toc_depth: Option<i64>,
    pub code_line_numbers: bool,
    pub categories: Vec<String>,
    /// Pass-through fields in input order.
    pub extra: Mapping,
}

#[derive(Debug, Clone)]
pub(crate) struct NormalizeOptions {
    /// Site owner; every post is attributed to them.
    pub author: String,
    /// Used when a post has no parsable date.
    pub today: NaiveDate,
}

#[derive(Debug)]
pub(crate) struct Normalized {
    pub text: String,
    pub metadata: Metadata,
    pub notes: Vec<Note>,
}

fn normalize_author(raw: &Mapping, author: &str, notes: &mut Vec<Note>) -> String {
    match raw.get("author").and_then(fields::scalar_to_string) {
        Some(original) if original == author => {}
        Some(original) => notes.push(Note::info(format!(
            "author: changed from '{original}' to '{author}'"
        ))),
        None => notes.push(Note::info(format!("author: added '{author}'"))),
    }
    author.to_string()
}

fn normalize_description(raw: &Mapping, notes: &mut Vec<Note>) -> String {
    let description = raw
        .get("description")
        .and_then(fields::scalar_to_string)
        .map(|d| d.trim().to_string())
        .unwrap_or_default();
    if description.is_empty() {
        notes.push(Note::warn(
            "description is empty, please add one for SEO and previews",
        ));
    }
    description
}

fn normalize_short_path(
    raw: &Mapping,
    title: &str,
    registry: &mut SlugRegistry,
    notes: &mut Vec<Note>,
) -> Result<String, NormalizeError> {
    let requested = raw
        .get("short-path")
        .and_then(fields::scalar_to_string)
        .filter(|s| !s.trim().is_empty());

    let slug = match requested {
        Some(original) => {
            let slug = sanitize_slug(&original);
            if slug != original {
                notes.push(Note::info(format!(
                    "short-path: sanitized from '{original}' to '{slug}'"
                )));
            }
            slug
        }
        None => {
            let slug = sanitize_slug(title);
            notes.push(Note::info(format!("short-path: generated from title: '{slug}'")));
            slug
        }
    };

    let claimed = registry.claim(&slug)?;
    if claimed != slug {
        notes.push(Note::warn(format!(
            "short-path '{slug}' is already in use, using '{claimed}'"
        )));
    }
    Ok(claimed)
}

fn boolean_field(raw: &Mapping, key: &str, notes: &mut Vec<Note>) -> bool {
    let value = raw.get(key);
    let result = fields::normalize_boolean_field(value, false);
    match value {
        None => notes.push(Note::info(format!("{key}: added default false"))),
        Some(Value::Bool(_)) => {}
        Some(other) => notes.push(Note::info(format!(
            "{key}: converted {other:?} to boolean {result}"
        ))),
    }
    result
}

fn pass_through_fields(raw: &Mapping, notes: &mut Vec<Note>) -> Mapping {
    let mut extra = Mapping::new();
    for (key, value) in raw {
        let Some(name) = key.as_str() else {
            notes.push(Note::info(format!("dropped non-text key {key:?}")));
            continue;
        };
        if PASS_THROUGH_FIELDS.contains(&name) {
            extra.insert(key.clone(), value.clone());
        } else if !HANDLED_FIELDS.contains(&name) {
            notes.push(Note::info(format!("dropped unrecognized field '{name}'")));
        }
    }
    extra
}

/// Normalizes one document. Fails only when no title can be found or no
/// free short-path is left; every other anomaly is repaired and noted.
pub(crate) fn normalize(
    text: &str,
    registry: &mut SlugRegistry,
    options: &NormalizeOptions,
) -> Result<Normalized, NormalizeError> {
    let extracted = extract(text);
    let mut notes = extracted.notes;
    let raw = extracted.metadata.unwrap_or_default();

    let (body, fixes) = dedupe_heading_markers(&extracted.body);
    for fix in fixes {
        notes.push(Note::info(format!(
            "fixed duplicate heading: '{}' -> '{}'",
            fix.before, fix.after
        )));
    }

    let resolved = resolve_title(&raw, &body)?;
    if resolved.from_body {
        notes.push(Note::info(format!(
            "title: extracted from content: '{}'",
            resolved.title
        )));
    }
    if resolved.body.trim().is_empty() {
        notes.push(Note::warn("document has no content besides its title"));
    }

    let author = normalize_author(&raw, &options.author, &mut notes);
    let date = fields::normalize_date(raw.get("date"), options.today, &mut notes);
    let description = normalize_description(&raw, &mut notes);
    let short_path = normalize_short_path(&raw, &resolved.title, registry, &mut notes)?;
    let categories = fields::normalize_categories(raw.get("categories"), &mut notes);
    let draft = boolean_field(&raw, "draft", &mut notes);
    let toc = boolean_field(&raw, "toc", &mut notes);
    let toc_depth = fields::normalize_toc_depth(raw.get("toc-depth"), toc, &mut notes);
    let code_line_numbers = boolean_field(&raw, "code-line-numbers", &mut notes);
    let extra = pass_through_fields(&raw, &mut notes);

    let metadata = Metadata {
        title: resolved.title,
        author,
        date,
        description,
        short_path,
        draft,
        toc,
        toc_depth,
        code_line_numbers,
        categories,
        extra,
    };
    let text = serialize(&metadata, &resolved.body);

    Ok(Normalized {
        text,
        metadata,
        notes,
    })
}

/// Normalizes the content file of one post in place.
pub(crate) fn process_post(
    post_dir: &Path,
    registry: &mut SlugRegistry,
    options: &NormalizeOptions,
) -> anyhow::Result<Vec<Note>> {
    let path = document::content_file(post_dir)?
        .with_context(|| format!("no markdown file found in {post_dir:?}"))?;
    let text = document::read_text(&path)?;
    let mut normalized = normalize(&text, registry, options)?;
    document::write_text(&path, &normalized.text)?;
    normalized.notes.push(Note::info(format!(
        "'{}' published as {} on {}",
        normalized.metadata.title, normalized.metadata.short_path, normalized.metadata.date
    )));
    Ok(normalized.notes)
}

pub(crate) fn run(context: &Context) -> anyhow::Result<()> {
    let staging_dir = context.require_staging_dir()?;
    let mut registry = SlugRegistry::from_published_dir(&context.posts_dir)?;
    let options = context.normalize_options();
    let posts = document::post_dirs(staging_dir)?;
    batch::run(&posts, |post| process_post(post, &mut registry, &options)).finish("frontmatter")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::has_warning;

    fn options() -> NormalizeOptions {
        NormalizeOptions {
            author: "Site Owner".to_string(),
            today: NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
        }
    }

    fn run(text: &str) -> Normalized {
        normalize(text, &mut SlugRegistry::new(), &options()).unwrap()
    }

    #[test]
    fn explicit_title_is_kept_verbatim() {
        let normalized = run("---\ntitle: Exactly This, Please\n---\n# Heading\nbody\n");
        assert_eq!(normalized.metadata.title, "Exactly This, Please");
        assert!(normalized.text.ends_with("---\n# Heading\nbody\n"));
    }

    #[test]
    fn heading_becomes_title() {
        let normalized = run("# Hello\n\nThe body.");
        assert_eq!(normalized.metadata.title, "Hello");
        assert_eq!(normalized.metadata.short_path, "hello");
        assert!(!normalized.text.contains("# Hello"));
        assert!(normalized.text.ends_with("---\nThe body."));
    }

    #[test]
    fn duplicated_heading_is_fixed_before_title_lookup() {
        let normalized = run("# # Hello World\ntext");
        assert_eq!(normalized.metadata.title, "Hello World");

        let normalized = run("---\ntitle: T\n---\n# # Hello World\ntext");
        assert!(normalized.text.contains("\n# Hello World\ntext"));
    }

    #[test]
    fn leading_byte_order_mark_is_ignored() {
        let normalized = run("\u{feff}---\ntitle: Marked\n---\nbody");
        assert_eq!(normalized.metadata.title, "Marked");
        assert!(normalized.text.starts_with("---\ntitle: Marked\n"));
    }

    #[test]
    fn missing_title_fails() {
        let result = normalize("no heading", &mut SlugRegistry::new(), &options());
        assert!(matches!(result, Err(NormalizeError::MissingTitle)));
    }

    #[test]
    fn author_is_forced() {
        let normalized = run("---\ntitle: T\nauthor: Someone Else\n---\nbody");
        assert_eq!(normalized.metadata.author, "Site Owner");
        assert!(normalized.text.contains("\nauthor: Site Owner\n"));
    }

    #[test]
    fn date_is_canonicalized() {
        let normalized = run("---\ntitle: T\ndate: 08/13/2025\n---\nbody");
        assert!(normalized.text.contains("\ndate: \"2025-08-13\"\n"));

        let normalized = run("---\ntitle: T\ndate: not a date\n---\nbody");
        assert!(normalized.text.contains("\ndate: \"2026-03-04\"\n"));
        assert!(has_warning(&normalized.notes, "could not parse date"));
    }

    #[test]
    fn shared_registry_resolves_conflicts_in_order() {
        let mut registry = SlugRegistry::new();
        let first = normalize("# My Post\nA", &mut registry, &options()).unwrap();
        let second = normalize("---\ntitle: My Post\n---\nB", &mut registry, &options()).unwrap();
        assert_eq!(first.metadata.short_path, "my-post");
        assert_eq!(second.metadata.short_path, "my-post-01");
        assert!(has_warning(&second.notes, "already in use"));
    }

    #[test]
    fn too_many_conflicts() {
        let mut registry = SlugRegistry::new();
        registry.insert("busy");
        for i in 1..=99 {
            registry.insert(&format!("busy-{i:02}"));
        }
        let result = normalize("# Busy\nbody", &mut registry, &options());
        assert!(matches!(result, Err(NormalizeError::TooManyConflicts { .. })));
    }

    #[test]
    fn categories_collapse_to_first() {
        let normalized = run("---\ntitle: T\ncategories: [\"a\",\"b\",\"c\"]\n---\nbody");
        assert_eq!(normalized.metadata.categories, vec!["a"]);
        assert!(normalized.text.contains("\ncategories:\n  - a\n---\n"));
        assert!(has_warning(&normalized.notes, "multiple categories"));
    }

    #[test]
    fn unterminated_block_falls_back_to_heading() {
        let normalized = run("---\nauthor: x\n# Real Title\nbody");
        assert_eq!(normalized.metadata.title, "Real Title");
        assert!(has_warning(&normalized.notes, "not terminated"));
    }

    #[test]
    fn booleans_and_toc_depth() {
        let normalized = run("---\ntitle: T\ndraft: \"yes\"\ntoc: true\ncode-line-numbers: 0\n---\nbody");
        let metadata = &normalized.metadata;
        assert!(metadata.draft);
        assert!(metadata.toc);
        assert_eq!(metadata.toc_depth, Some(3));
        assert!(!metadata.code_line_numbers);
        assert!(normalized
            .text
            .contains("\ndraft: true\ntoc: true\ntoc-depth: 3\ncode-line-numbers: false\n"));
    }

    #[test]
    fn pass_through_and_dropped_fields() {
        let normalized = run("---\ntitle: T\nsubtitle: More\nrandom: x\nimage: img/cover.png\n---\nbody");
        assert!(normalized
            .text
            .contains("\ncategories: []\nsubtitle: More\nimage: img/cover.png\n---\n"));
        assert!(!normalized.text.contains("random"));
    }

    #[test]
    fn full_canonical_output() {
        let normalized = run("---\ntitel: Café Notes\ndescription: Short one\nshort-path: Cafe Notes!\n---\nbody\n");
        assert_eq!(
            normalized.text,
            "---\n\
             title: Café Notes\n\
             author: Site Owner\n\
             date: \"2026-03-04\"\n\
             description: Short one\n\
             short-path: cafe-notes\n\
             draft: false\n\
             toc: false\n\
             code-line-numbers: false\n\
             categories: []\n\
             ---\n\
             body\n"
        );
    }

    #[test]
    fn process_post_continues_after_failures() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path();
        for (name, content) in [
            ("20250101_a", "# Same Title
first"),
            ("20250101_b", "no title at all"),
            ("20250101_c", "## Same Title
second"),
        ] {
            std::fs::create_dir(staging.join(name)).unwrap();
            std::fs::write(staging.join(name).join("index.qmd"), content).unwrap();
        }

        let mut registry = SlugRegistry::new();
        let posts = document::post_dirs(staging).unwrap();
        let summary = batch::run(&posts, |post| process_post(post, &mut registry, &options()));
        assert_eq!(summary.succeeded, vec!["20250101_a", "20250101_c"]);
        assert_eq!(summary.failed.len(), 1);

        let notes = process_post(&staging.join("20250101_a"), &mut SlugRegistry::new(), &options()).unwrap();
        assert!(notes
            .iter()
            .any(|n| n.message == "'Same Title' published as same-title on 2026-03-04"));

        let third = std::fs::read_to_string(staging.join("20250101_c/index.qmd")).unwrap();
        assert!(third.contains("\nshort-path: same-title-01\n"));
        assert_eq!(
            std::fs::read_to_string(staging.join("20250101_b/index.qmd")).unwrap(),
            "no title at all"
        );
    }

    #[test]
    fn normalizing_twice_is_a_no_op() {
        for input in [
            "# Hello\n\nbody text\n",
            "---\ntitle: 'Quoted: title'\ndate: 2025/1/2\ncategories: [x, y]\ntoc: yes\ntoc-depth: 2\nfilters:\n  - a\n---\n\nBody\n",
            "---\ntitle: T\ndescription: \"\"\nlightbox: true\n---\ntext",
        ] {
            let once = run(input).text;
            let twice = run(&once).text;
            assert_eq!(once, twice, "{input:?}");
        }
    }
}
