//! Turns an export directory of `<Name>.md` files (with optional `<Name>/` image
//! folders) into dated post directories in the staging area.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};
use chrono::NaiveDate;
use fs_extra::dir::CopyOptions;
use log::info;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;

use crate::{
    batch,
    context::Context,
    document,
    frontmatter::sanitize_slug,
    images::IMG_DIR,
    note::Note,
};

const MAX_SUFFIX: u32 = 99;
pub(crate) const CONTENT_FILE: &str = "index.qmd";

static IMAGE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[(.*?)\]\(([^)]+)\)").unwrap());

#[derive(Error, Debug)]
pub(crate) enum ImportError {
    #[error("too many naming conflicts for {path:?}")]
    TooManyConflicts { path: PathBuf },
}

fn is_readme(path: &Path) -> bool {
    path.file_name()
        .map_or(false, |n| n.to_string_lossy().eq_ignore_ascii_case("readme.md"))
}

/// Markdown files of the export, README excluded.
pub(crate) fn source_files(ingest_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = vec![];
    for entry in
        std::fs::read_dir(ingest_dir).with_context(|| format!("while listing {ingest_dir:?}"))?
    {
        let path = entry?.path();
        if !path.is_file() || path.extension().map_or(true, |ext| ext != "md") {
            continue;
        }
        if is_readme(&path) {
            info!("ignoring {:?}", path.file_name().unwrap_or_default());
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

/// `<YYYYMMDD>_<slug of the file stem>`
pub(crate) fn post_dir_name(stem: &str, today: NaiveDate) -> String {
    format!("{}_{}", today.format("%Y%m%d"), sanitize_slug(stem))
}

/// Returns `target`, or the first `target-NN` that does not exist yet.
pub(crate) fn free_post_dir(target: &Path) -> Result<PathBuf, ImportError> {
    if !target.exists() {
        return Ok(target.to_path_buf());
    }
    let name = document::dir_name(target);
    for counter in 1..=MAX_SUFFIX {
        let candidate = target.with_file_name(format!("{name}-{counter:02}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(ImportError::TooManyConflicts {
        path: target.to_path_buf(),
    })
}

/// Rewrites `![..](<image_dir>/file)` references to `![..](img/file)`.
pub(crate) fn update_image_references(content: &str, image_dir: &str) -> String {
    let prefixes = [
        format!("{image_dir}/"),
        format!("{}/", image_dir.replace(' ', "%20")),
    ];
    IMAGE_LINK
        .replace_all(content, |caps: &Captures| {
            let path = &caps[2];
            match prefixes.iter().find_map(|p| path.strip_prefix(p.as_str())) {
                Some(file) => format!("![{}]({IMG_DIR}/{file})", &caps[1]),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Creates the post directory for one exported markdown file. Returns the new directory.
pub(crate) fn import_file(source: &Path, staging_dir: &Path, today: NaiveDate) -> anyhow::Result<PathBuf> {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .with_context(|| format!("{source:?} has no file name"))?;

    let post_dir = free_post_dir(&staging_dir.join(post_dir_name(&stem, today)))?;
    fs_extra::dir::create_all(&post_dir, false)
        .with_context(|| format!("while creating {post_dir:?}"))?;
    info!("created directory {}", document::dir_name(&post_dir));

    let mut content = document::read_text(source)?;

    let image_dir = source.with_file_name(&stem);
    if image_dir.is_dir() {
        let mut options = CopyOptions::new();
        options.copy_inside = true;
        options.content_only = true;
        options.overwrite = true;
        fs_extra::dir::copy(&image_dir, post_dir.join(IMG_DIR), &options)
            .with_context(|| format!("while copying images from {image_dir:?}"))?;
        content = update_image_references(&content, &stem);
        info!("copied images: {stem}/ -> {IMG_DIR}/");
    }

    document::write_text(&post_dir.join(CONTENT_FILE), &content)?;
    Ok(post_dir)
}

pub(crate) fn run(context: &Context) -> anyhow::Result<()> {
    if !context.ingest_dir.is_dir() {
        bail!("ingest directory {:?} not found", context.ingest_dir);
    }
    let sources = source_files(&context.ingest_dir)?;
    if sources.is_empty() {
        info!("no markdown files found in {:?}, nothing to import", context.ingest_dir);
        return Ok(());
    }
    fs_extra::dir::create_all(&context.staging_dir, false)?;

    batch::run(&sources, |source| {
        let post_dir = import_file(source, &context.staging_dir, context.today)?;
        Ok(vec![Note::info(format!(
            "-> {}/{CONTENT_FILE}",
            document::dir_name(&post_dir)
        ))])
    })
    .finish("import")
}
