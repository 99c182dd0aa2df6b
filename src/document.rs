use std::path::{Path, PathBuf};

use anyhow::Context;
use log::{debug, warn};

use crate::frontmatter::BOM;

/// Reads a text file as UTF-8, falling back to Latin-1 when the bytes are not valid UTF-8.
pub(crate) fn read_text(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("while reading {path:?}"))?;
    let text = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            warn!("{path:?} is not valid UTF-8, decoding as Latin-1");
            decode_latin1(e.as_bytes())
        }
    };
    match text.strip_prefix(BOM) {
        Some(rest) => {
            debug!("{path:?}: dropped byte order mark");
            Ok(rest.to_string())
        }
        None => Ok(text),
    }
}

// every Latin-1 byte is the code point of the same value
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

pub(crate) fn write_text(path: &Path, content: &str) -> anyhow::Result<()> {
    std::fs::write(path, content).with_context(|| format!("while writing {path:?}"))
}

fn is_markdown(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .map_or(false, |ext| ext == "md" || ext == "qmd")
}

pub(crate) fn markdown_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = vec![];
    for entry in std::fs::read_dir(dir).with_context(|| format!("while listing {dir:?}"))? {
        let path = entry?.path();
        if is_markdown(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Locates the content file of a post: `index.qmd`, then `index.md`, then any markdown file.
pub(crate) fn content_file(post_dir: &Path) -> anyhow::Result<Option<PathBuf>> {
    for name in ["index.qmd", "index.md"] {
        let candidate = post_dir.join(name);
        if candidate.is_file() {
            return Ok(Some(candidate));
        }
    }
    let found = markdown_files(post_dir)?.into_iter().next();
    if let Some(ref path) = found {
        warn!(
            "{:?}: using {:?} instead of index.qmd",
            post_dir.file_name().unwrap_or_default(),
            path.file_name().unwrap_or_default()
        );
    }
    Ok(found)
}

/// Subdirectories of `staging_dir` that hold at least one markdown file, sorted by name.
pub(crate) fn post_dirs(staging_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut dirs = vec![];
    for entry in
        std::fs::read_dir(staging_dir).with_context(|| format!("while listing {staging_dir:?}"))?
    {
        let path = entry?.path();
        if path.is_dir() && !markdown_files(&path)?.is_empty() {
            dirs.push(path);
        }
    }
    dirs.sort();
    debug!("found {} post directories in {staging_dir:?}", dirs.len());
    Ok(dirs)
}

/// Opening or closing line of a fenced code block.
pub(crate) fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

pub(crate) fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}
