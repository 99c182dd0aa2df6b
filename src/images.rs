//! Image references and files of a post: sizing syntax, `img/` paths, stray files.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context as _};
use log::debug;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;

use crate::{batch, context::Context, document, frontmatter::split_block, note::Note};

pub(crate) const IMG_DIR: &str = "img";
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg"];

// `{"width":123}` or `{"width": 123, "height": 45}`
pub(crate) static BEAR_SIZING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{("width":\s*\d+(?:\s*,\s*"height":\s*\d+)?)\}"#).unwrap()
});
pub(crate) static IMAGE_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)(\{[^}]*\})?").unwrap());
pub(crate) static PDF_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]*)\]\(([^)]+\.pdf)\)").unwrap());

#[derive(Deserialize, Debug)]
struct Sizing {
    width: u64,
    height: Option<u64>,
}

pub(crate) fn is_remote(path: &str) -> bool {
    ["http://", "https://", "data:"]
        .iter()
        .any(|scheme| path.starts_with(scheme))
}

fn is_image(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| extensions.contains(&ext.to_lowercase().as_str()))
}

/// Decodes `%XX` escapes as found in exported links. Invalid escapes are kept verbatim.
pub(crate) fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let high = (bytes[i + 1] as char).to_digit(16);
            let low = (bytes[i + 2] as char).to_digit(16);
            if let (Some(high), Some(low)) = (high, low) {
                out.push((high * 16 + low) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Targets of every `![alt](path)` reference, in document order.
pub(crate) fn image_references(content: &str) -> Vec<String> {
    IMAGE_REFERENCE
        .captures_iter(content)
        .map(|caps| caps[2].to_string())
        .collect()
}

/// `{"width":300}` becomes `{width=300}`.
pub(crate) fn convert_sizing(content: &str) -> (String, Vec<Note>) {
    let mut notes = vec![];
    let converted = BEAR_SIZING
        .replace_all(content, |caps: &Captures| {
            match serde_json::from_str::<Sizing>(&format!("{{{}}}", &caps[1])) {
                Ok(sizing) => {
                    let attrs = match sizing.height {
                        Some(height) => format!("{{width={}, height={height}}}", sizing.width),
                        None => format!("{{width={}}}", sizing.width),
                    };
                    notes.push(Note::info(format!("converted sizing: {} -> {attrs}", &caps[0])));
                    attrs
                }
                Err(e) => {
                    notes.push(Note::warn(format!(
                        "could not parse sizing syntax '{}': {e}",
                        &caps[0]
                    )));
                    caps[0].to_string()
                }
            }
        })
        .into_owned();
    (converted, notes)
}

/// Points every local image reference at `img/<file name>`.
pub(crate) fn update_image_paths(content: &str) -> (String, Vec<Note>) {
    let mut notes = vec![];
    let updated = IMAGE_REFERENCE
        .replace_all(content, |caps: &Captures| {
            let original = &caps[2];
            if is_remote(original) {
                return caps[0].to_string();
            }
            let file_name = Path::new(original)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| original.to_string());
            let new_path = format!("{IMG_DIR}/{file_name}");
            if original != new_path {
                notes.push(Note::info(format!("updated path: {original} -> {new_path}")));
            }
            let sizing = caps.get(3).map_or("", |m| m.as_str());
            format!("![{}]({new_path}){sizing}", &caps[1])
        })
        .into_owned();
    (updated, notes)
}

pub(crate) fn pdf_links(content: &str) -> Vec<String> {
    PDF_LINK
        .captures_iter(content)
        .map(|caps| caps[2].to_string())
        .collect()
}

fn free_destination(img_dir: &Path, file_name: &Path) -> PathBuf {
    let destination = img_dir.join(file_name);
    if !destination.exists() {
        return destination;
    }
    let stem = file_name
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = file_name
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let mut counter = 1;
    loop {
        let candidate = img_dir.join(format!("{stem}_{counter:02}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

fn move_into(img_dir: &Path, source: &Path) -> anyhow::Result<PathBuf> {
    let file_name = source
        .file_name()
        .with_context(|| format!("{source:?} has no file name"))?;
    let destination = free_destination(img_dir, Path::new(file_name));
    fs_extra::file::move_file(source, &destination, &fs_extra::file::CopyOptions::new())
        .with_context(|| format!("while moving {source:?} to {destination:?}"))?;
    Ok(destination)
}

fn img_relative(destination: &Path) -> String {
    format!(
        "{IMG_DIR}/{}",
        destination.file_name().unwrap_or_default().to_string_lossy()
    )
}

/// Gathers loose images and images in other subdirectories into `img/`.
pub(crate) fn organize_images(post_dir: &Path) -> anyhow::Result<Vec<Note>> {
    let mut notes = vec![];
    let img_dir = post_dir.join(IMG_DIR);
    if !img_dir.exists() {
        debug!("{post_dir:?} has no {IMG_DIR} directory");
        return Ok(notes);
    }
    if !img_dir.is_dir() {
        notes.push(Note::warn(format!("{IMG_DIR} exists but is not a directory")));
        return Ok(notes);
    }

    let mut extensions = IMAGE_EXTENSIONS.to_vec();
    extensions.push("pdf");

    let mut entries: Vec<PathBuf> = std::fs::read_dir(post_dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    entries.sort();

    for path in entries.iter().filter(|p| p.is_file() && is_image(p, &extensions)) {
        let destination = move_into(&img_dir, path)?;
        notes.push(Note::info(format!(
            "moved loose image: {} -> {}",
            document::dir_name(path),
            img_relative(&destination)
        )));
    }

    for dir in entries.iter().filter(|p| p.is_dir() && **p != img_dir) {
        let content = fs_extra::dir::get_dir_content(dir)
            .with_context(|| format!("while listing {dir:?}"))?;
        let mut images: Vec<PathBuf> = content
            .files
            .iter()
            .map(PathBuf::from)
            .filter(|f| is_image(f, &extensions))
            .collect();
        if images.is_empty() {
            continue;
        }
        images.sort();
        let dir_label = document::dir_name(dir);
        notes.push(Note::warn(format!(
            "found images in unexpected directory {dir_label}/"
        )));
        for image in images {
            let destination = move_into(&img_dir, &image)?;
            notes.push(Note::info(format!(
                "moved image: {dir_label}/{} -> {}",
                document::dir_name(&image),
                img_relative(&destination)
            )));
        }
        match std::fs::remove_dir(dir) {
            Ok(()) => notes.push(Note::info(format!("removed empty directory: {dir_label}"))),
            Err(e) => notes.push(Note::warn(format!(
                "could not remove directory {dir_label}: {e}"
            ))),
        }
    }

    Ok(notes)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ReferenceCheck {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Checks that local references resolve to files and that `img/` holds no unreferenced images.
pub(crate) fn check_references(content: &str, post_dir: &Path) -> ReferenceCheck {
    let mut check = ReferenceCheck::default();
    let references = image_references(content);

    for reference in references.iter().filter(|r| !is_remote(r)) {
        let path = post_dir.join(percent_decode(reference));
        if !path.exists() {
            check.errors.push(format!("missing image: {reference}"));
        } else if !path.is_file() {
            check
                .errors
                .push(format!("image path exists but is not a file: {reference}"));
        } else if path.metadata().map_or(false, |m| m.len() == 0) {
            check.warnings.push(format!("empty image file: {reference}"));
        }
    }

    let img_dir = post_dir.join(IMG_DIR);
    if let Ok(entries) = std::fs::read_dir(&img_dir) {
        let referenced: BTreeSet<String> = references
            .iter()
            .filter_map(|r| {
                Path::new(&percent_decode(r))
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
            })
            .collect();
        let orphaned: BTreeSet<String> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image(p, IMAGE_EXTENSIONS))
            .map(|p| document::dir_name(&p))
            .filter(|name| !referenced.contains(name))
            .collect();
        if !orphaned.is_empty() {
            check.warnings.push(format!(
                "orphaned images (not referenced): {}",
                orphaned.into_iter().collect::<Vec<_>>().join(", ")
            ));
        }
    }

    check
}

/// Runs the whole image pass on one post. A post with broken references is not rewritten.
pub(crate) fn process_post(post_dir: &Path) -> anyhow::Result<Vec<Note>> {
    let path = document::content_file(post_dir)?
        .with_context(|| format!("no markdown file found in {post_dir:?}"))?;
    let original = document::read_text(&path)?;
    let (block, body) = split_block(&original);

    let mut notes = organize_images(post_dir)?;
    let (body, sizing_notes) = convert_sizing(body);
    notes.extend(sizing_notes);
    let (body, path_notes) = update_image_paths(&body);
    notes.extend(path_notes);

    let pdfs = pdf_links(&body);
    if !pdfs.is_empty() {
        notes.push(Note::warn(format!(
            "found {} PDF reference(s), manual review recommended",
            pdfs.len()
        )));
    }

    let check = check_references(&body, post_dir);
    notes.extend(check.warnings.into_iter().map(Note::warn));
    if !check.errors.is_empty() {
        bail!("image validation failed: {}", check.errors.join("; "));
    }

    let updated = format!("{block}{body}");
    if updated != original {
        document::write_text(&path, &updated)?;
    } else {
        notes.push(Note::info("no content changes needed"));
    }
    Ok(notes)
}

pub(crate) fn run(context: &Context) -> anyhow::Result<()> {
    let staging_dir = context.require_staging_dir()?;
    let posts = document::post_dirs(staging_dir)?;
    batch::run(&posts, process_post).finish("images")
}
