use std::{collections::HashSet, path::Path};

use anyhow::Context;
use log::debug;

use super::NormalizeError;

pub(crate) const UNTITLED: &str = "untitled";
const MAX_SUFFIX: u32 = 99;

/// Lowercases, turns spaces into hyphens and keeps only `[a-z0-9-]`.
pub(crate) fn sanitize_slug(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        let c = if c == ' ' { '-' } else { c };
        if !(c.is_ascii_alphanumeric() || c == '-') {
            continue;
        }
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        UNTITLED.to_string()
    } else {
        slug.to_string()
    }
}

/// Slugs already assigned, either published earlier or claimed during this run.
#[derive(Debug, Default)]
pub(crate) struct SlugRegistry {
    taken: HashSet<String>,
}

impl SlugRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the registry from directories named `<prefix>_<slug>`.
    pub fn from_published_dir(published_dir: &Path) -> anyhow::Result<Self> {
        let mut registry = Self::new();
        if !published_dir.is_dir() {
            debug!("{published_dir:?} does not exist, starting with an empty slug registry");
            return Ok(registry);
        }
        for entry in std::fs::read_dir(published_dir)
            .with_context(|| format!("while listing {published_dir:?}"))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some((_, slug)) = name.split_once('_') {
                registry.insert(slug);
            }
        }
        debug!(
            "{} published slugs found in {published_dir:?}",
            registry.taken.len()
        );
        Ok(registry)
    }

    pub fn insert(&mut self, slug: &str) {
        self.taken.insert(slug.to_string());
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.taken.contains(slug)
    }

    /// Registers `slug`, or the first free `slug-NN` when it is taken.
    pub fn claim(&mut self, slug: &str) -> Result<String, NormalizeError> {
        if !self.contains(slug) {
            self.insert(slug);
            return Ok(slug.to_string());
        }
        for counter in 1..=MAX_SUFFIX {
            let candidate = format!("{slug}-{counter:02}");
            if !self.contains(&candidate) {
                self.insert(&candidate);
                return Ok(candidate);
            }
        }
        Err(NormalizeError::TooManyConflicts {
            slug: slug.to_string(),
        })
    }
}
