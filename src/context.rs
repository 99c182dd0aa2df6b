use std::path::{Path, PathBuf};

use anyhow::bail;
use chrono::NaiveDate;
use clap::ArgMatches;

use crate::frontmatter::NormalizeOptions;

pub(crate) const DEFAULT_AUTHOR: &str = "Nikhil Agarwal";

/// Settings shared by every pass, resolved once from the command line and environment.
#[derive(Debug)]
pub(crate) struct Context {
    pub ingest_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub posts_dir: PathBuf,

    pub author: String,
    pub today: NaiveDate,
}

impl Context {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let path = |id: &str| -> PathBuf { matches.get_one::<PathBuf>(id).unwrap().to_owned() };
        let author = matches
            .get_one::<String>("author")
            .cloned()
            .or_else(|| std::env::var("BLOG_AUTHOR").ok())
            .unwrap_or_else(|| DEFAULT_AUTHOR.to_string());

        Self {
            ingest_dir: path("ingest_dir"),
            staging_dir: path("staging_dir"),
            posts_dir: path("posts_dir"),
            author,
            today: chrono::Local::now().date_naive(),
        }
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            author: self.author.clone(),
            today: self.today,
        }
    }

    pub fn require_staging_dir(&self) -> anyhow::Result<&Path> {
        if !self.staging_dir.is_dir() {
            bail!(
                "staging directory {:?} not found, run `import` first",
                self.staging_dir
            );
        }
        Ok(&self.staging_dir)
    }
}
