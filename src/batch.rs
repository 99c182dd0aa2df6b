use std::path::{Path, PathBuf};

use anyhow::bail;
use log::{error, info};

use crate::{
    document::dir_name,
    note::{log_notes, Note},
};

#[derive(Debug, Default)]
pub(crate) struct Summary {
    pub succeeded: Vec<String>,
    /// name and error message of every failed item
    pub failed: Vec<(String, String)>,
}

impl Summary {
    /// Logs the totals and turns any failure into an error for the exit status.
    pub fn finish(self, pass: &str) -> anyhow::Result<()> {
        info!("{pass}: {} succeeded", self.succeeded.len());
        if self.failed.is_empty() {
            return Ok(());
        }
        for (name, message) in &self.failed {
            error!("{pass}: {name} failed: {message}");
        }
        bail!("{pass}: {} of {} failed", self.failed.len(), self.failed.len() + self.succeeded.len());
    }
}

/// Applies `process` to every item in order. A failing item is recorded and the run continues.
pub(crate) fn run<F>(items: &[PathBuf], mut process: F) -> Summary
where
    F: FnMut(&Path) -> anyhow::Result<Vec<Note>>,
{
    let mut summary = Summary::default();
    for item in items {
        let name = dir_name(item);
        info!("processing {name}");
        match process(item) {
            Ok(notes) => {
                log_notes(&name, &notes);
                summary.succeeded.push(name);
            }
            Err(e) => {
                error!("{name}: {e:#}");
                summary.failed.push((name, format!("{e:#}")));
            }
        }
    }
    summary
}
