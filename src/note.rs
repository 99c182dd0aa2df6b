use log::{info, warn};
use serde::Serialize;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum NoteLevel {
    Info,
    Warn,
}

/// Recoverable finding attached to a processed document.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct Note {
    pub level: NoteLevel,
    pub message: String,
}

impl Note {
    pub fn info(message: impl Into<String>) -> Self {
        Note {
            level: NoteLevel::Info,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Note {
            level: NoteLevel::Warn,
            message: message.into(),
        }
    }
}

#[cfg(test)]
pub(crate) fn has_warning(notes: &[Note], needle: &str) -> bool {
    notes
        .iter()
        .any(|n| n.level == NoteLevel::Warn && n.message.contains(needle))
}

pub(crate) fn log_notes(subject: &str, notes: &[Note]) {
    for note in notes {
        match note.level {
            NoteLevel::Info => info!("{subject}: {}", note.message),
            NoteLevel::Warn => warn!("{subject}: {}", note.message),
        }
    }
}
