use serde_yaml::{Mapping, Value};

use crate::note::Note;

// value characters that make a plain YAML scalar ambiguous
const SIGNIFICANT_CHARS: &[char] = &['-', ':', '[', ']', '{', '}', '&', '*', '#', '|', '>', '%'];

#[derive(Debug)]
pub(crate) struct Extracted {
    /// `None` when the document has no (terminated) metadata block.
    pub metadata: Option<Mapping>,
    pub body: String,
    pub notes: Vec<Note>,
}

pub(crate) const BOM: char = '\u{feff}';

fn is_delimiter(line: &str) -> bool {
    line.trim() == "---"
}

/// Splits a document into its `---` delimited metadata block and the body.
///
/// Malformed YAML never fails here: the block is repaired if possible and
/// otherwise replaced by an empty mapping, with a warning either way.
pub(crate) fn extract(text: &str) -> Extracted {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let lines: Vec<&str> = text.split('\n').collect();
    if !lines.first().map_or(false, |l| is_delimiter(l)) {
        return Extracted {
            metadata: None,
            body: text.to_string(),
            notes: vec![],
        };
    }

    let Some(end) = lines[1..].iter().position(|l| is_delimiter(l)) else {
        return Extracted {
            metadata: None,
            body: text.to_string(),
            notes: vec![Note::warn(
                "metadata block is not terminated, treating the document as having no metadata",
            )],
        };
    };
    let end = end + 1;

    let block = lines[1..end].join("\n");
    let body = lines[end + 1..].join("\n");
    let mut notes = vec![];
    let metadata = parse_block(&block, &mut notes);

    Extracted {
        metadata: Some(metadata),
        body,
        notes,
    }
}

/// Splits `text` into the raw metadata block (delimiters included) and the rest.
/// The block is empty when the document has no terminated metadata block.
pub(crate) fn split_block(text: &str) -> (&str, &str) {
    let mut lines = text.split_inclusive('\n');
    if !lines.next().map_or(false, is_delimiter) {
        return ("", text);
    }
    let mut offset = text.find('\n').map_or(text.len(), |i| i + 1);
    for line in lines {
        offset += line.len();
        if is_delimiter(line) {
            return text.split_at(offset);
        }
    }
    ("", text)
}

fn parse_block(block: &str, notes: &mut Vec<Note>) -> Mapping {
    match serde_yaml::from_str::<Value>(block) {
        Ok(value) => into_mapping(value, notes),
        Err(e) => {
            notes.push(Note::warn(format!("YAML parsing error: {e}")));
            match serde_yaml::from_str::<Value>(&repair_block(block)) {
                Ok(value) => {
                    notes.push(Note::info("repaired metadata by quoting ambiguous values"));
                    into_mapping(value, notes)
                }
                Err(_) => {
                    notes.push(Note::warn(
                        "could not repair metadata syntax, using empty metadata",
                    ));
                    Mapping::new()
                }
            }
        }
    }
}

fn into_mapping(value: Value, notes: &mut Vec<Note>) -> Mapping {
    match value {
        Value::Mapping(m) => m,
        Value::Null => Mapping::new(),
        _ => {
            notes.push(Note::warn(
                "metadata block is not a key-value mapping, using empty metadata",
            ));
            Mapping::new()
        }
    }
}

fn needs_quotes(value: &str) -> bool {
    let already_structured = value.starts_with('"')
        || value.starts_with('\'')
        || value.starts_with('[')
        || value.starts_with('{')
        || value.eq_ignore_ascii_case("true")
        || value.eq_ignore_ascii_case("false")
        || value.chars().all(|c| c.is_ascii_digit());
    !already_structured && value.contains(SIGNIFICANT_CHARS)
}

/// Best-effort line patch: double-quotes `key: value` values that contain
/// characters YAML would otherwise interpret. Lossy by nature.
pub(crate) fn repair_block(block: &str) -> String {
    block
        .split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                return line.to_string();
            }
            let Some((key, value)) = line.split_once(':') else {
                return line.to_string();
            };
            let indent = &key[..key.len() - key.trim_start().len()];
            let key = key.trim();
            let value = value.trim();
            if value.is_empty() {
                format!("{indent}{key}:")
            } else if needs_quotes(value) {
                let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
                format!("{indent}{key}: \"{escaped}\"")
            } else {
                format!("{indent}{key}: {value}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
