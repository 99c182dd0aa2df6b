use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;

use crate::note::Note;

pub(crate) const DEFAULT_TOC_DEPTH: i64 = 3;

// year-first and year-last layouts; which group holds the year is decided by its width
static NUMERIC_DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(\d{4})-(\d{1,2})-(\d{1,2})",
        r"(\d{4})/(\d{1,2})/(\d{1,2})",
        r"(\d{1,2})/(\d{1,2})/(\d{4})",
        r"(\d{1,2})-(\d{1,2})-(\d{4})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

const TEXT_DATE_FORMATS: &[&str] = &[
    "%B %d, %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%A, %B %d, %Y",
    "%a, %d %b %Y",
    "%Y.%m.%d",
    "%d.%m.%Y",
    "%Y%m%d",
];

/// Renders a scalar YAML value as text. Sequences, mappings and null give `None`.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        _ => None,
    }
}

fn numeric_date(text: &str) -> Option<NaiveDate> {
    for pattern in NUMERIC_DATE_PATTERNS.iter() {
        let Some(caps) = pattern.captures(text) else {
            continue;
        };
        let (year, month, day) = if caps[1].len() == 4 {
            (&caps[1], &caps[2], &caps[3])
        } else {
            (&caps[3], &caps[1], &caps[2])
        };
        let (Ok(y), Ok(m), Ok(d)) = (year.parse(), month.parse::<u32>(), day.parse::<u32>()) else {
            continue;
        };
        // month first unless the leading group cannot be a month
        let date = if caps[1].len() != 4 && m > 12 {
            NaiveDate::from_ymd_opt(y, d, m)
        } else {
            NaiveDate::from_ymd_opt(y, m, d)
        };
        if date.is_some() {
            return date;
        }
    }
    None
}

fn text_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.date_naive());
    }
    TEXT_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
}

/// Parses the numeric layouts first, then common textual layouts.
pub(crate) fn parse_date(text: &str) -> Option<NaiveDate> {
    numeric_date(text).or_else(|| text_date(text))
}

/// Never fails: unparsable or missing dates become `today`.
pub(crate) fn normalize_date(value: Option<&Value>, today: NaiveDate, notes: &mut Vec<Note>) -> NaiveDate {
    let Some(original) = value.and_then(scalar_to_string).filter(|s| !s.trim().is_empty()) else {
        notes.push(Note::info(format!("date: added current date '{today}'")));
        return today;
    };

    match parse_date(&original) {
        Some(date) => {
            if original != date.to_string() {
                notes.push(Note::info(format!(
                    "date: standardized from '{original}' to '{date}'"
                )));
            }
            date
        }
        None => {
            notes.push(Note::warn(format!(
                "could not parse date '{original}', using current date '{today}'"
            )));
            today
        }
    }
}

/// Keeps at most one category. Extra entries are dropped with a warning.
pub(crate) fn normalize_categories(value: Option<&Value>, notes: &mut Vec<Note>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if s.trim().is_empty() => {
            notes.push(Note::info("categories: blank value, using empty list"));
            vec![]
        }
        Some(Value::String(s)) => {
            let category = s.trim().to_string();
            notes.push(Note::info(format!(
                "categories: converted string to list: [{category}]"
            )));
            vec![category]
        }
        Some(Value::Sequence(items)) => {
            let mut categories: Vec<String> = items
                .iter()
                .map(|item| {
                    scalar_to_string(item)
                        .unwrap_or_else(|| serde_yaml::to_string(item).unwrap_or_default())
                        .trim()
                        .to_string()
                })
                .filter(|category| !category.is_empty())
                .collect();
            if categories.len() > 1 {
                let dropped = categories.split_off(1);
                notes.push(Note::warn(format!(
                    "categories: multiple categories found, keeping '{}' and dropping {dropped:?}",
                    categories[0]
                )));
            }
            categories
        }
        Some(_) => {
            notes.push(Note::warn("categories: unsupported value, using empty list"));
            vec![]
        }
        None => {
            notes.push(Note::info("categories: added empty list"));
            vec![]
        }
    }
}

pub(crate) fn normalize_boolean_field(value: Option<&Value>, default: bool) -> bool {
    match value {
        None => default,
        Some(Value::String(s)) => ["true", "yes", "1"]
            .iter()
            .any(|t| s.trim().eq_ignore_ascii_case(t)),
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0),
        Some(Value::Null) => false,
        Some(Value::Sequence(s)) => !s.is_empty(),
        Some(Value::Mapping(m)) => !m.is_empty(),
        Some(Value::Tagged(tagged)) => normalize_boolean_field(Some(&tagged.value), default),
    }
}

/// `toc-depth` only exists alongside an enabled table of contents.
pub(crate) fn normalize_toc_depth(value: Option<&Value>, toc: bool, notes: &mut Vec<Note>) -> Option<i64> {
    if !toc {
        if value.is_some() {
            notes.push(Note::info("toc-depth: removed because toc is false"));
        }
        return None;
    }
    let Some(value) = value else {
        notes.push(Note::info(format!(
            "toc-depth: added default {DEFAULT_TOC_DEPTH} (since toc is true)"
        )));
        return Some(DEFAULT_TOC_DEPTH);
    };

    let depth = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    match depth {
        Some(depth) => {
            if !matches!(value, Value::Number(_)) {
                notes.push(Note::info(format!("toc-depth: converted {value:?} to {depth}")));
            }
            Some(depth)
        }
        None => {
            notes.push(Note::warn(format!(
                "toc-depth: invalid value, set to default {DEFAULT_TOC_DEPTH}"
            )));
            Some(DEFAULT_TOC_DEPTH)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::has_warning;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 2).unwrap()
    }

    fn date_of(text: &str) -> String {
        normalize_date(Some(&Value::from(text)), today(), &mut vec![]).to_string()
    }

    #[test]
    fn numeric_layouts() {
        assert_eq!(date_of("2025-08-13"), "2025-08-13");
        assert_eq!(date_of("2025/8/3"), "2025-08-03");
        assert_eq!(date_of("08/13/2025"), "2025-08-13");
        assert_eq!(date_of("08-13-2025"), "2025-08-13");
        assert_eq!(date_of("13/08/2025"), "2025-08-13");
        assert_eq!(date_of("13-08-2025"), "2025-08-13");
        assert_eq!(date_of("03/04/2025"), "2025-03-04");
        assert_eq!(date_of("2025-08-13T10:20:30Z"), "2025-08-13");
    }

    #[test]
    fn textual_layouts() {
        assert_eq!(date_of("August 13, 2025"), "2025-08-13");
        assert_eq!(date_of("13 Aug 2025"), "2025-08-13");
        assert_eq!(date_of("Wed, 13 Aug 2025 10:00:00 +0000"), "2025-08-13");
        assert_eq!(
            normalize_date(Some(&Value::from(20250813)), today(), &mut vec![]).to_string(),
            "2025-08-13"
        );
    }

    #[test]
    fn invalid_calendar_date_falls_through() {
        let mut notes = vec![];
        let date = normalize_date(Some(&Value::from("2025-13-45")), today(), &mut notes);
        assert_eq!(date, today());
        assert!(has_warning(&notes, "could not parse date"));
    }

    #[test]
    fn unparsable_date_uses_today() {
        let mut notes = vec![];
        assert_eq!(
            normalize_date(Some(&Value::from("not a date")), today(), &mut notes),
            today()
        );
        assert!(has_warning(&notes, "'not a date'"));
        assert_eq!(normalize_date(None, today(), &mut vec![]), today());
    }

    #[test]
    fn categories() {
        let mut notes = vec![];
        let list: Value = serde_yaml::from_str("[a, b, c]").unwrap();
        assert_eq!(normalize_categories(Some(&list), &mut notes), vec!["a"]);
        assert!(has_warning(&notes, "multiple categories"));

        assert_eq!(
            normalize_categories(Some(&Value::from(" tech ")), &mut vec![]),
            vec!["tech"]
        );
        assert!(normalize_categories(None, &mut vec![]).is_empty());
        let empty: Value = serde_yaml::from_str("[]").unwrap();
        assert!(normalize_categories(Some(&empty), &mut vec![]).is_empty());
        assert!(normalize_categories(Some(&Value::from("  ")), &mut vec![]).is_empty());
        let blank_item: Value = serde_yaml::from_str("['', b]").unwrap();
        assert_eq!(normalize_categories(Some(&blank_item), &mut vec![]), vec!["b"]);
    }

    #[test]
    fn booleans() {
        for (value, expected) in [
            (Value::from("Yes"), true),
            (Value::from("TRUE"), true),
            (Value::from("1"), true),
            (Value::from("no"), false),
            (Value::from("maybe"), false),
            (Value::Bool(true), true),
            (Value::from(0), false),
            (Value::from(2), true),
            (Value::Null, false),
        ] {
            assert_eq!(normalize_boolean_field(Some(&value), false), expected, "{value:?}");
        }
        assert!(normalize_boolean_field(None, true));
        assert!(!normalize_boolean_field(None, false));
    }

    #[test]
    fn toc_depth() {
        assert_eq!(normalize_toc_depth(None, true, &mut vec![]), Some(3));
        assert_eq!(normalize_toc_depth(Some(&Value::from(2)), true, &mut vec![]), Some(2));
        assert_eq!(normalize_toc_depth(Some(&Value::from("4")), true, &mut vec![]), Some(4));
        assert_eq!(
            normalize_toc_depth(Some(&Value::from("deep")), true, &mut vec![]),
            Some(3)
        );
        assert_eq!(normalize_toc_depth(Some(&Value::from(2)), false, &mut vec![]), None);
    }
}
