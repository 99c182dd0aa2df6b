use serde_yaml::Value;

use super::Metadata;

/// Emits `s` as a plain scalar when YAML reads it back unchanged, double-quoted otherwise.
pub(crate) fn yaml_string(s: &str) -> String {
    let plain_is_safe = !s.is_empty()
        && !s.contains(['\n', '\r', '\t'])
        && matches!(serde_yaml::from_str::<Value>(s), Ok(Value::String(ref v)) if v == s);
    if plain_is_safe {
        s.to_string()
    } else {
        quoted(s)
    }
}

fn quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn push_value(lines: &mut Vec<String>, key: &str, value: &Value) {
    match value {
        Value::String(s) => lines.push(format!("{key}: {}", yaml_string(s))),
        Value::Bool(b) => lines.push(format!("{key}: {b}")),
        Value::Number(n) => lines.push(format!("{key}: {n}")),
        Value::Null => lines.push(format!("{key}: null")),
        nested => {
            lines.push(format!("{key}:"));
            let rendered = serde_yaml::to_string(nested).unwrap_or_default();
            lines.extend(rendered.lines().map(|l| format!("  {l}")));
        }
    }
}

/// Writes the canonical metadata block followed by `body`.
pub(crate) fn serialize(metadata: &Metadata, body: &str) -> String {
    let mut lines = vec!["---".to_string()];

    lines.push(format!("title: {}", yaml_string(&metadata.title)));
    lines.push(format!("author: {}", yaml_string(&metadata.author)));
    lines.push(format!("date: \"{}\"", metadata.date.format("%Y-%m-%d")));
    lines.push(format!("description: {}", yaml_string(&metadata.description)));
    lines.push(format!("short-path: {}", yaml_string(&metadata.short_path)));
    lines.push(format!("draft: {}", metadata.draft));
    lines.push(format!("toc: {}", metadata.toc));
    if let Some(depth) = metadata.toc_depth {
        lines.push(format!("toc-depth: {depth}"));
    }
    lines.push(format!("code-line-numbers: {}", metadata.code_line_numbers));
    if metadata.categories.is_empty() {
        lines.push("categories: []".to_string());
    } else {
        lines.push("categories:".to_string());
        for category in &metadata.categories {
            lines.push(format!("  - {}", yaml_string(category)));
        }
    }

    for (key, value) in &metadata.extra {
        if let Some(key) = key.as_str() {
            push_value(&mut lines, key, value);
        }
    }

    lines.push("---".to_string());
    lines.push(String::new());

    lines.join("\n") + body
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_yaml::Mapping;

    fn metadata() -> Metadata {
        Metadata {
            title: "Hello World".to_string(),
            author: "Site Owner".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 8, 13).unwrap(),
            description: String::new(),
            short_path: "hello-world".to_string(),
            draft: false,
            toc: true,
            toc_depth: Some(2),
            code_line_numbers: false,
            categories: vec!["rust".to_string()],
            extra: Mapping::new(),
        }
    }

    #[test]
    fn canonical_layout() {
        let text = serialize(&metadata(), "Body\n");
        assert_eq!(
            text,
            "---\n\
             title: Hello World\n\
             author: Site Owner\n\
             date: \"2025-08-13\"\n\
             description: \"\"\n\
             short-path: hello-world\n\
             draft: false\n\
             toc: true\n\
             toc-depth: 2\n\
             code-line-numbers: false\n\
             categories:\n  - rust\n\
             ---\n\
             Body\n"
        );
    }

    #[test]
    fn empty_categories_and_extras() {
        let mut metadata = metadata();
        metadata.categories.clear();
        metadata.toc = false;
        metadata.toc_depth = None;
        metadata.extra = serde_yaml::from_str("subtitle: 'A: B'\nlightbox: true\nfilters:\n  - a\n  - b\n").unwrap();

        let text = serialize(&metadata, "");
        assert!(text.contains("\ncategories: []\n"));
        assert!(!text.contains("toc-depth"));
        assert!(text.contains("\nsubtitle: \"A: B\"\nlightbox: true\nfilters:\n  - a\n  - b\n---\n"));
    }

    #[test]
    fn quotes_ambiguous_strings() {
        assert_eq!(yaml_string("plain words"), "plain words");
        assert_eq!(yaml_string("true"), "\"true\"");
        assert_eq!(yaml_string("2024"), "\"2024\"");
        assert_eq!(yaml_string("Note: thing"), "\"Note: thing\"");
        assert_eq!(yaml_string("say \"hi\" # now"), "\"say \\\"hi\\\" # now\"");
        assert_eq!(yaml_string("- item"), "\"- item\"");
        assert_eq!(yaml_string(""), "\"\"");
    }

    #[test]
    fn output_parses_back() {
        let mut metadata = metadata();
        metadata.title = "Quotes \"inside\": and more".to_string();
        let text = serialize(&metadata, "");
        let block = text.trim_start_matches("---\n").trim_end_matches("---\n");
        let parsed: Mapping = serde_yaml::from_str(block).unwrap();
        assert_eq!(
            parsed.get("title"),
            Some(&Value::from("Quotes \"inside\": and more"))
        );
        assert_eq!(parsed.get("date"), Some(&Value::from("2025-08-13")));
    }
}
