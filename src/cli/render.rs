use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;
use terminal_size::{Width, terminal_size};
use unicode_width::UnicodeWidthStr;

use super::{Cli, OutputFormat, should_color};

const CELL_WIDTH: usize = 60;

/// Sorted keys, four-space indent.
pub(super) fn to_pretty_json(value: &Value) -> anyhow::Result<String> {
    // Objects may keep insertion order if serde_json's `preserve_order` gets unified in.
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut keys = map.keys().collect::<Vec<_>>();
                keys.sort();
                Value::Object(keys.into_iter().map(|k| (k.clone(), sorted(&map[k]))).collect())
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }

    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    sorted(value).serialize(&mut ser)?;
    Ok(String::from_utf8(buf)?)
}

// Templates are multi-line scripts; a table only has room for a hint of them.
fn summarize_for_table(s: &str) -> String {
    let first = s.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    let multiline = s.trim().lines().count() > 1;
    if first.width() <= CELL_WIDTH && !multiline {
        return first.to_string();
    }
    let mut out = String::new();
    for c in first.chars() {
        if (out.as_str().width() + 1) >= CELL_WIDTH {
            break;
        }
        out.push(c);
    }
    format!("{out}…")
}

fn value_to_cell_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => summarize_for_table(s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_cell_text)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(map) if map.len() == 1 => {
            // e.g. pipelineConfig: { functions: [...] }
            map.values().map(value_to_cell_text).collect::<String>()
        }
        other => other.to_string(),
    }
}

/// `(field, summary)` pairs of the resolver object, in key order.
fn resolver_rows(response: &Value) -> Vec<(String, String)> {
    let resolver = response.get("resolver").unwrap_or(response);
    let mut rows = resolver
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_cell_text(v)))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    rows.sort();
    rows
}

pub(super) fn render_resolver(cli: &Cli, response: &Value) -> anyhow::Result<()> {
    match cli.output {
        OutputFormat::Json => {
            println!("{}", to_pretty_json(response)?);
            Ok(())
        }
        OutputFormat::Table => render_table(cli, resolver_rows(response)),
    }
}

fn render_table(cli: &Cli, rows: Vec<(String, String)>) -> anyhow::Result<()> {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::DynamicFullWidth);

    let columns = std::env::var("COLUMNS")
        .ok()
        .and_then(|c| c.parse::<u16>().ok())
        .or_else(|| terminal_size().map(|(Width(w), _)| w));
    if let Some(w) = columns {
        table.set_width(w);
    }

    let color = should_color(cli);
    let header = |text: &str| {
        let cell = Cell::new(text);
        if color {
            cell.add_attribute(Attribute::Bold).fg(Color::Cyan)
        } else {
            cell
        }
    };
    table.set_header(vec![header("field"), header("value")]);
    for (field, value) in rows {
        table.add_row(vec![Cell::new(field), Cell::new(value)]);
    }
    println!("{table}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn pretty_json_sorts_keys_and_indents_four() {
        let s = to_pretty_json(&json!({ "b": 1, "a": { "d": true, "c": [1] } })).unwrap();
        assert_eq!(
            s,
            "{\n    \"a\": {\n        \"c\": [\n            1\n        ],\n        \"d\": true\n    },\n    \"b\": 1\n}"
        );
    }

    #[test]
    fn resolver_rows_flatten_pipeline_config() {
        let rows = resolver_rows(&json!({
            "resolver": {
                "kind": "PIPELINE",
                "pipelineConfig": { "functions": ["fn-a", "fn-b"] },
                "requestMappingTemplate": "{\n  \"version\": \"2018-05-29\"\n}"
            }
        }));
        let pairs = rows
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            pairs,
            vec![
                ("kind", "PIPELINE"),
                ("pipelineConfig", "fn-a, fn-b"),
                ("requestMappingTemplate", "{…"),
            ]
        );
    }

    #[test]
    fn summarize_keeps_short_single_lines() {
        assert_eq!(summarize_for_table("PostsTable"), "PostsTable");
        let long = "x".repeat(80);
        let s = summarize_for_table(&long);
        assert!(s.ends_with('…'));
        assert!(s.width() <= CELL_WIDTH);
    }
}
