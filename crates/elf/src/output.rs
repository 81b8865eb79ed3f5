//! Result rendering for `--format text|json|csv`.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use crate::cli::Format;

/// Render any serializable result in the requested format.
pub fn render<T: Serialize>(data: &T, format: Format) -> Result<String> {
    let value = serde_json::to_value(data)?;
    Ok(match format {
        Format::Json => serde_json::to_string_pretty(&value)?,
        Format::Csv => csv(&value),
        Format::Text => text(&value),
    })
}

fn text(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| match value {
                Value::Object(_) | Value::Array(_) => format!("{}:\n{}", key, text(value)),
                _ => format!("{}: {}", key, scalar(value)),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| format!("\n--- Item {} ---\n{}", i + 1, text(item)))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => scalar(value),
    }
}

/// Lists of records become one row per item with a header taken from the
/// first item. Anything else falls back to JSON.
fn csv(value: &Value) -> String {
    let Value::Array(items) = value else {
        return value.to_string();
    };
    let Some(first) = items.first() else {
        return String::new();
    };

    let mut out = String::new();
    match first {
        Value::Object(head) => {
            let columns: Vec<&String> = head.keys().collect();
            out.push_str(&row(columns.iter().map(|c| c.as_str())));
            for item in items {
                let cells: Vec<String> = columns
                    .iter()
                    .map(|c| item.get(c.as_str()).map(scalar).unwrap_or_default())
                    .collect();
                out.push_str(&row(cells.iter().map(String::as_str)));
            }
        }
        _ => {
            for item in items {
                out.push_str(&row(std::iter::once(scalar(item).as_str())));
            }
        }
    }
    out
}

fn row<'a>(cells: impl Iterator<Item = &'a str>) -> String {
    let mut line = cells.map(quote).collect::<Vec<_>>().join(",");
    line.push_str("\r\n");
    line
}

fn quote(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::Object(_) | Value::Array(_) => value.to_string(),
    }
}
