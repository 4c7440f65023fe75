//! Minimal HCL2 encoder for writer output
//!
//! Only what the Terraform writer emits: blocks with labels, attributes,
//! lists, maps and strings. A string that is exactly one `${...}`
//! interpolation is written as a bare expression.

use serde_json::{Map, Value};
use std::fmt::Write;

const INDENT: &str = "  ";

/// Render `kind "label" ... { body }`
pub(super) fn block(kind: &str, labels: &[&str], body: &Map<String, Value>) -> String {
    let mut out = String::new();
    out.push_str(kind);
    for label in labels {
        out.push(' ');
        push_quoted(&mut out, label);
    }
    out.push_str(" {\n");
    write_attributes(&mut out, body, 1);
    out.push_str("}\n");
    out
}

fn write_attributes(out: &mut String, body: &Map<String, Value>, depth: usize) {
    let width = body.keys().map(|key| key_text(key).len()).max().unwrap_or(0);
    for (key, value) in body {
        let key = key_text(key);
        push_indent(out, depth);
        let _ = write!(out, "{key:<width$} = ");
        write_value(out, value, depth);
        out.push('\n');
    }
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => match bare_expression(s) {
            Some(expression) => out.push_str(expression),
            None => push_quoted(out, s),
        },
        Value::Array(items) if items.is_empty() => out.push_str("[]"),
        Value::Array(items) => {
            out.push_str("[\n");
            for item in items {
                push_indent(out, depth + 1);
                write_value(out, item, depth + 1);
                out.push_str(",\n");
            }
            push_indent(out, depth);
            out.push(']');
        }
        Value::Object(map) if map.is_empty() => out.push_str("{}"),
        Value::Object(map) => {
            out.push_str("{\n");
            write_attributes(out, map, depth + 1);
            push_indent(out, depth);
            out.push('}');
        }
    }
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn key_text(key: &str) -> String {
    if is_identifier(key) {
        key.to_string()
    } else {
        let mut quoted = String::new();
        push_quoted(&mut quoted, key);
        quoted
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn push_quoted(out: &mut String, s: &str) {
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            // `%{` starts a template directive
            '%' if chars.peek() == Some(&'{') => out.push_str("%%"),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// The inner expression if `s` is a single `${...}` interpolation
pub(super) fn bare_expression(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("${")?;
    let mut depth = 1usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in inner.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return (i + 1 == inner.len()).then(|| &inner[..i]);
                }
            }
            _ => {}
        }
    }
    None
}
