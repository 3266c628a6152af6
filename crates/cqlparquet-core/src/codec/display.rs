//! Parser for struct values rendered as display text,
//! e.g. `{street: 'Main St', zip: 12345, note: null}`.

use crate::value::Value;

/// Parse a `{field: value, ...}` display string into named values.
///
/// Returns `None` when the text is not brace-delimited, a quote is left
/// open, brackets do not balance, or a pair has no `:` separator.
pub fn parse_udt_display(text: &str) -> Option<Vec<(String, Value)>> {
    let inner = text.trim().strip_prefix('{')?.strip_suffix('}')?;
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }

    let mut fields = Vec::new();
    for pair in split_top_level(inner, b',')? {
        let colon = *top_level_positions(pair, b':')?.first()?;
        let key = unquote(pair[..colon].trim()).unwrap_or_else(|| pair[..colon].trim().to_string());
        fields.push((key, parse_literal(pair[colon + 1..].trim())));
    }
    Some(fields)
}

/// Byte offsets of `sep` outside quotes and brackets.
///
/// A quote character repeated inside a quoted section is an escaped quote.
fn top_level_positions(text: &str, sep: u8) -> Option<Vec<usize>> {
    let bytes = text.as_bytes();
    let mut positions = Vec::new();
    let mut quote: Option<u8> = None;
    let mut depth: i32 = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => {
                if bytes.get(i + 1) == Some(&q) {
                    i += 1;
                } else {
                    quote = None;
                }
            }
            Some(_) => {}
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'{' | b'[' | b'(' => depth += 1,
                b'}' | b']' | b')' => {
                    depth -= 1;
                    if depth < 0 {
                        return None;
                    }
                }
                _ if b == sep && depth == 0 => positions.push(i),
                _ => {}
            },
        }
        i += 1;
    }

    if quote.is_some() || depth != 0 {
        return None;
    }
    Some(positions)
}

fn split_top_level(text: &str, sep: u8) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut start = 0;
    for pos in top_level_positions(text, sep)? {
        parts.push(&text[start..pos]);
        start = pos + 1;
    }
    parts.push(&text[start..]);
    Some(parts)
}

/// Strip matching surrounding quotes and collapse doubled quotes.
fn unquote(text: &str) -> Option<String> {
    let quote = text.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    if text.len() < 2 || !text.ends_with(quote) {
        return None;
    }
    let body = &text[1..text.len() - 1];
    let doubled = format!("{quote}{quote}");
    Some(body.replace(&doubled, &quote.to_string()))
}

fn parse_literal(text: &str) -> Value {
    if let Some(unquoted) = unquote(text) {
        return Value::Text(unquoted);
    }
    if text == "null" {
        return Value::Null;
    }
    if let Ok(i) = text.parse::<i64>() {
        return Value::Int64(i);
    }
    if text.bytes().any(|b| b.is_ascii_digit()) {
        if let Ok(f) = text.parse::<f64>() {
            return Value::Float64(f);
        }
    }
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::Text(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typed_literals() {
        let fields = parse_udt_display("{a: 1, b: 2.5, c: true, d: null, e: plain}").unwrap();
        assert_eq!(
            fields,
            vec![
                ("a".to_string(), Value::Int64(1)),
                ("b".to_string(), Value::Float64(2.5)),
                ("c".to_string(), Value::Bool(true)),
                ("d".to_string(), Value::Null),
                ("e".to_string(), Value::from("plain")),
            ]
        );
    }

    #[test]
    fn quoted_values_keep_separators_and_escapes() {
        let fields = parse_udt_display(r#"{name: 'a, b: c', quote: 'it''s', dq: "x""y", n: 'null'}"#)
            .unwrap();
        assert_eq!(fields[0].1, Value::from("a, b: c"));
        assert_eq!(fields[1].1, Value::from("it's"));
        assert_eq!(fields[2].1, Value::from("x\"y"));
        assert_eq!(fields[3].1, Value::from("null"));
    }

    #[test]
    fn nested_braces_stay_in_one_value() {
        let fields = parse_udt_display("{inner: {x: 1, y: 2}, tags: [a, b], at: 12:30:00}").unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].1, Value::from("{x: 1, y: 2}"));
        assert_eq!(fields[1].1, Value::from("[a, b]"));
        assert_eq!(fields[2].1, Value::from("12:30:00"));
    }

    #[test]
    fn rejects_malformed_text() {
        assert_eq!(parse_udt_display("a: 1"), None);
        assert_eq!(parse_udt_display("{a: 'open}"), None);
        assert_eq!(parse_udt_display("{a 1}"), None);
        assert_eq!(parse_udt_display("{}"), Some(vec![]));
    }
}
