//! Value-typing for XCT reply text — `spec.md` §4.7 "reply text is run through a
//! value-typer".

/// A typed value recovered from an XCT reply string.
#[derive(Debug, Clone, PartialEq)]
pub enum XctValue {
    List(Vec<XctValue>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

fn is_float(s: &str) -> bool {
    s.contains('.') && s.parse::<f64>().is_ok()
}

/// Recursively retypes a raw value string: comma-separated becomes a list (each item
/// retyped in turn), `0x`-prefixed becomes a hex integer, a string containing `.` that
/// parses as a float becomes a float, an (optionally `-`-prefixed) all-digit string
/// becomes an integer, `true`/`false` (case-insensitive) becomes a bool, anything else
/// is passed through as a string.
pub fn retype_value(value: &str) -> XctValue {
    if value.contains(',') {
        let mut inner = value;
        if let Some(s) = inner.strip_prefix('[') {
            inner = s;
        }
        if let Some(s) = inner.strip_suffix(']') {
            inner = s;
        }
        return XctValue::List(inner.split(',').map(|item| retype_value(item.trim())).collect());
    }
    if let Some(hex) = value.strip_prefix("0x") {
        if let Ok(n) = i64::from_str_radix(hex, 16) {
            return XctValue::Int(n);
        }
    }
    if is_float(value) {
        if let Ok(f) = value.parse::<f64>() {
            return XctValue::Float(f);
        }
    }
    let digits = value.strip_prefix('-').unwrap_or(value);
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = value.parse::<i64>() {
            return XctValue::Int(n);
        }
    }
    match value.to_ascii_lowercase().as_str() {
        "true" => XctValue::Bool(true),
        "false" => XctValue::Bool(false),
        _ => XctValue::Str(value.to_string()),
    }
}
