//! InfluxDB line protocol encoding.
//!
//! `measurement[,tag=value...] field=value[,field=value...] timestamp`

use crate::record::{Point, TIME_FIELD};
use serde_json::Value;
use std::fmt::Write;

/// A batch rendered as a line protocol body.
#[derive(Debug, Default, PartialEq)]
pub struct EncodedBatch {
    /// Newline-separated lines, empty if nothing could be encoded.
    pub body: String,
    /// Points left out because they had no encodable field.
    pub skipped: usize,
}

/// Encode `points` as a newline-separated line protocol body.
///
/// Points without a single encodable field are left out, since InfluxDB
/// rejects lines with an empty field set. The caller decides how to report
/// them through [`EncodedBatch::skipped`].
pub fn encode_points(measurement: &str, points: &[Point]) -> EncodedBatch {
    let mut batch = EncodedBatch::default();
    for point in points {
        match encode_point(measurement, point) {
            Some(line) => {
                batch.body.push_str(&line);
                batch.body.push('\n');
            }
            None => batch.skipped += 1,
        }
    }
    batch
}

/// Encode one point, or `None` when it has no fields.
pub fn encode_point(measurement: &str, point: &Point) -> Option<String> {
    let mut fields = String::new();
    for (key, value) in &point.values {
        if key == TIME_FIELD {
            continue;
        }
        let Some(encoded) = encode_field_value(value) else {
            continue;
        };
        if !fields.is_empty() {
            fields.push(',');
        }
        fields.push_str(&escape_key(key));
        fields.push('=');
        fields.push_str(&encoded);
    }
    if fields.is_empty() {
        return None;
    }

    let mut line = escape_measurement(measurement);
    for (key, value) in &point.tags {
        // Empty tag values are invalid in line protocol.
        if value.is_empty() {
            continue;
        }
        let _ = write!(line, ",{}={}", escape_key(key), escape_key(value));
    }
    line.push(' ');
    line.push_str(&fields);
    if let Some(nanos) = point.time_nanos() {
        let _ = write!(line, " {}", nanos);
    }
    Some(line)
}

fn encode_field_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(format!("{}i", i))
            } else if let Some(u) = n.as_u64() {
                Some(format!("{}u", u))
            } else {
                n.as_f64().map(|f| f.to_string())
            }
        }
        Value::String(s) => Some(quote(s)),
        Value::Array(_) | Value::Object(_) => Some(quote(&value.to_string())),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Tag keys, tag values and field keys: escape commas, equals and spaces.
fn escape_key(s: &str) -> String {
    escape(s, &[',', '=', ' '])
}

fn escape_measurement(s: &str) -> String {
    escape(s, &[',', ' '])
}

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            c if special.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}
