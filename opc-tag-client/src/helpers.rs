use crate::provider::OpcValue;
use chrono::{DateTime, Utc};

/// Convert a provider value to a displayable string.
///
/// # Examples
///
/// ```
/// use opc_tag_client::{OpcValue, value_to_string};
///
/// assert_eq!(value_to_string(&OpcValue::Int(42)), "42");
/// assert_eq!(value_to_string(&OpcValue::Float(1.5)), "1.50");
/// assert_eq!(value_to_string(&OpcValue::String("ok".into())), "\"ok\"");
/// ```
pub fn value_to_string(value: &OpcValue) -> String {
    match value {
        OpcValue::Empty => "Empty".to_string(),
        OpcValue::String(s) if s.is_empty() => "\"\"".to_string(),
        OpcValue::String(s) => format!("\"{s}\""),
        OpcValue::Int(i) => format!("{i}"),
        OpcValue::Float(f) => format!("{f:.2}"),
        OpcValue::Bool(b) => format!("{b}"),
    }
}

/// Convert a provider value to text without loss.
///
/// Floats keep full precision and strings are returned as-is; use
/// [`value_to_string`] for display.
///
/// # Examples
///
/// ```
/// use opc_tag_client::{OpcValue, value_to_text};
///
/// assert_eq!(value_to_text(&OpcValue::Float(0.004)), "0.004");
/// assert_eq!(value_to_text(&OpcValue::String("abc".into())), "abc");
/// ```
pub fn value_to_text(value: &OpcValue) -> String {
    match value {
        OpcValue::Empty => String::new(),
        OpcValue::String(s) => s.clone(),
        OpcValue::Int(i) => i.to_string(),
        OpcValue::Float(f) => f.to_string(),
        OpcValue::Bool(b) => b.to_string(),
    }
}

/// Map OPC quality code to a human-readable label.
pub fn quality_to_string(quality: u16) -> String {
    let quality_bits = quality & 0xC0; // Top 2 bits define Good/Bad/Uncertain
    match quality_bits {
        0xC0 => "Good".to_string(),
        0x00 => "Bad".to_string(),
        0x40 => "Uncertain".to_string(),
        _ => format!("Unknown(0x{quality:04X})"),
    }
}

pub const fn is_good_quality(quality: u16) -> bool {
    quality & 0xC0 == 0xC0
}

/// Convert a provider timestamp to a human-readable local time string.
pub fn timestamp_to_string(ts: &DateTime<Utc>) -> String {
    if ts.timestamp() == 0 && ts.timestamp_subsec_nanos() == 0 {
        return "N/A".to_string();
    }
    ts.with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Parse user input into a typed [`OpcValue`].
///
/// Tries integer, then float, then boolean, and falls back to a string.
pub fn parse_opc_value(s: &str) -> OpcValue {
    if let Ok(i) = s.parse::<i32>() {
        return OpcValue::Int(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return OpcValue::Float(f);
    }
    match s.to_lowercase().as_str() {
        "true" => return OpcValue::Bool(true),
        "false" => return OpcValue::Bool(false),
        _ => {}
    }
    let result = OpcValue::String(s.to_string());
    tracing::debug!(input = %s, parsed = ?result, "parse_opc_value: detected type");
    result
}
