//! ---
//! cms_section: "11-simulation"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "Lenient numeric coercion of request fields."
//! cms_version: "v0.1.0"
//! cms_owner: "tbd"
//! ---
use serde_json::Value;

/// Read a request field the way the dashboard's browser code does:
/// `null`, `false` and blank strings count as zero and `true` as one.
/// Text that is not a number, arrays, objects and non-finite values yield
/// `None`.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Null => 0.0,
        Value::Bool(flag) => f64::from(u8::from(*flag)),
        Value::Number(n) => n.as_f64()?,
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Array(_) | Value::Object(_) => return None,
    };
    number.is_finite().then_some(number)
}

/// `coerce_number` with a fallback for missing or unusable values.
pub fn number_or(value: Option<&Value>, default: f64) -> f64 {
    value.and_then(coerce_number).unwrap_or(default)
}

/// Like [`number_or`], but a zero also selects the fallback.
pub fn nonzero_or(value: Option<&Value>, default: f64) -> f64 {
    match value.and_then(coerce_number) {
        Some(n) if n != 0.0 => n,
        _ => default,
    }
}
