//! `{{ key }}` string interpolation against a flat variable bag.
//!
//! Keys are made of ASCII word characters, `.` and `-`, optionally padded
//! with whitespace inside the braces. Unknown keys and `null` values render
//! as the empty string. Anything between braces that is not a valid key is
//! left untouched.

use serde_json::{Map, Value};

/// Variables available to templates: iteration variables, `seed`,
/// `assetId`, and `index` while naming array artifacts.
pub type TemplateVars = Map<String, Value>;

/// Replace every `{{ key }}` in `template` with its value from `vars`.
pub fn apply_template(template: &str, vars: &TemplateVars) -> String {
    let mut out = String::with_capacity(template.len());
    let mut remaining = template;

    while let Some(start) = remaining.find("{{") {
        let Some(end) = remaining[start + 2..].find("}}") else {
            break;
        };
        let inner = &remaining[start + 2..start + 2 + end];
        let key = inner.trim();

        if is_template_key(key) {
            out.push_str(&remaining[..start]);
            if let Some(value) = vars.get(key) {
                out.push_str(&value_to_string(value));
            }
            remaining = &remaining[start + 2 + end + 2..];
        } else {
            // Not an expression; keep the braces and rescan after them.
            out.push_str(&remaining[..start + 2]);
            remaining = &remaining[start + 2..];
        }
    }

    out.push_str(remaining);
    out
}

fn is_template_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
}

/// Convert a JSON value to its string representation for interpolation.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // Objects and arrays get JSON serialized
        other => other.to_string(),
    }
}
