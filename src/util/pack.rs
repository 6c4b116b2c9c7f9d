//! Deterministic packing of values into connection-id fragments.

use serde_json::Value;

/// Packed fragments longer than this are replaced by their digest.
pub const MAX_PACKED_LEN: usize = 64;

/// Pack a JSON value into a stable string fragment.
///
/// Strings are used verbatim. Everything else is rendered as compact JSON
/// (object keys are sorted by `serde_json`'s default map) and replaced by a
/// blake3 hex digest when the rendering is too long to be a readable id.
pub fn pack_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => {
            let rendered = other.to_string();
            if rendered.len() > MAX_PACKED_LEN {
                digest(&rendered)
            } else {
                rendered
            }
        }
    }
}

/// Hex digest of `text`, shortened to 32 characters.
pub fn digest(text: &str) -> String {
    let hash = blake3::hash(text.as_bytes());
    hash.to_hex()[..32].to_string()
}

/// Convert `CamelCase` class names into `kebab-case` prefixes.
///
/// `ShellConnection` → `shell-connection`, `HTTPClient` → `http-client`.
pub fn kebab_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(|next| next.is_lowercase());
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            if i > 0 && (prev_lower || (prev_upper && next_lower)) {
                out.push('-');
            }
            out.extend(ch.to_lowercase());
        } else if ch == '_' || ch == ' ' {
            out.push('-');
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kebab_case() {
        assert_eq!(kebab_case("Connection"), "connection");
        assert_eq!(kebab_case("ShellConnection"), "shell-connection");
        assert_eq!(kebab_case("HTTPClient"), "http-client");
        assert_eq!(kebab_case("widget"), "widget");
    }

    #[test]
    fn test_pack_value() {
        assert_eq!(pack_value(&json!("abc")), "abc");
        assert_eq!(pack_value(&json!(3)), "3");
        assert_eq!(pack_value(&json!({"a": 1})), r#"{"a":1}"#);

        let long = json!({"text": "x".repeat(100)});
        let packed = pack_value(&long);
        assert_eq!(packed.len(), 32);
        assert_eq!(packed, pack_value(&long));
    }
}
