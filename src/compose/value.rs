//! Helpers for reading YAML scalars as strings.

use serde_yaml::Value;

/// Renders a scalar value the way it would appear on a command line.
///
/// Returns `None` for sequences, mappings and tagged values.
#[must_use]
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => None,
    }
}

/// Renders a mapping key for use in paths and directive text.
#[must_use]
pub fn key_string(key: &Value) -> String {
    scalar_string(key).unwrap_or_else(|| format!("{key:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_string() {
        assert_eq!(scalar_string(&Value::from("x")), Some(String::from("x")));
        assert_eq!(scalar_string(&Value::from(3)), Some(String::from("3")));
        assert_eq!(scalar_string(&Value::from(true)), Some(String::from("true")));
        assert_eq!(scalar_string(&Value::Null), Some(String::new()));
        assert_eq!(scalar_string(&Value::Sequence(vec![])), None);
    }
}
