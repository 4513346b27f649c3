//! Helpers for the JSON values carried by events and views.

use serde_json::Value;

/// Loose truthiness: null, false, 0, NaN and "" are false; everything else is true
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Text form of a value as shown in a text field (strings unquoted, null empty)
pub fn display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!("")] {
            assert!(!is_truthy(&falsy), "{falsy} should be falsy");
        }
        for truthy in [json!(true), json!(1), json!(-0.5), json!("no"), json!([]), json!({})] {
            assert!(is_truthy(&truthy), "{truthy} should be truthy");
        }
    }

    #[test]
    fn test_display_string() {
        assert_eq!(display_string(&json!(null)), "");
        assert_eq!(display_string(&json!("Ada")), "Ada");
        assert_eq!(display_string(&json!(42)), "42");
        assert_eq!(display_string(&json!(true)), "true");
    }
}
