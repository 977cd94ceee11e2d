/// CLI utilities for consistent output formatting
use std::io::IsTerminal;

/// Get a colored prefix
///
/// Returns bright cyan if stderr is a TTY, plain text otherwise.
pub fn hotscript_prefix() -> &'static str {
    if std::io::stderr().is_terminal() {
        "\x1b[96m[hotscript]\x1b[0m"
    } else {
        "[hotscript]"
    }
}

/// Parse a command-line JSON argument
///
/// Anything that is not valid JSON is taken as a plain string, so
/// `hotscript call greet hello world` works without quoting.
pub fn parse_json_arg(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_json_arg() {
        assert_eq!(parse_json_arg("42"), json!(42));
        assert_eq!(parse_json_arg(r#"{"a":[1,2]}"#), json!({"a": [1, 2]}));
        assert_eq!(parse_json_arg("null"), json!(null));
        assert_eq!(parse_json_arg("hello"), json!("hello"));
    }
}
