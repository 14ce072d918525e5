use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

/// Parses JSON printed by a child process. Tools like pip may print notices
/// before the payload, so parsing starts at the first `[` or `{`.
pub fn parse_tool_json<T: DeserializeOwned>(bytes: &[u8], tool: &str) -> Result<T> {
    let raw = std::str::from_utf8(bytes).with_context(|| format!("{tool} emitted non-UTF-8 output"))?;
    let start = raw.find(['[', '{']).unwrap_or(0);
    let trimmed = raw[start..].trim();
    anyhow::ensure!(!trimmed.is_empty(), "{tool} did not emit JSON on stdout");
    serde_json::from_str(trimmed).with_context(|| format!("failed to parse JSON from {tool}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn skips_leading_notices() {
        let parsed: Value =
            parse_tool_json(b"WARNING: something\n[{\"name\":\"x\"}]\n", "pip").unwrap();
        assert_eq!(parsed[0]["name"], "x");
    }

    #[test]
    fn empty_output_is_an_error() {
        assert!(parse_tool_json::<Value>(b"  \n", "pip").is_err());
    }
}
