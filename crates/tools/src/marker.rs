//! Tool-marker grammar
//!
//! Markers are inline directives in LLM output:
//!
//! ```text
//! [TOOL:name(key=value, key="quoted value")]
//! [CONFIRM_TOOL:name(key=value)]
//! ```
//!
//! The grammar is strict: an identifier name, then an optional parenthesised
//! `key=value` list where values are bare words or double-quoted strings.
//! Malformed markers are stripped from the spoken text and rejected, never
//! best-effort executed. Unknown parameter keys are preserved and passed
//! through to the executor.

use std::collections::BTreeMap;

use crate::{ToolError, TOOL_CALL_WEBHOOK, TOOL_TRANSFER_CALL};
use voicegate_core::{ParamValue, ToolInvocation};

const TOOL_PREFIX: &str = "[TOOL:";
const CONFIRM_PREFIX: &str = "[CONFIRM_TOOL:";

/// Result of scanning one sentence for markers
#[derive(Debug, Default)]
pub struct MarkerScan {
    /// The sentence with every marker span removed
    pub clean_text: String,
    /// First well-formed invocation found, if any
    pub invocation: Option<ToolInvocation>,
    /// Count of malformed markers stripped
    pub rejected: usize,
}

/// Scan text for tool markers, stripping them from the spoken output
pub fn scan_markers(text: &str) -> MarkerScan {
    let mut scan = MarkerScan::default();
    let mut rest = text;

    loop {
        let Some((offset, requires_confirmation, prefix_len)) = find_marker_start(rest) else {
            scan.clean_text.push_str(rest);
            break;
        };

        scan.clean_text.push_str(&rest[..offset]);
        let after_prefix = &rest[offset + prefix_len..];

        let Some(close) = after_prefix.find(']') else {
            // No closing bracket: not a marker, keep the text as-is
            scan.clean_text.push_str(&rest[offset..]);
            break;
        };

        let body = &after_prefix[..close];
        match parse_marker_body(body, requires_confirmation) {
            Some(invocation) => {
                if scan.invocation.is_none() {
                    scan.invocation = Some(invocation);
                } else {
                    tracing::warn!("multiple tool markers in one sentence, keeping the first");
                }
            }
            None => {
                tracing::warn!(marker = %&rest[offset..offset + prefix_len + close + 1], "rejecting malformed tool marker");
                scan.rejected += 1;
            }
        }

        rest = &after_prefix[close + 1..];
    }

    scan.clean_text = normalize_spaces(&scan.clean_text);
    scan
}

fn find_marker_start(text: &str) -> Option<(usize, bool, usize)> {
    let tool = text.find(TOOL_PREFIX);
    let confirm = text.find(CONFIRM_PREFIX);
    match (tool, confirm) {
        (None, None) => None,
        (Some(t), None) => Some((t, false, TOOL_PREFIX.len())),
        (None, Some(c)) => Some((c, true, CONFIRM_PREFIX.len())),
        (Some(t), Some(c)) => {
            if c < t {
                Some((c, true, CONFIRM_PREFIX.len()))
            } else {
                Some((t, false, TOOL_PREFIX.len()))
            }
        }
    }
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_marker_body(body: &str, requires_confirmation: bool) -> Option<ToolInvocation> {
    let body = body.trim();

    let (name, params_src) = match body.find('(') {
        Some(open) => {
            if !body.ends_with(')') {
                return None;
            }
            (body[..open].trim(), Some(&body[open + 1..body.len() - 1]))
        }
        None => (body, None),
    };

    if !is_ident(name) {
        return None;
    }

    let mut params = BTreeMap::new();
    if let Some(src) = params_src {
        if !src.trim().is_empty() {
            for pair in split_params(src)? {
                let (key, value) = parse_param(&pair)?;
                params.insert(key, value);
            }
        }
    }

    Some(ToolInvocation {
        name: name.to_string(),
        params,
        requires_confirmation,
    })
}

/// Split a parameter list on commas, respecting double quotes
fn split_params(src: &str) -> Option<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in src.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if in_quotes {
        return None;
    }
    parts.push(current.trim().to_string());
    if parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some(parts)
}

fn parse_param(pair: &str) -> Option<(String, ParamValue)> {
    let eq = pair.find('=')?;
    let key = pair[..eq].trim();
    let raw = pair[eq + 1..].trim();
    if !is_ident(key) || raw.is_empty() {
        return None;
    }

    let value = if raw.starts_with('"') {
        if raw.len() < 2 || !raw.ends_with('"') {
            return None;
        }
        let inner = &raw[1..raw.len() - 1];
        if inner.contains('"') {
            return None;
        }
        ParamValue::Str(inner.to_string())
    } else {
        if raw.contains(char::is_whitespace) || raw.contains('"') {
            return None;
        }
        match raw.parse::<f64>() {
            Ok(n) => ParamValue::Num(n),
            Err(_) => ParamValue::Str(raw.to_string()),
        }
    };

    Some((key.to_string(), value))
}

fn normalize_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

const VALID_DEPARTMENTS: [&str; 3] = ["sales", "support", "technical"];

/// Validate and normalise a parsed invocation before execution
///
/// Fills tool-specific defaults and rejects policy violations. Unknown tools
/// pass through untouched; the executor decides whether it can run them.
pub fn validate_invocation(invocation: &mut ToolInvocation) -> Result<(), ToolError> {
    match invocation.name.as_str() {
        TOOL_TRANSFER_CALL => {
            let department = invocation
                .params
                .entry("department".to_string())
                .or_insert_with(|| ParamValue::Str("sales".to_string()));
            match department.as_str() {
                Some(d) if VALID_DEPARTMENTS.contains(&d) => Ok(()),
                _ => Err(ToolError::InvalidParams(format!(
                    "invalid department: {}",
                    department.to_display()
                ))),
            }
        }
        TOOL_CALL_WEBHOOK => {
            let url = invocation
                .params
                .get("url")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            if url.starts_with("http://") || url.starts_with("https://") {
                Ok(())
            } else {
                Err(ToolError::InvalidParams("call_webhook requires an http(s) url".to_string()))
            }
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_tool_marker() {
        let scan = scan_markers("I'll end the call now. [TOOL:end_call(reason=user_goodbye)]");
        let invocation = scan.invocation.unwrap();
        assert_eq!(invocation.name, "end_call");
        assert!(!invocation.requires_confirmation);
        assert_eq!(
            invocation.param("reason").unwrap().as_str(),
            Some("user_goodbye")
        );
        assert_eq!(scan.clean_text, "I'll end the call now.");
    }

    #[test]
    fn test_confirm_marker_with_quoted_value() {
        let scan =
            scan_markers("I'll transfer you to sales. [CONFIRM_TOOL:transfer_call(department=\"sales\")]");
        let invocation = scan.invocation.unwrap();
        assert_eq!(invocation.name, "transfer_call");
        assert!(invocation.requires_confirmation);
        assert_eq!(invocation.param("department").unwrap().as_str(), Some("sales"));
        assert_eq!(scan.clean_text, "I'll transfer you to sales.");
    }

    #[test]
    fn test_numeric_and_unknown_params_pass_through() {
        let scan = scan_markers("[TOOL:schedule(slot=3, note=\"next week\", zone=pacific)]");
        let invocation = scan.invocation.unwrap();
        assert_eq!(invocation.param("slot"), Some(&ParamValue::Num(3.0)));
        assert_eq!(invocation.param("note").unwrap().as_str(), Some("next week"));
        assert_eq!(invocation.param("zone").unwrap().as_str(), Some("pacific"));
    }

    #[test]
    fn test_marker_without_params() {
        let scan = scan_markers("Goodbye. [TOOL:end_call]");
        assert_eq!(scan.invocation.unwrap().name, "end_call");
    }

    #[test]
    fn test_malformed_markers_rejected_and_stripped() {
        for text in [
            "[TOOL:bad name(x=1)]",
            "[TOOL:tool(x=)]",
            "[TOOL:tool(=y)]",
            "[TOOL:tool(x=1,)]",
            "[TOOL:tool(x=\"unterminated)]",
            "[TOOL:tool(x=two words)]",
            "[TOOL:123abc]",
        ] {
            let scan = scan_markers(&format!("Sure thing. {text}"));
            assert!(scan.invocation.is_none(), "accepted malformed: {text}");
            assert_eq!(scan.rejected, 1, "not counted: {text}");
            assert_eq!(scan.clean_text, "Sure thing.", "not stripped: {text}");
        }
    }

    #[test]
    fn test_unclosed_bracket_is_plain_text() {
        let scan = scan_markers("The price is [TOOL:about right");
        assert!(scan.invocation.is_none());
        assert_eq!(scan.rejected, 0);
        assert_eq!(scan.clean_text, "The price is [TOOL:about right");
    }

    #[test]
    fn test_plain_text_untouched() {
        let scan = scan_markers("No markers here, just words.");
        assert!(scan.invocation.is_none());
        assert_eq!(scan.clean_text, "No markers here, just words.");
    }

    #[test]
    fn test_first_of_multiple_markers_wins() {
        let scan = scan_markers("[TOOL:first] and [TOOL:second]");
        assert_eq!(scan.invocation.unwrap().name, "first");
        assert_eq!(scan.clean_text, "and");
    }

    #[test]
    fn test_validate_transfer_department() {
        let mut ok = scan_markers("[TOOL:transfer_call(department=support)]")
            .invocation
            .unwrap();
        assert!(validate_invocation(&mut ok).is_ok());

        let mut bad = scan_markers("[TOOL:transfer_call(department=billing)]")
            .invocation
            .unwrap();
        assert!(validate_invocation(&mut bad).is_err());

        // Missing department defaults to sales
        let mut defaulted = scan_markers("[TOOL:transfer_call]").invocation.unwrap();
        assert!(validate_invocation(&mut defaulted).is_ok());
        assert_eq!(defaulted.param("department").unwrap().as_str(), Some("sales"));
    }

    #[test]
    fn test_validate_webhook_url() {
        let mut ok = scan_markers("[TOOL:call_webhook(url=\"https://x.test/hook\")]")
            .invocation
            .unwrap();
        assert!(validate_invocation(&mut ok).is_ok());

        let mut bad = scan_markers("[TOOL:call_webhook(url=ftp_server)]")
            .invocation
            .unwrap();
        assert!(validate_invocation(&mut bad).is_err());
    }
}
