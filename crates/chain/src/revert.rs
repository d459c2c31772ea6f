//! Revert reason extraction from RPC error messages.

use regex_lite::Regex;
use std::sync::OnceLock;

fn patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r#"reason="([^"]*)""#,
            r"execution reverted: ([^,\n]+)",
            r"reverted with reason string '([^']*)'",
            r"reverted with custom error '([^']*)'",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Pull a revert reason out of an error message, if one is present.
pub fn extract_reason(message: &str) -> Option<String> {
    patterns().iter().find_map(|re| {
        re.captures(message)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Render an error for display, preferring the revert reason.
///
/// Searches the whole context chain so reasons wrapped by `.context(..)`
/// are still found.
pub fn describe(err: &anyhow::Error) -> String {
    let reason = err
        .chain()
        .find_map(|cause| extract_reason(&cause.to_string()));

    match reason {
        Some(reason) => format!("{err:#} (revert reason: {reason})"),
        None => format!("{err:#}"),
    }
}
