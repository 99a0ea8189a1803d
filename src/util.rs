//! Small support helpers shared across the crate.

use std::borrow::Cow;

/// Replacement token used wherever a secret has been removed from
/// logged or echoed request data.
pub const SECRET_PLACEHOLDER: &str = "[SECRET]";

/// Current wall-clock time as milliseconds since the unix epoch.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Truncate a string for log output.
///
/// Returns the input unchanged when it fits; otherwise cuts at a char
/// boundary and appends a marker so truncation is visible in logs.
pub fn truncate(input: &str, max_chars: usize) -> Cow<'_, str> {
    if input.chars().count() <= max_chars {
        return Cow::Borrowed(input);
    }
    let cut: String = input.chars().take(max_chars).collect();
    Cow::Owned(format!("{}...[truncated]", cut))
}

/// Replace every occurrence of each needle with [`SECRET_PLACEHOLDER`].
///
/// Empty needles are skipped; replacing an empty string would loop on
/// every position.
pub(crate) fn redact(text: &str, needles: &[String]) -> String {
    let mut out = text.to_string();
    for needle in needles {
        if needle.is_empty() {
            continue;
        }
        out = out.replace(needle.as_str(), SECRET_PLACEHOLDER);
    }
    out
}
