//! Session-name and path-string normalization.

use std::sync::OnceLock;

use regex::Regex;

/// Fallback session name when sanitization leaves nothing.
pub const DEFAULT_SESSION: &str = "default_session";

fn session_filter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\-]").expect("static regex"))
}

/// Reduce a session name to word characters and hyphens.
///
/// An empty result becomes [`DEFAULT_SESSION`] so a session directory
/// can always be created.
pub fn sanitize_session_name(raw: &str) -> String {
    let cleaned = session_filter().replace_all(raw, "").into_owned();
    if cleaned.is_empty() {
        DEFAULT_SESSION.to_string()
    } else {
        cleaned
    }
}

/// Normalize path separators to `/` and trim surrounding whitespace.
///
/// Weight identities recorded on Windows use `\`; fingerprint matching
/// must treat them as equal to their `/` form.
pub fn normalize_path_str(s: &str) -> String {
    s.replace('\\', "/").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_spaces() {
        assert_eq!(sanitize_session_name("my session!  v2"), "mysessionv2");
        assert_eq!(sanitize_session_name("run-01_b"), "run-01_b");
    }

    #[test]
    fn empty_becomes_default() {
        assert_eq!(sanitize_session_name(""), DEFAULT_SESSION);
        assert_eq!(sanitize_session_name("///"), DEFAULT_SESSION);
    }

    #[test]
    fn path_separators_normalized() {
        assert_eq!(normalize_path_str("sdxl\\realistic.safetensors "), "sdxl/realistic.safetensors");
    }
}
