//! Tolerant equality used by manifest fingerprinting.
//!
//! Float axes round-trip through JSON, so exact equality would defeat
//! resume; string axes may carry either path separator depending on the
//! platform that wrote them.

use crate::sanitize::normalize_path_str;

/// Tolerance for float axis comparison.
pub const FLOAT_TOLERANCE: f64 = 1e-5;

/// Compare two floats within [`FLOAT_TOLERANCE`].
pub fn float_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < FLOAT_TOLERANCE
}

/// Compare two strings after path-separator normalization.
pub fn path_str_eq(a: &str, b: &str) -> bool {
    normalize_path_str(a) == normalize_path_str(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_within_tolerance_match() {
        assert!(float_eq(7.0, 7.000_000_1));
        assert!(!float_eq(7.0, 7.001));
    }

    #[test]
    fn separator_insensitive() {
        assert!(path_str_eq("styles\\anime.safetensors", "styles/anime.safetensors"));
        assert!(!path_str_eq("a/b", "a/c"));
    }
}
