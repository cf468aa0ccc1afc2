//! The [`Cell`] record and fingerprint comparison.

use gridsweep_core::compare::{float_eq, path_str_eq};
use serde::{Deserialize, Serialize};

/// One fully specified generation within a sweep.
///
/// Serialized into `manifest.json` with snake_case keys. `model: None`
/// means "the checkpoint the host already supplied to this node".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub sampler: String,
    pub scheduler: String,
    pub steps: u32,
    pub cfg: f64,
    pub denoise: f64,
    pub seed: u64,
    pub width: u32,
    pub height: u32,
    /// Plus-separated lora stack, or the literal `"None"`.
    pub lora: String,
    pub str_model: f64,
    pub str_clip: f64,
    pub positive: String,
    pub negative: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub batch_idx: u32,
    /// Time-based unique key, stamped at flush time.
    #[serde(default)]
    pub id: u64,
    /// Host view URL of the stored image, stamped at flush time.
    #[serde(default)]
    pub file: String,
    /// Sampler wall time in seconds.
    #[serde(default)]
    pub duration: f64,
    /// User flag set from the dashboard; a rejected cell still counts
    /// as present for resume.
    #[serde(default)]
    pub rejected: bool,
}

/// Compare the fingerprint fields of two cells.
///
/// Floats match within 1e-5; strings match after path-separator
/// normalization; `model: None` matches only `None` (the "Default"
/// sentinel is resolved to `None` before candidates reach this point).
/// `id`, `file`, `duration`, and `rejected` are not part of the
/// fingerprint.
pub fn fingerprint_matches(a: &Cell, b: &Cell) -> bool {
    a.sampler == b.sampler
        && a.scheduler == b.scheduler
        && a.steps == b.steps
        && float_eq(a.cfg, b.cfg)
        && path_str_eq(&a.lora, &b.lora)
        && float_eq(a.str_model, b.str_model)
        && float_eq(a.str_clip, b.str_clip)
        && float_eq(a.denoise, b.denoise)
        && a.seed == b.seed
        && a.width == b.width
        && a.height == b.height
        && a.positive == b.positive
        && a.negative == b.negative
        && a.batch_idx == b.batch_idx
        && match (&a.model, &b.model) {
            (None, None) => true,
            (Some(x), Some(y)) => path_str_eq(x, y),
            _ => false,
        }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_cell() -> Cell {
        Cell {
            sampler: "euler".into(),
            scheduler: "normal".into(),
            steps: 20,
            cfg: 7.0,
            denoise: 1.0,
            seed: 0,
            width: 512,
            height: 512,
            lora: "None".into(),
            str_model: 1.0,
            str_clip: 1.0,
            positive: "a".into(),
            negative: "".into(),
            model: None,
            batch_idx: 0,
            id: 0,
            file: String::new(),
            duration: 0.0,
            rejected: false,
        }
    }

    #[test]
    fn identical_cells_match() {
        assert!(fingerprint_matches(&sample_cell(), &sample_cell()));
    }

    #[test]
    fn float_round_trip_still_matches() {
        let mut b = sample_cell();
        b.cfg = 7.000_000_9;
        assert!(fingerprint_matches(&sample_cell(), &b));
    }

    #[test]
    fn path_separator_insensitive_lora() {
        let mut a = sample_cell();
        a.lora = "styles\\anime.safetensors".into();
        let mut b = sample_cell();
        b.lora = "styles/anime.safetensors".into();
        assert!(fingerprint_matches(&a, &b));
    }

    #[test]
    fn model_sentinel_only_matches_itself() {
        let mut b = sample_cell();
        b.model = Some("other.safetensors".into());
        assert!(!fingerprint_matches(&sample_cell(), &b));
    }

    #[test]
    fn stamp_fields_ignored() {
        let mut b = sample_cell();
        b.id = 99;
        b.file = "/view?filename=x".into();
        b.duration = 3.2;
        b.rejected = true;
        assert!(fingerprint_matches(&sample_cell(), &b));
    }

    #[test]
    fn seed_differs_no_match() {
        let mut b = sample_cell();
        b.seed = 1;
        assert!(!fingerprint_matches(&sample_cell(), &b));
    }
}
