//! Error type for the vision extractor.

use gridsweep_core::CoreError;

/// Failures surfaced by the vision extractor.
///
/// Load and inference failures carry the full `(identity, precision,
/// attention)` triple so the user can see exactly which weight variant
/// failed. Both are fatal for the invocation; there is no per-image
/// recovery because a broken model will break every image the same way.
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("Failed to load weights for {identity} ({precision}, {attention}): {message}")]
    WeightLoad {
        identity: String,
        precision: &'static str,
        attention: &'static str,
        message: String,
    },

    #[error("Inference failed for {identity} ({precision}, {attention}): {message}")]
    Inference {
        identity: String,
        precision: &'static str,
        attention: &'static str,
        message: String,
    },

    #[error("Interrupted")]
    Interrupted,

    #[error(transparent)]
    Tensor(#[from] CoreError),
}
