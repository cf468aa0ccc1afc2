//! The seam between the extractor and the host's vision runtime.
//!
//! A [`VisionBackend`] owns tokenization, generation, and the model's
//! task-specific output parser; the extractor only sees the parsed
//! [`Predictions`]. Device placement is explicit so the extractor can
//! enforce the move-before / offload-after discipline.

use std::path::Path;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::task::{Attention, Precision, VisionTask};

/// Beam-search settings used for every generate call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub num_beams: u32,
    pub do_sample: bool,
}

pub const GENERATION: GenerationParams = GenerationParams {
    max_new_tokens: 512,
    num_beams: 3,
    do_sample: true,
};

/// Parsed model output for one image.
///
/// Bbox tasks populate `bboxes` + `labels`; the polygon task populates
/// `polygons` + `labels`. Boxes are `[x0, y0, x1, y1]` in pixel
/// coordinates; each polygon group holds one or more point rings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Predictions {
    #[serde(default)]
    pub bboxes: Vec<[f32; 4]>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub polygons: Vec<Vec<Vec<[f32; 2]>>>,
}

/// Backend-level failure, before the extractor attaches the model
/// triple to it.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Interrupted")]
    Interrupted,

    #[error("{0}")]
    Failed(String),
}

impl BackendError {
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Host vision runtime: weight materialization, device moves, and the
/// processor/generate/parse round trip.
pub trait VisionBackend {
    type Model;

    /// Download weights for `identity` into `dir`. Called only when the
    /// directory does not already exist.
    fn fetch_weights(&self, identity: &str, dir: &Path) -> Result<(), BackendError>;

    /// Materialize the model from an on-disk weight directory. The
    /// returned model starts on the offload device.
    fn load(
        &self,
        weights_dir: &Path,
        precision: Precision,
        attention: Attention,
    ) -> Result<Self::Model, BackendError>;

    /// Move the model to the compute device.
    fn to_compute(&self, model: &mut Self::Model) -> Result<(), BackendError>;

    /// Return the model to the offload device and release scratch VRAM.
    fn offload(&self, model: &mut Self::Model) -> Result<(), BackendError>;

    /// Process one image, generate, and parse with the task's own
    /// post-processor.
    fn infer(
        &self,
        model: &Self::Model,
        image: &RgbImage,
        prompt: &str,
        task: VisionTask,
        params: &GenerationParams,
    ) -> Result<Predictions, BackendError>;
}
