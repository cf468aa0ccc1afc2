//! The extraction driver: weights in, annotated batch out.

use std::path::Path;

use gridsweep_core::tensor::{frame_to_image, gray_to_mask, image_to_tensor, ImageTensor, MaskTensor};
use ndarray::Axis;

use crate::backend::{BackendError, Predictions, VisionBackend, GENERATION};
use crate::error::VisionError;
use crate::raster::{annotate_bboxes, annotate_polygons, parse_mask_select};
use crate::task::{Attention, Precision, TaskMode, VisionTask};
use crate::weights::WeightCache;

/// Parameters of one extraction invocation.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub identity: String,
    pub task: VisionTask,
    pub precision: Precision,
    pub attention: Attention,
    pub fill_mask: bool,
    /// Comma-separated indices or labels limiting bbox masks.
    pub mask_select: String,
    /// Leave the model on the compute device after the run.
    pub keep_loaded: bool,
    pub prompt: String,
}

/// Batched outputs, one entry of `predictions` per input image.
#[derive(Debug)]
pub struct Extraction {
    pub image: ImageTensor,
    pub mask: MaskTensor,
    pub predictions: Vec<Predictions>,
}

/// Runs the task over an image batch against a [`VisionBackend`],
/// holding the in-process weight cache across invocations.
pub struct RegionExtractor<'a, B: VisionBackend> {
    backend: &'a B,
    cache: WeightCache<'a, B>,
}

impl<'a, B: VisionBackend> RegionExtractor<'a, B> {
    pub fn new(backend: &'a B, weight_store: &Path) -> Self {
        Self {
            backend,
            cache: WeightCache::new(backend, weight_store),
        }
    }

    pub fn run(
        &mut self,
        request: &ExtractRequest,
        images: &ImageTensor,
    ) -> Result<Extraction, VisionError> {
        let model = self
            .cache
            .acquire(&request.identity, request.precision, request.attention)?;
        self.backend
            .to_compute(model)
            .map_err(|e| attach_triple(request, e, true))?;

        let prompt = request.task.assemble_prompt(&request.prompt);
        let filter = parse_mask_select(&request.mask_select);
        tracing::info!(
            identity = %request.identity,
            task = ?request.task,
            batch = images.len_of(Axis(0)),
            "Running vision extraction"
        );

        let mut frames = Vec::with_capacity(images.len_of(Axis(0)));
        let mut masks = Vec::with_capacity(images.len_of(Axis(0)));
        let mut predictions = Vec::with_capacity(images.len_of(Axis(0)));

        for b in 0..images.len_of(Axis(0)) {
            let frame = frame_to_image(images.index_axis(Axis(0), b))?;
            let parsed = self
                .backend
                .infer(model, &frame, &prompt, request.task, &GENERATION)
                .map_err(|e| attach_triple(request, e, false))?;

            let (annotated, mask) = match request.task.mode() {
                TaskMode::Bbox => annotate_bboxes(&frame, &parsed, request.fill_mask, &filter),
                TaskMode::Polygon => annotate_polygons(&frame, &parsed, request.fill_mask),
            };
            frames.push(image_to_tensor(&annotated));
            masks.push(gray_to_mask(&mask));
            predictions.push(parsed);
        }

        if !request.keep_loaded {
            self.backend
                .offload(model)
                .map_err(|e| attach_triple(request, e, false))?;
        }

        let frame_views: Vec<_> = frames.iter().map(|f| f.view()).collect();
        let mask_views: Vec<_> = masks.iter().map(|m| m.view()).collect();
        let image = ndarray::concatenate(Axis(0), &frame_views)
            .map_err(|e| attach_triple(request, BackendError::Failed(e.to_string()), false))?;
        let mask = ndarray::concatenate(Axis(0), &mask_views)
            .map_err(|e| attach_triple(request, BackendError::Failed(e.to_string()), false))?;

        Ok(Extraction {
            image,
            mask,
            predictions,
        })
    }
}

fn attach_triple(request: &ExtractRequest, source: BackendError, loading: bool) -> VisionError {
    if source.is_interrupt() {
        return VisionError::Interrupted;
    }
    let identity = request.identity.clone();
    let precision = request.precision.as_str();
    let attention = request.attention.as_str();
    let message = source.to_string();
    if loading {
        VisionError::WeightLoad {
            identity,
            precision,
            attention,
            message,
        }
    } else {
        VisionError::Inference {
            identity,
            precision,
            attention,
            message,
        }
    }
}
