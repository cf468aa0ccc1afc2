//! Deterministic in-memory vision backend for extractor tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use image::RgbImage;

use crate::backend::{BackendError, GenerationParams, Predictions, VisionBackend};
use crate::task::{Attention, Precision, VisionTask};

/// Fake backend that replays configured predictions and counts calls.
///
/// `fetch_weights` writes a marker file so the on-disk cache path is
/// exercised for real; `load` fails if the directory is missing, which
/// is exactly what a real backend would do.
#[derive(Default)]
pub struct MockVision {
    predictions: Predictions,
    fail_inference: bool,
    interrupt: bool,
    fetch_calls: AtomicUsize,
    load_calls: AtomicUsize,
    infer_calls: AtomicUsize,
    compute_moves: AtomicUsize,
    offload_moves: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl MockVision {
    pub fn with_predictions(mut self, predictions: Predictions) -> Self {
        self.predictions = predictions;
        self
    }

    pub fn with_bbox(mut self, label: &str, bbox: [f32; 4]) -> Self {
        self.predictions.bboxes.push(bbox);
        self.predictions.labels.push(label.to_string());
        self
    }

    pub fn with_polygon(mut self, label: &str, ring: &[[f32; 2]]) -> Self {
        self.predictions.polygons.push(vec![ring.to_vec()]);
        self.predictions.labels.push(label.to_string());
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_inference = true;
        self
    }

    pub fn interrupting(mut self) -> Self {
        self.interrupt = true;
        self
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn infer_calls(&self) -> usize {
        self.infer_calls.load(Ordering::SeqCst)
    }

    pub fn compute_moves(&self) -> usize {
        self.compute_moves.load(Ordering::SeqCst)
    }

    pub fn offload_moves(&self) -> usize {
        self.offload_moves.load(Ordering::SeqCst)
    }

    /// The prompt the most recent infer call received.
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().expect("mock lock").clone()
    }
}

impl VisionBackend for MockVision {
    type Model = String;

    fn fetch_weights(&self, identity: &str, dir: &Path) -> Result<(), BackendError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        std::fs::create_dir_all(dir)
            .map_err(|e| BackendError::Failed(format!("fetch {identity}: {e}")))?;
        std::fs::write(dir.join("weights.bin"), identity)
            .map_err(|e| BackendError::Failed(format!("fetch {identity}: {e}")))?;
        Ok(())
    }

    fn load(
        &self,
        weights_dir: &Path,
        precision: Precision,
        attention: Attention,
    ) -> Result<Self::Model, BackendError> {
        if !weights_dir.join("weights.bin").exists() {
            return Err(BackendError::Failed(format!(
                "no weights at {}",
                weights_dir.display()
            )));
        }
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "model:{}:{}:{}",
            weights_dir.display(),
            precision.as_str(),
            attention.as_str()
        ))
    }

    fn to_compute(&self, _model: &mut Self::Model) -> Result<(), BackendError> {
        self.compute_moves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn offload(&self, _model: &mut Self::Model) -> Result<(), BackendError> {
        self.offload_moves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn infer(
        &self,
        _model: &Self::Model,
        _image: &RgbImage,
        prompt: &str,
        _task: VisionTask,
        _params: &GenerationParams,
    ) -> Result<Predictions, BackendError> {
        self.infer_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().expect("mock lock") = Some(prompt.to_string());
        if self.interrupt {
            return Err(BackendError::Interrupted);
        }
        if self.fail_inference {
            return Err(BackendError::Failed("mock inference failure".into()));
        }
        Ok(self.predictions.clone())
    }
}
